pub mod flux;
pub mod fluxunit;
pub mod quality;

pub use flux::{sort_fluxes, FilteredFlux, FluxResult};
pub use fluxunit::{AmbientConditions, ConditionsPolicy, FluxUnit, DEFAULT_CHAMBER_HEIGHT_CM};
pub use quality::{QualityControlCriteria, QualityFlag};
