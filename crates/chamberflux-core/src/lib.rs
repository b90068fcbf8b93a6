pub mod aggregate;
pub mod cycle;
pub mod cycle_processor;
pub mod data_formats;
pub mod export;
pub mod flux;
pub mod gastype;
pub mod processevent;
pub mod query;
pub mod site;
pub mod stats;
pub mod types;
pub mod utils;

pub use aggregate::{aggregate, run_statistics, AggregationParams, DailyCumulativeFlux};
pub use cycle_processor::{calculate_file_fluxes, process_file, DataFile, FluxParams, Processor};
pub use flux::{FluxResult, QualityControlCriteria, QualityFlag};
pub use gastype::GasType;
pub use query::{DateRange, QueryError};
pub use site::SiteConfig;
