pub mod chamberdata;
pub mod gasdata;

pub use chamberdata::{ChamberConfig, ChamberRegistry};
pub use gasdata::{parse_gas_data, read_gas_data, GasData, GasDataError, RawMeasurement};
