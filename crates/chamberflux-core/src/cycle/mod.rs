pub mod cycle;
pub mod runid;

pub use cycle::{group_by_chamber, parse_and_group, ChamberFile, ChamberMeasurement};
pub use runid::run_id_from_filename;
