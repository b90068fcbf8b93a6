use crate::flux::quality::QualityFlag;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flux of one chamber in one measurement cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxResult {
    pub datetime: DateTime<Utc>,
    pub run_id: String,
    pub chamber: u32,
    pub treatment: String,
    pub replicate: u32,
    /// kg C/ha/d
    pub co2_flux: f64,
    /// g N/ha/d
    pub n2o_flux: f64,
    /// ppm
    pub h2o_avg: f64,
    pub co2_r2: f64,
    pub n2o_r2: f64,
    /// ppm/s
    pub co2_slope: f64,
    /// ppb/s
    pub n2o_slope: f64,
    /// HH:MM local to the site
    pub measurement_start_time: String,
    pub duration_seconds: i64,
    pub quality_flag: QualityFlag,
    pub points_used: usize,
    pub points_total: usize,
}

impl FluxResult {
    pub fn is_good(&self) -> bool {
        self.quality_flag == QualityFlag::Good
    }
}

/// Flux listing with the quality verdict reduced to pass/fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredFlux {
    pub datetime: DateTime<Utc>,
    pub run_id: String,
    pub measurement_start_time: String,
    pub chamber: u32,
    pub treatment: String,
    pub co2_flux: f64,
    pub n2o_flux: f64,
    pub h2o_avg: f64,
    pub co2_r2: f64,
    pub n2o_r2: f64,
    pub passed_qc: bool,
}

impl From<&FluxResult> for FilteredFlux {
    fn from(r: &FluxResult) -> Self {
        Self {
            datetime: r.datetime,
            run_id: r.run_id.clone(),
            measurement_start_time: r.measurement_start_time.clone(),
            chamber: r.chamber,
            treatment: r.treatment.clone(),
            co2_flux: r.co2_flux,
            n2o_flux: r.n2o_flux,
            h2o_avg: r.h2o_avg,
            co2_r2: r.co2_r2,
            n2o_r2: r.n2o_r2,
            passed_qc: r.is_good(),
        }
    }
}

/// Order by measurement time, then chamber.
pub fn sort_fluxes(results: &mut [FluxResult]) {
    results.sort_by(|a, b| a.datetime.cmp(&b.datetime).then(a.chamber.cmp(&b.chamber)));
}
