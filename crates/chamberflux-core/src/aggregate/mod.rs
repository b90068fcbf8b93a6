pub mod daily;
pub mod interpolate;
pub mod treatment;

pub use daily::{daily_flux_per_chamber, DailyFluxPerChamber};
pub use interpolate::{interpolate_chamber, interpolate_fluxes, time_grid, InterpolatedFluxPoint};
pub use treatment::{
    cumulative_treatment_flux, daily_treatment_flux, run_treatment_flux, CumulativeTreatmentFlux,
    DailyTreatmentFlux, RunTreatmentFlux,
};

use crate::flux::FluxResult;
use crate::query::{DateRange, QueryError};

use chrono_tz::Tz;
use serde::Serialize;

pub const DEFAULT_MEASUREMENTS_PER_DAY: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationParams {
    pub range: DateRange,
    pub measurements_per_day: u32,
    pub tz: Tz,
}

impl AggregationParams {
    pub fn new(range: DateRange, measurements_per_day: u32, tz: Tz) -> Result<Self, QueryError> {
        if measurements_per_day == 0 {
            return Err(QueryError::InvalidMeasurementsPerDay(measurements_per_day));
        }
        Ok(Self { range, measurements_per_day, tz })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationMetadata {
    pub total_interpolated_points: usize,
    pub daily_chamber_points: usize,
    #[serde(rename = "measPerDay")]
    pub meas_per_day: u32,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCumulativeFlux {
    pub daily: Vec<DailyTreatmentFlux>,
    pub cumulative: Vec<CumulativeTreatmentFlux>,
    pub metadata: AggregationMetadata,
}

/// Results that passed QC and were measured within the range.
pub fn select_good_in_range(results: &[FluxResult], range: &DateRange, tz: Tz) -> Vec<FluxResult> {
    results.iter().filter(|r| r.is_good() && range.contains(r.datetime, tz)).cloned().collect()
}

/// Interpolate each chamber onto the daily grid, average per chamber and day, then roll up
/// to treatment means, both daily and cumulative.
///
/// `results` may hold anything; only good results inside the range are used.
pub fn aggregate(results: &[FluxResult], params: &AggregationParams) -> DailyCumulativeFlux {
    let good = select_good_in_range(results, &params.range, params.tz);
    let grid = time_grid(&params.range, params.measurements_per_day, params.tz);

    let interpolated = interpolate_fluxes(&good, &grid, params.tz);
    let per_chamber = daily_flux_per_chamber(&interpolated);

    DailyCumulativeFlux {
        daily: daily_treatment_flux(&per_chamber),
        cumulative: cumulative_treatment_flux(&per_chamber),
        metadata: AggregationMetadata {
            total_interpolated_points: interpolated.len(),
            daily_chamber_points: per_chamber.len(),
            meas_per_day: params.measurements_per_day,
            date_range: params.range,
        },
    }
}

/// Per-run treatment statistics of the good results inside `range`.
pub fn run_statistics(results: &[FluxResult], range: &DateRange, tz: Tz) -> Vec<RunTreatmentFlux> {
    run_treatment_flux(&select_good_in_range(results, range, tz))
}
