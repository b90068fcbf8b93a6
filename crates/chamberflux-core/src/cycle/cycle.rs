use crate::data_formats::gasdata::{parse_gas_data, GasDataError, RawMeasurement};
use crate::gastype::GasType;
use crate::stats::{fit_window, LinearRegressionResult};
use crate::utils::elapsed_secs;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;

/// All samples of one chamber within one file, ordered by time.
#[derive(Debug, Clone, Serialize)]
pub struct ChamberMeasurement {
    pub chamber: u32,
    pub measurements: Vec<RawMeasurement>,
    /// seconds since the first sample, one per measurement
    pub time_elapsed: Vec<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ChamberMeasurement {
    /// `measurements` must be non-empty and already sorted by time.
    fn from_sorted(chamber: u32, measurements: Vec<RawMeasurement>) -> Option<Self> {
        let start_time = measurements.first()?.datetime;
        let end_time = measurements.last()?.datetime;
        let time_elapsed =
            measurements.iter().map(|m| elapsed_secs(start_time, m.datetime)).collect();
        Some(Self { chamber, measurements, time_elapsed, start_time, end_time })
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn duration_seconds(&self) -> i64 {
        elapsed_secs(self.start_time, self.end_time)
    }

    /// `(time_elapsed, concentration)` pairs of one gas.
    pub fn series(&self, gas: GasType) -> Vec<(f64, f64)> {
        self.time_elapsed
            .iter()
            .zip(&self.measurements)
            .map(|(&t, m)| (t as f64, m.concentration(gas)))
            .collect()
    }

    /// Regress one gas against elapsed time inside `[head, tail]` seconds.
    pub fn regression(&self, gas: GasType, head: f64, tail: f64) -> LinearRegressionResult {
        fit_window(&self.series(gas), head, tail)
    }

    pub fn mean_concentration(&self, gas: GasType) -> f64 {
        if self.measurements.is_empty() {
            return 0.0;
        }
        self.measurements.iter().map(|m| m.concentration(gas)).sum::<f64>()
            / self.measurements.len() as f64
    }

    /// Mean of the logged air pressure, `None` when the file has no pressure readings.
    pub fn mean_pressure_kpa(&self) -> Option<f64> {
        mean_of(self.measurements.iter().filter_map(|m| m.pressure_kpa))
    }

    pub fn mean_temperature_c(&self) -> Option<f64> {
        mean_of(self.measurements.iter().filter_map(|m| m.temperature_c))
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Split samples per chamber. Groups come out ordered by chamber id, samples inside a group
/// by timestamp.
pub fn group_by_chamber(measurements: Vec<RawMeasurement>) -> Vec<ChamberMeasurement> {
    let mut groups: BTreeMap<u32, Vec<RawMeasurement>> = BTreeMap::new();
    for m in measurements {
        groups.entry(m.chamber).or_default().push(m);
    }

    groups
        .into_iter()
        .filter_map(|(chamber, mut samples)| {
            samples.sort_by_key(|m| m.datetime);
            ChamberMeasurement::from_sorted(chamber, samples)
        })
        .collect()
}

/// Result of reading one file into chamber series.
#[derive(Debug, Clone, Default)]
pub struct ChamberFile {
    pub chambers: Vec<ChamberMeasurement>,
    pub record_count: usize,
    pub skipped_rows: usize,
}

pub fn parse_and_group(contents: &str, tz: Tz) -> Result<ChamberFile, GasDataError> {
    let data = parse_gas_data(contents, tz)?;
    let record_count = data.measurements.len();
    Ok(ChamberFile {
        chambers: group_by_chamber(data.measurements),
        record_count,
        skipped_rows: data.skipped_rows,
    })
}
