use crate::cycle::parse_and_group;
use crate::cycle_processor::DataFile;
use crate::flux::{FilteredFlux, FluxResult};
use crate::gastype::GasType;
use crate::processevent::{ProcessEvent, ReadEvent};
use crate::stats::LinearRegressionResult;
use crate::utils::local_date;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;

/// Invalid or missing caller input. These are the only failures that reach the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("missing required date range parameter: {0}")]
    MissingDateRange(&'static str),
    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("unknown file: {0}")]
    UnknownFile(String),
    #[error("chamber {chamber} not found in file {file}")]
    UnknownChamber { file: String, chamber: u32 },
    #[error("could not read file {file}: {reason}")]
    UnreadableFile { file: String, reason: String },
    #[error("no chamber configuration supplied")]
    NoChamberConfig,
    #[error("measurements per day must be at least 1, got {0}")]
    InvalidMeasurementsPerDay(u32),
    #[error("invalid fitting window: head {head} s, tail {tail} s")]
    InvalidTimeWindow { head: f64, tail: f64 },
}

/// Inclusive range of local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(rename = "startDate")]
    pub start: NaiveDate,
    #[serde(rename = "endDate")]
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn from_options(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, QueryError> {
        let start = start.ok_or(QueryError::MissingDateRange("startDate"))?;
        let end = end.ok_or(QueryError::MissingDateRange("endDate"))?;
        Self::new(start, end)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether `dt` falls on one of the dates as seen in `tz`.
    pub fn contains(&self, dt: DateTime<Utc>, tz: Tz) -> bool {
        self.contains_date(local_date(dt, tz))
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// Flux listing with a pass/fail verdict, limited to `range` and ordered by time.
pub fn filtered_fluxes(results: &[FluxResult], range: &DateRange, tz: Tz) -> Vec<FilteredFlux> {
    let mut selected: Vec<&FluxResult> =
        results.iter().filter(|r| range.contains(r.datetime, tz)).collect();
    selected.sort_by(|a, b| a.datetime.cmp(&b.datetime).then(a.chamber.cmp(&b.chamber)));
    selected.into_iter().map(FilteredFlux::from).collect()
}

fn find_file<'a>(files: &'a [DataFile], name: &str) -> Result<&'a DataFile, QueryError> {
    files
        .iter()
        .find(|f| f.name == name)
        .or_else(|| {
            files.iter().find(|f| {
                Path::new(&f.name).file_name().is_some_and(|n| n.to_string_lossy() == name)
            })
        })
        .ok_or_else(|| QueryError::UnknownFile(name.to_owned()))
}

/// Full regression of one gas of one chamber, with every point and its window membership.
#[derive(Debug, Clone, Serialize)]
pub struct ChamberRegression {
    pub file: String,
    pub run_id: String,
    pub chamber: u32,
    pub gas: GasType,
    #[serde(flatten)]
    pub regression: LinearRegressionResult,
}

pub fn chamber_regression(
    files: &[DataFile],
    file_name: &str,
    chamber: u32,
    gas: GasType,
    window: (f64, f64),
    tz: Tz,
) -> Result<ChamberRegression, QueryError> {
    let (head, tail) = window;
    if !(head.is_finite() && tail.is_finite() && head <= tail) {
        return Err(QueryError::InvalidTimeWindow { head, tail });
    }

    let file = find_file(files, file_name)?;
    let grouped = parse_and_group(&file.contents, tz).map_err(|e| {
        QueryError::UnreadableFile { file: file.name.clone(), reason: e.to_string() }
    })?;

    let measurement = grouped
        .chambers
        .iter()
        .find(|c| c.chamber == chamber)
        .ok_or_else(|| QueryError::UnknownChamber { file: file.name.clone(), chamber })?;

    Ok(ChamberRegression {
        file: file.name.clone(),
        run_id: file.run_id(),
        chamber,
        gas,
        regression: measurement.regression(gas, head, tail),
    })
}

/// What one data file contains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFileSummary {
    pub filename: String,
    pub run_id: String,
    /// local date of the first sample
    pub date: NaiveDate,
    /// local time of the first sample, HH:MM:SS
    pub time: String,
    pub chambers: Vec<u32>,
    pub record_count: usize,
    #[serde(skip)]
    pub first_sample: DateTime<Utc>,
}

/// Summarize every readable file, newest first. Files without usable rows are reported on
/// `progress` and left out.
pub fn summarize_files(
    files: &[DataFile],
    tz: Tz,
    progress: &UnboundedSender<ProcessEvent>,
) -> Vec<DataFileSummary> {
    let mut summaries: Vec<DataFileSummary> = files
        .par_iter()
        .filter_map(|file| {
            let grouped = match parse_and_group(&file.contents, tz) {
                Ok(g) => g,
                Err(e) => {
                    let _ = progress.send(ProcessEvent::Read(ReadEvent::file_fail(&file.name, e)));
                    return None;
                },
            };
            let Some(first_sample) = grouped.chambers.iter().map(|c| c.start_time).min() else {
                let _ = progress.send(ProcessEvent::Read(ReadEvent::file_fail(
                    &file.name,
                    "no usable rows",
                )));
                return None;
            };
            let local = first_sample.with_timezone(&tz);
            Some(DataFileSummary {
                filename: file.name.clone(),
                run_id: file.run_id(),
                date: local.date_naive(),
                time: local.format("%H:%M:%S").to_string(),
                chambers: grouped.chambers.iter().map(|c| c.chamber).collect(),
                record_count: grouped.record_count,
                first_sample,
            })
        })
        .collect();

    summaries.sort_by(|a, b| b.first_sample.cmp(&a.first_sample).then(a.filename.cmp(&b.filename)));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::QualityFlag;
    use chrono::TimeZone;
    use chrono_tz::UTC;
    use tokio::sync::mpsc::unbounded_channel;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn file(name: &str, day: u32, chambers: &[u32]) -> DataFile {
        let mut csv = "date,time,chamber id,co2[ppm],n2o avg [ppb],h2o avg[ppm],status".to_owned();
        for c in chambers {
            for s in 0..5 {
                csv.push_str(&format!(
                    "\n{day:02}/07/2024,10:0{c}:{:02},{c},{},330,12000,0",
                    s * 10,
                    400 + s * 2
                ));
            }
        }
        DataFile::new(name, csv)
    }

    #[test]
    fn date_range_validation() {
        assert_eq!(
            DateRange::from_options(None, Some(date(2024, 7, 1))),
            Err(QueryError::MissingDateRange("startDate"))
        );
        assert_eq!(
            DateRange::from_options(Some(date(2024, 7, 1)), None),
            Err(QueryError::MissingDateRange("endDate"))
        );
        assert!(matches!(
            DateRange::new(date(2024, 7, 2), date(2024, 7, 1)),
            Err(QueryError::InvalidDateRange { .. })
        ));
        let range = DateRange::new(date(2024, 7, 1), date(2024, 7, 3)).unwrap();
        assert_eq!(range.days().count(), 3);
        assert!(range.contains_date(date(2024, 7, 3)));
        assert!(!range.contains_date(date(2024, 7, 4)));
    }

    #[test]
    fn date_range_serializes_with_camel_case_keys() {
        let range = DateRange::new(date(2024, 7, 1), date(2024, 7, 3)).unwrap();
        let json = serde_json::to_value(range).unwrap();
        assert_eq!(json["startDate"], "2024-07-01");
        assert_eq!(json["endDate"], "2024-07-03");
    }

    #[test]
    fn regression_query_finds_chamber() {
        let files = vec![file("data/run_20240701_1000.csv", 1, &[1, 2])];
        let reg =
            chamber_regression(&files, "run_20240701_1000.csv", 2, GasType::CO2, (0.0, 40.0), UTC)
                .unwrap();
        assert_eq!(reg.chamber, 2);
        assert_eq!(reg.run_id, "20240701_100000");
        assert_eq!(reg.regression.points_used, 5);
        assert!((reg.regression.slope - 0.2).abs() < 1e-9);
        assert_eq!(reg.regression.data_points.len(), 5);
    }

    #[test]
    fn regression_query_errors() {
        let files = vec![file("a.csv", 1, &[1])];
        assert_eq!(
            chamber_regression(&files, "missing.csv", 1, GasType::CO2, (0.0, 40.0), UTC)
                .unwrap_err(),
            QueryError::UnknownFile("missing.csv".to_owned())
        );
        assert_eq!(
            chamber_regression(&files, "a.csv", 7, GasType::N2O, (0.0, 40.0), UTC).unwrap_err(),
            QueryError::UnknownChamber { file: "a.csv".to_owned(), chamber: 7 }
        );
        assert!(matches!(
            chamber_regression(&files, "a.csv", 1, GasType::CO2, (50.0, 10.0), UTC),
            Err(QueryError::InvalidTimeWindow { .. })
        ));
    }

    #[test]
    fn files_listed_newest_first() {
        let (tx, mut rx) = unbounded_channel();
        let files = vec![
            file("old.csv", 1, &[3, 1]),
            DataFile::new("broken.csv", "not,a,gas,file"),
            file("new.csv", 2, &[2]),
        ];
        let summaries = summarize_files(&files, UTC, &tx);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].filename, "new.csv");
        assert_eq!(summaries[1].chambers, vec![1, 3]);
        assert_eq!(summaries[1].record_count, 10);
        assert_eq!(summaries[1].time, "10:01:00");
        assert_eq!(summaries[1].date, date(2024, 7, 1));
        assert!(matches!(rx.try_recv(), Ok(ProcessEvent::Read(ReadEvent::FileFail(_, _)))));
    }

    #[test]
    fn filtered_listing_marks_qc() {
        let base = FluxResult {
            datetime: Utc.with_ymd_and_hms(2024, 7, 2, 8, 0, 0).unwrap(),
            run_id: "r".to_owned(),
            chamber: 1,
            treatment: "t".to_owned(),
            replicate: 1,
            co2_flux: 1.0,
            n2o_flux: 1.0,
            h2o_avg: 1.0,
            co2_r2: 0.9,
            n2o_r2: 0.9,
            co2_slope: 0.0,
            n2o_slope: 0.0,
            measurement_start_time: "08:00".to_owned(),
            duration_seconds: 300,
            quality_flag: QualityFlag::Good,
            points_used: 10,
            points_total: 30,
        };
        let poor = FluxResult {
            datetime: Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap(),
            quality_flag: QualityFlag::Poor,
            ..base.clone()
        };
        let outside = FluxResult {
            datetime: Utc.with_ymd_and_hms(2024, 7, 9, 8, 0, 0).unwrap(),
            ..base.clone()
        };
        let range = DateRange::new(date(2024, 7, 1), date(2024, 7, 2)).unwrap();
        let listed = filtered_fluxes(&[base, poor, outside], &range, UTC);
        assert_eq!(listed.len(), 2);
        assert!(!listed[0].passed_qc);
        assert!(listed[1].passed_qc);
    }
}
