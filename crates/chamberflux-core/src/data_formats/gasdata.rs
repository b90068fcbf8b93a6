use crate::gastype::GasType;
use crate::utils::parse_local_datetime;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use csv::StringRecord;
use serde::Serialize;

use std::fmt;
use std::io::Read;

pub const DATE_COL: &str = "date";
pub const TIME_COL: &str = "time";
pub const CHAMBER_COL: &str = "chamber id";
pub const STATUS_COL: &str = "status";
pub const PRESSURE_COL: &str = "pair[kpa]";
pub const TEMPERATURE_COL: &str = "temp[c]";

#[derive(Debug)]
pub enum GasDataError {
    Csv(csv::Error),
    MissingColumn(String),
}

impl From<csv::Error> for GasDataError {
    fn from(err: csv::Error) -> Self {
        GasDataError::Csv(err)
    }
}

impl fmt::Display for GasDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasDataError::Csv(e) => write!(f, "CSV error: {e}"),
            GasDataError::MissingColumn(col) => write!(f, "required column '{col}' not found"),
        }
    }
}

impl std::error::Error for GasDataError {}

/// One analyzer sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawMeasurement {
    pub datetime: DateTime<Utc>,
    pub chamber: u32,
    pub co2_ppm: f64,
    pub n2o_ppb: f64,
    pub h2o_ppm: f64,
    pub status: String,
    pub pressure_kpa: Option<f64>,
    pub temperature_c: Option<f64>,
}

impl RawMeasurement {
    pub fn concentration(&self, gas: GasType) -> f64 {
        match gas {
            GasType::CO2 => self.co2_ppm,
            GasType::N2O => self.n2o_ppb,
            GasType::H2O => self.h2o_ppm,
        }
    }
}

/// Rows kept from one file plus the count of rows that were dropped.
#[derive(Debug, Clone, Default)]
pub struct GasData {
    pub measurements: Vec<RawMeasurement>,
    pub skipped_rows: usize,
}

struct ColumnIndex {
    date: usize,
    time: usize,
    chamber: usize,
    co2: usize,
    n2o: usize,
    h2o: Option<usize>,
    status: Option<usize>,
    pressure: Option<usize>,
    temperature: Option<usize>,
}

impl ColumnIndex {
    fn from_header(header: &StringRecord) -> Result<Self, GasDataError> {
        let find = |name: &str| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let require = |name: &str| find(name).ok_or_else(|| GasDataError::MissingColumn(name.to_owned()));

        Ok(Self {
            date: require(DATE_COL)?,
            time: require(TIME_COL)?,
            chamber: require(CHAMBER_COL)?,
            co2: require(GasType::CO2.column_name())?,
            n2o: require(GasType::N2O.column_name())?,
            h2o: find(GasType::H2O.column_name()),
            status: find(STATUS_COL),
            pressure: find(PRESSURE_COL),
            temperature: find(TEMPERATURE_COL),
        })
    }
}

/// Concentrations that don't parse are read as 0.
fn parse_or_zero(field: Option<&str>) -> f64 {
    parse_finite(field).unwrap_or(0.0)
}

fn parse_finite(field: Option<&str>) -> Option<f64> {
    field.and_then(|s| s.trim().parse::<f64>().ok()).filter(|v| v.is_finite())
}

/// Chamber ids are positive integers, anything else drops the row.
pub fn parse_chamber_id(field: &str) -> Option<u32> {
    let field = field.trim();
    if let Ok(id) = field.parse::<u32>() {
        return (id > 0).then_some(id);
    }
    let value = field.parse::<f64>().ok()?;
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

fn parse_row(record: &StringRecord, idx: &ColumnIndex, tz: Tz) -> Option<RawMeasurement> {
    let chamber = parse_chamber_id(record.get(idx.chamber)?)?;
    let datetime = parse_local_datetime(record.get(idx.date)?, record.get(idx.time)?, tz)?;

    let status = idx
        .status
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("0")
        .to_owned();

    Some(RawMeasurement {
        datetime,
        chamber,
        co2_ppm: parse_or_zero(record.get(idx.co2)),
        n2o_ppb: parse_or_zero(record.get(idx.n2o)),
        h2o_ppm: parse_or_zero(idx.h2o.and_then(|i| record.get(i))),
        status,
        pressure_kpa: parse_finite(idx.pressure.and_then(|i| record.get(i))),
        temperature_c: parse_finite(idx.temperature.and_then(|i| record.get(i))),
    })
}

/// Read an analyzer CSV export. Local `date`/`time` columns are resolved in `tz`.
///
/// Rows with a bad chamber id or an unreadable timestamp are skipped and counted. Missing
/// required columns make the whole file unreadable.
pub fn read_gas_data<R: Read>(reader: R, tz: Tz) -> Result<GasData, GasDataError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(reader);

    let header = rdr.headers()?.clone();
    let idx = ColumnIndex::from_header(&header)?;

    let mut data = GasData::default();
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(_) => {
                data.skipped_rows += 1;
                continue;
            },
        };
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match parse_row(&record, &idx, tz) {
            Some(m) => data.measurements.push(m),
            None => data.skipped_rows += 1,
        }
    }

    Ok(data)
}

pub fn parse_gas_data(contents: &str, tz: Tz) -> Result<GasData, GasDataError> {
    read_gas_data(contents.as_bytes(), tz)
}
