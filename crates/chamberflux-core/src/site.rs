use crate::aggregate::{AggregationParams, DEFAULT_MEASUREMENTS_PER_DAY};
use crate::cycle_processor::FluxParams;
use crate::data_formats::chamberdata::ChamberConfig;
use crate::flux::{ConditionsPolicy, QualityControlCriteria, DEFAULT_CHAMBER_HEIGHT_CM};
use crate::query::{DateRange, QueryError};

use chrono::NaiveDate;
use chrono_tz::{Tz, UTC};
use serde::{Deserialize, Serialize};

/// Static description of a measurement site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub timezone: Tz,
    #[serde(alias = "chamberHeight")]
    pub chamber_height_cm: f64,
    #[serde(alias = "measPerDay")]
    pub meas_per_day: u32,
    #[serde(alias = "qualityThresholds")]
    pub quality: QualityControlCriteria,
    #[serde(alias = "chamberConfigs")]
    pub chambers: Vec<ChamberConfig>,
    pub conditions: ConditionsPolicy,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            timezone: UTC,
            chamber_height_cm: DEFAULT_CHAMBER_HEIGHT_CM,
            meas_per_day: DEFAULT_MEASUREMENTS_PER_DAY,
            quality: QualityControlCriteria::default(),
            chambers: Vec::new(),
            conditions: ConditionsPolicy::default(),
        }
    }
}

impl SiteConfig {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn flux_params(&self) -> Result<FluxParams, QueryError> {
        Ok(FluxParams::new(&self.chambers, self.quality)?
            .with_height(self.chamber_height_cm)
            .with_tz(self.timezone)
            .with_conditions(self.conditions))
    }

    pub fn aggregation_params(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<AggregationParams, QueryError> {
        let range = DateRange::from_options(start, end)?;
        AggregationParams::new(range, self.meas_per_day, self.timezone)
    }
}
