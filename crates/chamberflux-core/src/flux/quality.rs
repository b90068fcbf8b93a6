use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug)]
pub struct ParseQualityFlagError(String);

impl fmt::Display for ParseQualityFlagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseQualityFlagError {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityFlag {
    Good,
    Poor,
    #[default]
    Failed,
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityFlag {
    type Err = ParseQualityFlagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "good" => Ok(QualityFlag::Good),
            "poor" => Ok(QualityFlag::Poor),
            "failed" => Ok(QualityFlag::Failed),
            other => Err(ParseQualityFlagError(format!("invalid quality flag: {other}"))),
        }
    }
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Good => "good",
            QualityFlag::Poor => "poor",
            QualityFlag::Failed => "failed",
        }
    }
}

/// Thresholds for accepting a flux and the elapsed-time window, in seconds, used for fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityControlCriteria {
    pub co2_r2_min: f64,
    pub n2o_r2_min: f64,
    pub n2o_flux_min: f64,
    pub time_head: f64,
    pub time_tail: f64,
}

impl Default for QualityControlCriteria {
    fn default() -> Self {
        Self { co2_r2_min: 0.6, n2o_r2_min: 0.6, n2o_flux_min: -5.0, time_head: 200.0, time_tail: 300.0 }
    }
}

impl QualityControlCriteria {
    pub fn window_is_valid(&self) -> bool {
        self.time_head.is_finite() && self.time_tail.is_finite() && self.time_head <= self.time_tail
    }

    /// The CO2 fit gates everything: without it the result is `Failed` whatever N2O looks
    /// like. With it, N2O fit and N2O flux decide between `Good` and `Poor`.
    pub fn classify(&self, co2_r2: f64, n2o_r2: f64, n2o_flux: f64) -> QualityFlag {
        let co2_ok = co2_r2 >= self.co2_r2_min;
        let n2o_ok = n2o_r2 >= self.n2o_r2_min;
        let n2o_flux_ok = n2o_flux >= self.n2o_flux_min;

        if co2_ok && n2o_ok && n2o_flux_ok {
            QualityFlag::Good
        } else if co2_ok {
            QualityFlag::Poor
        } else {
            QualityFlag::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria() -> QualityControlCriteria {
        QualityControlCriteria::default()
    }

    #[test]
    fn all_criteria_met_is_good() {
        assert_eq!(criteria().classify(0.9, 0.8, 1.0), QualityFlag::Good);
        // thresholds are inclusive
        assert_eq!(criteria().classify(0.6, 0.6, -5.0), QualityFlag::Good);
    }

    #[test]
    fn weak_n2o_with_good_co2_is_poor() {
        assert_eq!(criteria().classify(0.9, 0.3, 10.0), QualityFlag::Poor);
        assert_eq!(criteria().classify(0.9, 0.9, -10.0), QualityFlag::Poor);
    }

    #[test]
    fn weak_co2_is_failed_regardless_of_n2o() {
        assert_eq!(criteria().classify(0.3, 0.99, 100.0), QualityFlag::Failed);
        assert_eq!(criteria().classify(0.3, 0.0, -100.0), QualityFlag::Failed);
    }

    #[test]
    fn flag_round_trips_through_strings() {
        for flag in [QualityFlag::Good, QualityFlag::Poor, QualityFlag::Failed] {
            assert_eq!(flag.as_str().parse::<QualityFlag>().unwrap(), flag);
        }
        assert!("meh".parse::<QualityFlag>().is_err());
    }

    #[test]
    fn window_validation() {
        assert!(criteria().window_is_valid());
        let bad = QualityControlCriteria { time_head: 300.0, time_tail: 200.0, ..criteria() };
        assert!(!bad.window_is_valid());
    }

    #[test]
    fn missing_json_fields_take_defaults() {
        let c: QualityControlCriteria = serde_json::from_str(r#"{"co2_r2_min": 0.8}"#).unwrap();
        assert_eq!(c.co2_r2_min, 0.8);
        assert_eq!(c.time_tail, 300.0);
    }
}
