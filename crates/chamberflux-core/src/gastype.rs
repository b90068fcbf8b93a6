use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug)]
pub struct ParseGasError(String);

impl fmt::Display for ParseGasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for ParseGasError {}

/// Gas channels reported by the analyzer.
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GasType {
    #[default]
    CO2,
    N2O,
    H2O,
}

impl fmt::Display for GasType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GasType::CO2 => write!(f, "CO2"),
            GasType::N2O => write!(f, "N2O"),
            GasType::H2O => write!(f, "H2O"),
        }
    }
}

impl FromStr for GasType {
    type Err = ParseGasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "co2" => Ok(GasType::CO2),
            "n2o" => Ok(GasType::N2O),
            "h2o" => Ok(GasType::H2O),
            other => Err(ParseGasError(format!("Invalid gas: {other}"))),
        }
    }
}

impl GasType {
    /// Header of the concentration column in the analyzer export.
    pub fn column_name(&self) -> &'static str {
        match self {
            GasType::CO2 => "co2[ppm]",
            GasType::N2O => "n2o avg [ppb]",
            GasType::H2O => "h2o avg[ppm]",
        }
    }

    pub fn mol_mass(&self) -> f64 {
        match self {
            GasType::CO2 => 44.01,
            GasType::N2O => 44.013,
            GasType::H2O => 18.015,
        }
    }
}
