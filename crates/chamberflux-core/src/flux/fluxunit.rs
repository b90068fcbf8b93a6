use crate::gastype::GasType;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Molar volume of an ideal gas at 0 °C and 101.325 kPa, L/mol.
pub const STP_MOLAR_VOLUME: f64 = 22.4;
pub const STP_TEMPERATURE_K: f64 = 273.15;
pub const STANDARD_PRESSURE_KPA: f64 = 101.325;
pub const DEFAULT_TEMPERATURE_C: f64 = 25.0;
pub const DEFAULT_CHAMBER_HEIGHT_CM: f64 = 15.0;

pub const CARBON_MOL_MASS: f64 = 12.01;
/// two nitrogen atoms per N2O molecule
pub const NITROGEN_MOL_MASS_N2: f64 = 28.014;

const SECONDS_PER_DAY: f64 = 86_400.0;
const M2_PER_HA: f64 = 10_000.0;
const PPB_PER_PPM: f64 = 1_000.0;
const MG_PER_KG: f64 = 1_000_000.0;
const MG_PER_G: f64 = 1_000.0;

#[derive(Debug)]
pub struct ParseConditionsError(String);

impl fmt::Display for ParseConditionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseConditionsError {}

/// Air temperature and pressure inside the chamber.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientConditions {
    pub temperature_c: f64,
    pub pressure_kpa: f64,
}

impl Default for AmbientConditions {
    fn default() -> Self {
        Self { temperature_c: DEFAULT_TEMPERATURE_C, pressure_kpa: STANDARD_PRESSURE_KPA }
    }
}

impl AmbientConditions {
    /// Missing or physically impossible readings fall back to 25 °C / 101.325 kPa.
    pub fn from_readings(temperature_c: Option<f64>, pressure_kpa: Option<f64>) -> Self {
        let defaults = Self::default();
        let temperature_c = temperature_c
            .filter(|t| t.is_finite() && *t > -STP_TEMPERATURE_K)
            .unwrap_or(defaults.temperature_c);
        let pressure_kpa =
            pressure_kpa.filter(|p| p.is_finite() && *p > 0.0).unwrap_or(defaults.pressure_kpa);
        Self { temperature_c, pressure_kpa }
    }

    pub fn molar_volume(&self) -> f64 {
        molar_volume(self.temperature_c, self.pressure_kpa)
    }
}

/// Where the molar-volume correction takes its temperature and pressure from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionsPolicy {
    /// Always 25 °C / 101.325 kPa.
    #[default]
    Standard,
    /// Chamber means of `temp[c]` / `pair[kpa]` where present.
    Measured,
}

impl ConditionsPolicy {
    pub fn conditions(&self, temperature_c: Option<f64>, pressure_kpa: Option<f64>) -> AmbientConditions {
        match self {
            ConditionsPolicy::Standard => AmbientConditions::default(),
            ConditionsPolicy::Measured => AmbientConditions::from_readings(temperature_c, pressure_kpa),
        }
    }
}

impl fmt::Display for ConditionsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionsPolicy::Standard => write!(f, "standard"),
            ConditionsPolicy::Measured => write!(f, "measured"),
        }
    }
}

impl FromStr for ConditionsPolicy {
    type Err = ParseConditionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(ConditionsPolicy::Standard),
            "measured" => Ok(ConditionsPolicy::Measured),
            other => Err(ParseConditionsError(format!("Invalid conditions policy: {other}"))),
        }
    }
}

/// Ideal-gas molar volume in L/mol, scaled from STP to the given temperature and pressure.
pub fn molar_volume(temperature_c: f64, pressure_kpa: f64) -> f64 {
    let t_kelvin = temperature_c + STP_TEMPERATURE_K;
    STP_MOLAR_VOLUME * (t_kelvin / STP_TEMPERATURE_K) * (STANDARD_PRESSURE_KPA / pressure_kpa)
}

/// Reporting units. Fluxes are expressed as mass of the element of interest, carbon for CO2
/// and nitrogen for N2O, not as mass of the whole molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FluxUnit {
    KgCHaD,
    GNHaD,
}

impl fmt::Display for FluxUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluxUnit::KgCHaD => write!(f, "kg C/ha/d"),
            FluxUnit::GNHaD => write!(f, "g N/ha/d"),
        }
    }
}

impl FluxUnit {
    /// Convert a concentration slope (ppm/s for CO2, ppb/s for N2O) into this unit.
    pub fn from_slope(
        &self,
        slope: f64,
        chamber_height_cm: f64,
        conditions: AmbientConditions,
    ) -> f64 {
        match self {
            FluxUnit::KgCHaD => co2_flux_kg_c_ha_d(slope, chamber_height_cm, conditions),
            FluxUnit::GNHaD => n2o_flux_g_n_ha_d(slope, chamber_height_cm, conditions),
        }
    }
}

/// ppm/s -> kg C/ha/d
pub fn co2_flux_kg_c_ha_d(
    slope_ppm_s: f64,
    chamber_height_cm: f64,
    conditions: AmbientConditions,
) -> f64 {
    let height_m = chamber_height_cm / 100.0;
    let mol_mass = GasType::CO2.mol_mass();
    let carbon_fraction = CARBON_MOL_MASS / mol_mass;
    slope_ppm_s
        * height_m
        * M2_PER_HA
        * (mol_mass / conditions.molar_volume())
        * carbon_fraction
        * SECONDS_PER_DAY
        / MG_PER_KG
}

/// ppb/s -> g N/ha/d
pub fn n2o_flux_g_n_ha_d(
    slope_ppb_s: f64,
    chamber_height_cm: f64,
    conditions: AmbientConditions,
) -> f64 {
    let height_m = chamber_height_cm / 100.0;
    let mol_mass = GasType::N2O.mol_mass();
    let nitrogen_fraction = NITROGEN_MOL_MASS_N2 / mol_mass;
    (slope_ppb_s / PPB_PER_PPM)
        * height_m
        * M2_PER_HA
        * (mol_mass / conditions.molar_volume())
        * nitrogen_fraction
        * SECONDS_PER_DAY
        / MG_PER_G
}
