use chamberflux_core::flux::ConditionsPolicy;
use chamberflux_core::gastype::GasType;
use chamberflux_core::utils::parse_dmy_date;

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

use crate::cmd::config::{
    Action, Config, Files as FilesCfg, Fluxes as FluxesCfg, Range as RangeCfg,
    Regression as RegressionCfg, SiteOverrides,
};

fn parse_date_str(s: &str) -> Result<NaiveDate, String> {
    parse_dmy_date(s).ok_or_else(|| format!("Could not parse date '{s}', use YYYY-MM-DD or D/M/YYYY"))
}

#[derive(Debug, Parser)]
#[command(
    name = "chamberflux",
    about = "Chamber greenhouse-gas flux calculation and aggregation",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Site configuration file (JSON)
    #[arg(long = "site", value_name = "PATH", global = true, value_hint = ValueHint::FilePath)]
    pub site: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings that replace the ones in the site file.
#[derive(Debug, Args)]
pub struct OverrideArgs {
    /// Minimum CO2 r² for a usable flux
    #[arg(long = "co2-r2-min", global = true)]
    pub co2_r2_min: Option<f64>,

    /// Minimum N2O r² for a good flux
    #[arg(long = "n2o-r2-min", global = true)]
    pub n2o_r2_min: Option<f64>,

    /// Lowest accepted N2O flux, g N/ha/d
    #[arg(long = "n2o-flux-min", global = true, allow_hyphen_values = true)]
    pub n2o_flux_min: Option<f64>,

    /// Start of the fitting window, seconds since first sample
    #[arg(long = "head", global = true)]
    pub head: Option<f64>,

    /// End of the fitting window, seconds since first sample
    #[arg(long = "tail", global = true)]
    pub tail: Option<f64>,

    /// Chamber height in cm
    #[arg(long = "height", global = true)]
    pub height: Option<f64>,

    /// Interpolation grid points per day
    #[arg(long = "meas-per-day", global = true)]
    pub meas_per_day: Option<u32>,

    /// Site timezone, e.g. Europe/Helsinki
    #[arg(short = 'z', long = "tz", global = true)]
    pub tz: Option<Tz>,

    /// Ambient conditions for the molar volume: standard or measured
    #[arg(long = "conditions", global = true)]
    pub conditions: Option<ConditionsPolicy>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute a flux for every configured chamber in every input file
    Fluxes(FluxesArgs),

    /// Show the regression of one gas of one chamber
    Regression(RegressionArgs),

    /// Daily and cumulative treatment fluxes over a date range
    Daily(RangeArgs),

    /// Treatment statistics per measurement run over a date range
    Runs(RangeArgs),

    /// List the input files and what they contain
    Files(FilesArgs),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Gas data files or glob patterns (quote the pattern)
    #[arg(num_args = 1..,
        value_hint = ValueHint::AnyPath,
        required = true,
        short = 'i', long = "inputs",
        value_name = "Input files")]
    pub inputs: Vec<String>,

    /// Write to this file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FluxesArgs {
    #[command(flatten)]
    pub io: InputArgs,

    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// First date to list
    #[arg(short = 's', long = "start", value_parser = parse_date_str, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last date to list
    #[arg(short = 'e', long = "end", value_parser = parse_date_str, value_name = "DATE")]
    pub end: Option<NaiveDate>,

    /// List fluxes with a passed/failed QC verdict instead of full records
    #[arg(long = "qc")]
    pub qc_listing: bool,
}

#[derive(Debug, Args)]
pub struct RegressionArgs {
    #[command(flatten)]
    pub io: InputArgs,

    /// Name of the file the chamber was measured in
    #[arg(long = "file")]
    pub file: String,

    #[arg(short = 'c', long = "chamber")]
    pub chamber: u32,

    #[arg(short = 'g', long = "gas", default_value = "co2")]
    pub gas: GasType,
}

#[derive(Debug, Args)]
pub struct RangeArgs {
    #[command(flatten)]
    pub io: InputArgs,

    /// First date
    #[arg(short = 's', long = "start", value_parser = parse_date_str, value_name = "DATE")]
    pub start: Option<NaiveDate>,

    /// Last date
    #[arg(short = 'e', long = "end", value_parser = parse_date_str, value_name = "DATE")]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct FilesArgs {
    #[command(flatten)]
    pub io: InputArgs,
}

impl From<OverrideArgs> for SiteOverrides {
    fn from(a: OverrideArgs) -> Self {
        SiteOverrides {
            co2_r2_min: a.co2_r2_min,
            n2o_r2_min: a.n2o_r2_min,
            n2o_flux_min: a.n2o_flux_min,
            time_head: a.head,
            time_tail: a.tail,
            chamber_height_cm: a.height,
            meas_per_day: a.meas_per_day,
            tz: a.tz,
            conditions: a.conditions,
        }
    }
}

impl From<RangeArgs> for RangeCfg {
    fn from(r: RangeArgs) -> Self {
        RangeCfg { inputs: r.io.inputs, output: r.io.output, start: r.start, end: r.end }
    }
}

// -------- Map CLI -> Config/Action types --------

impl Cli {
    pub fn into_config(self) -> Config {
        let action = match self.command {
            Commands::Fluxes(f) => Action::Fluxes(FluxesCfg {
                inputs: f.io.inputs,
                output: f.io.output,
                csv: f.format == OutputFormat::Csv,
                start: f.start,
                end: f.end,
                qc_listing: f.qc_listing,
            }),
            Commands::Regression(r) => Action::Regression(RegressionCfg {
                inputs: r.io.inputs,
                output: r.io.output,
                file: r.file,
                chamber: r.chamber,
                gas: r.gas,
            }),
            Commands::Daily(r) => Action::Daily(r.into()),
            Commands::Runs(r) => Action::Runs(r.into()),
            Commands::Files(f) => {
                Action::Files(FilesCfg { inputs: f.io.inputs, output: f.io.output })
            },
        };

        Config {
            site_path: self.site,
            overrides: self.overrides.into(),
            action,
            progress_receiver: None,
        }
    }
}
