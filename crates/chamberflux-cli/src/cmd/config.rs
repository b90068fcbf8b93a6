use chamberflux_core::aggregate::{aggregate, run_statistics};
use chamberflux_core::cycle_processor::{DataFile, Processor};
use chamberflux_core::export::{write_fluxes_csv, write_json};
use chamberflux_core::flux::{ConditionsPolicy, FluxResult};
use chamberflux_core::gastype::GasType;
use chamberflux_core::processevent::{
    drain_progress_messages, ProcessEvent, ProcessEventSink, ProgressEvent, ReadEvent,
};
use chamberflux_core::query::{
    chamber_regression, filtered_fluxes, summarize_files, DateRange, QueryError,
};
use chamberflux_core::site::SiteConfig;

use chrono::NaiveDate;
use chrono_tz::Tz;
use glob::glob;
use serde::Serialize;
use std::fs;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/* =================== Public configuration types =================== */

#[derive(Debug)]
pub struct Config {
    pub site_path: Option<PathBuf>,
    pub overrides: SiteOverrides,
    pub action: Action,
    pub progress_receiver: Option<UnboundedReceiver<ProcessEvent>>,
}

#[derive(Debug, Clone)]
pub enum Action {
    Fluxes(Fluxes),
    Regression(Regression),
    Daily(Range),
    Runs(Range),
    Files(Files),
}

#[derive(Debug, Clone)]
pub struct Fluxes {
    pub inputs: Vec<String>,
    pub output: Option<PathBuf>,
    pub csv: bool,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub qc_listing: bool,
}

#[derive(Debug, Clone)]
pub struct Regression {
    pub inputs: Vec<String>,
    pub output: Option<PathBuf>,
    pub file: String,
    pub chamber: u32,
    pub gas: GasType,
}

#[derive(Debug, Clone)]
pub struct Range {
    pub inputs: Vec<String>,
    pub output: Option<PathBuf>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct Files {
    pub inputs: Vec<String>,
    pub output: Option<PathBuf>,
}

/// Command line values that take precedence over the site file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteOverrides {
    pub co2_r2_min: Option<f64>,
    pub n2o_r2_min: Option<f64>,
    pub n2o_flux_min: Option<f64>,
    pub time_head: Option<f64>,
    pub time_tail: Option<f64>,
    pub chamber_height_cm: Option<f64>,
    pub meas_per_day: Option<u32>,
    pub tz: Option<Tz>,
    pub conditions: Option<ConditionsPolicy>,
}

impl SiteOverrides {
    pub fn apply(&self, site: &mut SiteConfig) {
        let q = &mut site.quality;
        if let Some(v) = self.co2_r2_min {
            q.co2_r2_min = v;
        }
        if let Some(v) = self.n2o_r2_min {
            q.n2o_r2_min = v;
        }
        if let Some(v) = self.n2o_flux_min {
            q.n2o_flux_min = v;
        }
        if let Some(v) = self.time_head {
            q.time_head = v;
        }
        if let Some(v) = self.time_tail {
            q.time_tail = v;
        }
        if let Some(v) = self.chamber_height_cm {
            site.chamber_height_cm = v;
        }
        if let Some(v) = self.meas_per_day {
            site.meas_per_day = v;
        }
        if let Some(tz) = self.tz {
            site.timezone = tz;
        }
        if let Some(c) = self.conditions {
            site.conditions = c;
        }
    }
}

/* =================== Error type (no process::exit) =================== */

#[derive(thiserror::Error, Debug)]
pub enum CmdError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Query(#[from] QueryError),
    #[error("{0}")]
    Msg(String),
}

/* =================== Entry point =================== */

impl Config {
    pub fn run(&mut self) -> Result<(), CmdError> {
        let site = self.load_site()?;
        match &self.action.clone() {
            Action::Fluxes(f) => self.run_fluxes(&site, f),
            Action::Regression(r) => self.run_regression(&site, r),
            Action::Daily(r) => self.run_daily(&site, r),
            Action::Runs(r) => self.run_runs(&site, r),
            Action::Files(f) => self.run_files(&site, f),
        }
    }

    fn load_site(&self) -> Result<SiteConfig, CmdError> {
        let mut site = match &self.site_path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    CmdError::Msg(format!("Could not read site file {}: {}", path.display(), e))
                })?;
                SiteConfig::from_json_str(&text).map_err(|e| {
                    CmdError::Msg(format!("Invalid site file {}: {}", path.display(), e))
                })?
            },
            None => SiteConfig::default(),
        };
        self.overrides.apply(&mut site);
        Ok(site)
    }
}

/* =================== Actions =================== */

impl Config {
    fn run_fluxes(&mut self, site: &SiteConfig, f: &Fluxes) -> Result<(), CmdError> {
        let range = match (f.start, f.end) {
            (None, None) if !f.qc_listing => None,
            (start, end) => Some(DateRange::from_options(start, end)?),
        };
        let mut results = self.compute_fluxes(site, &f.inputs)?;

        if let Some(range) = &range {
            if f.qc_listing {
                let listing = filtered_fluxes(&results, range, site.timezone);
                return write_output(f.output.as_deref(), &listing);
            }
            results.retain(|r| range.contains(r.datetime, site.timezone));
        }

        if f.csv {
            match f.output.as_deref() {
                Some(path) => write_fluxes_csv(BufWriter::new(File::create(path)?), &results)?,
                None => write_fluxes_csv(io::stdout().lock(), &results)?,
            }
            Ok(())
        } else {
            write_output(f.output.as_deref(), &results)
        }
    }

    fn run_regression(&mut self, site: &SiteConfig, r: &Regression) -> Result<(), CmdError> {
        let files = self.read_inputs(&r.inputs);
        let window = (site.quality.time_head, site.quality.time_tail);
        let reg = chamber_regression(&files, &r.file, r.chamber, r.gas, window, site.timezone)?;
        write_output(r.output.as_deref(), &reg)
    }

    fn run_daily(&mut self, site: &SiteConfig, r: &Range) -> Result<(), CmdError> {
        let params = site.aggregation_params(r.start, r.end)?;
        let results = self.compute_fluxes(site, &r.inputs)?;
        write_output(r.output.as_deref(), &aggregate(&results, &params))
    }

    fn run_runs(&mut self, site: &SiteConfig, r: &Range) -> Result<(), CmdError> {
        let range = DateRange::from_options(r.start, r.end)?;
        let results = self.compute_fluxes(site, &r.inputs)?;
        write_output(r.output.as_deref(), &run_statistics(&results, &range, site.timezone))
    }

    fn run_files(&mut self, site: &SiteConfig, f: &Files) -> Result<(), CmdError> {
        let files = self.read_inputs(&f.inputs);

        let (progress_sender, progress_receiver) = unbounded_channel::<ProcessEvent>();
        self.progress_receiver = Some(progress_receiver);
        let summaries = summarize_files(&files, site.timezone, &progress_sender);
        self.handle_progress_messages();
        write_output(f.output.as_deref(), &summaries)
    }

    /// Read the inputs and run the batch processor on a tokio runtime, printing progress
    /// while it works.
    fn compute_fluxes(
        &mut self,
        site: &SiteConfig,
        inputs: &[String],
    ) -> Result<Vec<FluxResult>, CmdError> {
        let params = site.flux_params()?;

        let (progress_sender, progress_receiver) = unbounded_channel::<ProcessEvent>();
        self.progress_receiver = Some(progress_receiver);

        let files = read_data_files(&resolve_inputs(inputs, &progress_sender), &progress_sender);
        if files.is_empty() {
            self.handle_progress_messages();
            return Err(CmdError::Msg("No readable input files.".to_owned()));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        let processor = Processor::new(params, progress_sender);
        let handle = runtime.spawn(async move { processor.run(files).await });

        loop {
            self.handle_progress_messages();
            if handle.is_finished() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        let results = runtime
            .block_on(handle)
            .map_err(|e| CmdError::Msg(format!("Flux processing failed: {e}")))?;
        self.handle_progress_messages();
        Ok(results)
    }

    fn read_inputs(&mut self, inputs: &[String]) -> Vec<DataFile> {
        let (progress_sender, progress_receiver) = unbounded_channel::<ProcessEvent>();
        self.progress_receiver = Some(progress_receiver);
        let files = read_data_files(&resolve_inputs(inputs, &progress_sender), &progress_sender);
        self.handle_progress_messages();
        files
    }

    pub fn handle_progress_messages(&mut self) {
        if let Some(mut receiver) = self.progress_receiver.take() {
            drain_progress_messages(self, &mut receiver);
            self.progress_receiver = Some(receiver);
        }
    }
}

// Data goes to stdout, so every event is printed on stderr.
impl ProcessEventSink for Config {
    fn on_read_event(&mut self, ev: &ReadEvent) {
        match ev {
            ReadEvent::File(filename) => {
                eprintln!("Read file: {}", filename);
            },
            ReadEvent::FileRows(filename, rows) => {
                eprintln!("Read file: {} with {} rows", filename, rows);
            },
            ReadEvent::RowsSkipped(filename, rows) => {
                eprintln!("Skipped {} unusable rows in {}", rows, filename);
            },
            ReadEvent::FileFail(filename, e) => {
                eprintln!("Failed to read file {}, error: {}", filename, e);
            },
        }
    }

    fn on_progress_event(&mut self, ev: &ProgressEvent) {
        match ev {
            ProgressEvent::Started(total) => {
                eprintln!("Processing {} file(s)", total);
            },
            ProgressEvent::FileDone { file, fluxes, done, total } => {
                eprintln!("[{}/{}] {}: {} fluxes", done, total, file, fluxes);
            },
            ProgressEvent::ChamberSkipped { file, chamber } => {
                eprintln!("Chamber {} in {} has no treatment assigned, skipped", chamber, file);
            },
        }
    }

    fn on_done(&mut self, res: &Result<(), String>) {
        match res {
            Ok(()) => {
                eprintln!("All processing finished.");
            },
            Err(e) => {
                eprintln!("Processing finished with error: {}", e);
            },
        }
    }
}

fn write_output<T: Serialize + ?Sized>(output: Option<&Path>, value: &T) -> Result<(), CmdError> {
    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write_json(&mut writer, value)?;
            writer.flush()?;
        },
        None => {
            let mut stdout = io::stdout().lock();
            write_json(&mut stdout, value)?;
            writeln!(stdout)?;
        },
    }
    Ok(())
}

/// Read every path as text. Unreadable or non-UTF-8 files are reported and left out.
fn read_data_files(paths: &[PathBuf], progress: &UnboundedSender<ProcessEvent>) -> Vec<DataFile> {
    let mut files = Vec::new();
    for path in paths {
        let name = path.display().to_string();
        match fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(contents) => files.push(DataFile::new(name, contents)),
                Err(_) => {
                    let _ = progress.send(ProcessEvent::Read(ReadEvent::file_fail(
                        name,
                        "file is not valid UTF-8",
                    )));
                },
            },
            Err(e) => {
                let _ = progress.send(ProcessEvent::Read(ReadEvent::file_fail(name, e)));
            },
        }
    }
    files
}

/// Expand glob patterns, keep literal paths. A malformed pattern is reported as a failed input.
fn resolve_inputs(inputs: &[String], progress: &UnboundedSender<ProcessEvent>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for inp in inputs {
        if inp.contains('*') || inp.contains('?') || inp.contains('[') {
            match glob(inp) {
                Ok(paths) => out.extend(paths.filter_map(Result::ok)),
                Err(e) => {
                    let _ = progress.send(ProcessEvent::Read(ReadEvent::file_fail(
                        inp.as_str(),
                        format!("invalid glob pattern: {e}"),
                    )));
                },
            }
        } else {
            out.push(PathBuf::from(inp));
        }
    }
    out.sort();
    out.dedup();
    out
}
