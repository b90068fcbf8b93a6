use crate::cycle::{parse_and_group, run_id_from_filename, ChamberMeasurement};
use crate::data_formats::chamberdata::{ChamberConfig, ChamberRegistry};
use crate::data_formats::gasdata::GasDataError;
use crate::flux::{
    sort_fluxes, ConditionsPolicy, FluxResult, FluxUnit, QualityControlCriteria,
    DEFAULT_CHAMBER_HEIGHT_CM,
};
use crate::gastype::GasType;
use crate::processevent::{ProcessEvent, ProgressEvent, ReadEvent};
use crate::query::QueryError;

use chrono_tz::{Tz, UTC};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub const MAX_CONCURRENT_TASKS: usize = 10;

/// Raw text of one analyzer export together with its file name.
#[derive(Debug, Clone)]
pub struct DataFile {
    pub name: String,
    pub contents: String,
}

impl DataFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self { name: name.into(), contents: contents.into() }
    }

    pub fn run_id(&self) -> String {
        run_id_from_filename(&self.name)
    }
}

/// Everything a flux calculation needs besides the data itself.
#[derive(Debug, Clone)]
pub struct FluxParams {
    pub chambers: ChamberRegistry,
    pub criteria: QualityControlCriteria,
    pub chamber_height_cm: f64,
    pub tz: Tz,
    pub conditions: ConditionsPolicy,
}

impl FluxParams {
    pub fn new(
        configs: &[ChamberConfig],
        criteria: QualityControlCriteria,
    ) -> Result<Self, QueryError> {
        if configs.is_empty() {
            return Err(QueryError::NoChamberConfig);
        }
        if !criteria.window_is_valid() {
            return Err(QueryError::InvalidTimeWindow {
                head: criteria.time_head,
                tail: criteria.time_tail,
            });
        }
        Ok(Self {
            chambers: ChamberRegistry::from_configs(configs),
            criteria,
            chamber_height_cm: DEFAULT_CHAMBER_HEIGHT_CM,
            tz: UTC,
            conditions: ConditionsPolicy::default(),
        })
    }

    pub fn with_height(mut self, chamber_height_cm: f64) -> Self {
        self.chamber_height_cm = chamber_height_cm;
        self
    }

    pub fn with_tz(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionsPolicy) -> Self {
        self.conditions = conditions;
        self
    }
}

/// Fit both gases over the criteria window and turn the slopes into one flux record.
pub fn calculate_chamber_flux(
    chamber: &ChamberMeasurement,
    config: &ChamberConfig,
    params: &FluxParams,
    run_id: &str,
) -> FluxResult {
    let criteria = &params.criteria;
    let (co2_reg, n2o_reg) = rayon::join(
        || chamber.regression(GasType::CO2, criteria.time_head, criteria.time_tail),
        || chamber.regression(GasType::N2O, criteria.time_head, criteria.time_tail),
    );

    let conditions =
        params.conditions.conditions(chamber.mean_temperature_c(), chamber.mean_pressure_kpa());
    let co2_flux =
        FluxUnit::KgCHaD.from_slope(co2_reg.slope, params.chamber_height_cm, conditions);
    let n2o_flux = FluxUnit::GNHaD.from_slope(n2o_reg.slope, params.chamber_height_cm, conditions);

    let quality_flag = criteria.classify(co2_reg.r_squared, n2o_reg.r_squared, n2o_flux);

    FluxResult {
        datetime: chamber.start_time,
        run_id: run_id.to_owned(),
        chamber: chamber.chamber,
        treatment: config.treatment.clone(),
        replicate: config.replicate,
        co2_flux,
        n2o_flux,
        h2o_avg: chamber.mean_concentration(GasType::H2O),
        co2_r2: co2_reg.r_squared,
        n2o_r2: n2o_reg.r_squared,
        co2_slope: co2_reg.slope,
        n2o_slope: n2o_reg.slope,
        measurement_start_time: chamber
            .start_time
            .with_timezone(&params.tz)
            .format("%H:%M")
            .to_string(),
        duration_seconds: chamber.duration_seconds(),
        quality_flag,
        points_used: co2_reg.points_used.min(n2o_reg.points_used),
        points_total: chamber.len(),
    }
}

/// Results of one file, with what was left out.
#[derive(Debug, Clone, Default)]
pub struct FileFluxes {
    pub run_id: String,
    pub results: Vec<FluxResult>,
    /// Chambers present in the data but missing from the chamber configuration.
    pub unconfigured: Vec<u32>,
    pub record_count: usize,
    pub skipped_rows: usize,
}

/// Parse one file and compute a flux for every configured chamber in it.
pub fn calculate_file_fluxes(
    file: &DataFile,
    params: &FluxParams,
) -> Result<FileFluxes, GasDataError> {
    let grouped = parse_and_group(&file.contents, params.tz)?;
    let run_id = file.run_id();

    let unconfigured = grouped
        .chambers
        .iter()
        .map(|c| c.chamber)
        .filter(|id| params.chambers.get(*id).is_none())
        .collect();

    let results = grouped
        .chambers
        .par_iter()
        .filter_map(|chamber| {
            let config = params.chambers.get(chamber.chamber)?;
            Some(calculate_chamber_flux(chamber, config, params, &run_id))
        })
        .collect();

    Ok(FileFluxes {
        run_id,
        results,
        unconfigured,
        record_count: grouped.record_count,
        skipped_rows: grouped.skipped_rows,
    })
}

/// Like [`calculate_file_fluxes`], but an unreadable file becomes an event and no results.
pub fn process_file(
    file: &DataFile,
    params: &FluxParams,
    progress: &UnboundedSender<ProcessEvent>,
) -> Vec<FluxResult> {
    let _ = progress.send(ProcessEvent::Read(ReadEvent::File(file.name.clone())));

    let fluxes = match calculate_file_fluxes(file, params) {
        Ok(f) => f,
        Err(e) => {
            let _ = progress.send(ProcessEvent::Read(ReadEvent::file_fail(&file.name, e)));
            return Vec::new();
        },
    };

    let _ = progress
        .send(ProcessEvent::Read(ReadEvent::FileRows(file.name.clone(), fluxes.record_count)));
    if fluxes.skipped_rows > 0 {
        let _ = progress.send(ProcessEvent::Read(ReadEvent::RowsSkipped(
            file.name.clone(),
            fluxes.skipped_rows,
        )));
    }
    for chamber in &fluxes.unconfigured {
        let _ = progress.send(ProcessEvent::Progress(ProgressEvent::ChamberSkipped {
            file: file.name.clone(),
            chamber: *chamber,
        }));
    }

    fluxes.results
}

pub struct Processor {
    params: Arc<FluxParams>,
    progress: UnboundedSender<ProcessEvent>,
}

impl Processor {
    pub fn new(params: FluxParams, progress: UnboundedSender<ProcessEvent>) -> Self {
        Self { params: Arc::new(params), progress }
    }

    /// Process every file on the blocking pool, a bounded number at a time.
    ///
    /// A file that fails to parse, or whose task dies, is reported and contributes nothing.
    /// The returned fluxes are sorted by time, then chamber.
    pub async fn run(&self, files: Vec<DataFile>) -> Vec<FluxResult> {
        let total = files.len();
        let _ = self.progress.send(ProcessEvent::Progress(ProgressEvent::Started(total)));

        let mut queue = VecDeque::from(files);
        let mut active_tasks = Vec::new();
        // kept index-aligned with active_tasks
        let mut active_names: Vec<String> = Vec::new();
        let mut all_results = Vec::new();
        let mut done = 0;

        while !queue.is_empty() || !active_tasks.is_empty() {
            while active_tasks.len() < MAX_CONCURRENT_TASKS {
                let Some(file) = queue.pop_front() else { break };

                let params = Arc::clone(&self.params);
                let progress_sender = self.progress.clone();
                active_names.push(file.name.clone());

                let task = tokio::task::spawn_blocking(move || {
                    process_file(&file, &params, &progress_sender)
                });
                active_tasks.push(task);
            }

            let (result, i, remaining_tasks) = futures::future::select_all(active_tasks).await;
            active_tasks = remaining_tasks;
            // select_all drops the finished future with swap_remove
            let name = active_names.swap_remove(i);
            done += 1;

            match result {
                Ok(results) => {
                    let _ = self.progress.send(ProcessEvent::Progress(ProgressEvent::FileDone {
                        file: name,
                        fluxes: results.len(),
                        done,
                        total,
                    }));
                    all_results.extend(results);
                },
                Err(e) => {
                    let _ = self.progress.send(ProcessEvent::Read(ReadEvent::file_fail(
                        name,
                        format!("processing task failed: {e}"),
                    )));
                },
            }
        }

        sort_fluxes(&mut all_results);
        let _ = self.progress.send(ProcessEvent::Done(Ok(())));
        all_results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::{AmbientConditions, QualityFlag};
    use tokio::sync::mpsc::unbounded_channel;

    const HEADER: &str = "date,time,chamber id,co2[ppm],n2o avg [ppb],h2o avg[ppm],status";

    /// Chamber `c` rises by `co2_rate` ppm/s and `n2o_rate` ppb/s over 0..=400 s in 10 s steps.
    fn chamber_rows(out: &mut String, c: u32, start_minute: u32, co2_rate: f64, n2o_rate: f64) {
        for step in 0..=40 {
            let secs = step * 10;
            let minute = start_minute + secs / 60;
            let second = secs % 60;
            out.push_str(&format!(
                "\n01/07/2024,12:{minute:02}:{second:02},{c},{},{},15000,0",
                400.0 + co2_rate * secs as f64,
                330.0 + n2o_rate * secs as f64,
            ));
        }
    }

    fn file_with_chambers(chambers: &[u32]) -> String {
        let mut csv = HEADER.to_owned();
        for (i, c) in chambers.iter().enumerate() {
            chamber_rows(&mut csv, *c, i as u32 * 8, 0.05, 0.01);
        }
        csv
    }

    fn params() -> FluxParams {
        let configs = vec![
            ChamberConfig::new(1, "control", 1),
            ChamberConfig::new(2, "control", 2),
            ChamberConfig::new(3, "biochar", 1),
        ];
        FluxParams::new(&configs, QualityControlCriteria::default()).unwrap()
    }

    #[test]
    fn rejects_empty_chamber_config() {
        let err = FluxParams::new(&[], QualityControlCriteria::default()).unwrap_err();
        assert_eq!(err, QueryError::NoChamberConfig);
    }

    #[test]
    fn rejects_inverted_window() {
        let criteria = QualityControlCriteria { time_head: 300.0, time_tail: 200.0, ..Default::default() };
        let err = FluxParams::new(&[ChamberConfig::new(1, "a", 1)], criteria).unwrap_err();
        assert!(matches!(err, QueryError::InvalidTimeWindow { .. }));
    }

    #[test]
    fn computes_flux_for_configured_chambers() {
        let file = DataFile::new("run_20240701_1200.csv", file_with_chambers(&[1, 3, 9]));
        let fluxes = calculate_file_fluxes(&file, &params()).unwrap();

        assert_eq!(fluxes.run_id, "20240701_120000");
        assert_eq!(fluxes.unconfigured, vec![9]);
        assert_eq!(fluxes.results.len(), 2);

        let first = &fluxes.results[0];
        assert_eq!(first.chamber, 1);
        assert_eq!(first.treatment, "control");
        assert!((first.co2_slope - 0.05).abs() < 1e-9);
        assert!((first.n2o_slope - 0.01).abs() < 1e-9);
        assert!((first.co2_r2 - 1.0).abs() < 1e-9);
        assert_eq!(first.quality_flag, QualityFlag::Good);
        // 200..=300 s in 10 s steps
        assert_eq!(first.points_used, 11);
        assert_eq!(first.points_total, 41);
        assert_eq!(first.duration_seconds, 400);
        assert_eq!(first.measurement_start_time, "12:00");
        assert!((first.h2o_avg - 15000.0).abs() < 1e-9);

        let biochar = &fluxes.results[1];
        assert_eq!(biochar.chamber, 3);
        assert_eq!(biochar.treatment, "biochar");
        assert_eq!(biochar.measurement_start_time, "12:08");
    }

    #[test]
    fn start_time_is_local_to_the_site() {
        let file = DataFile::new("a.csv", file_with_chambers(&[1]));
        let params = params().with_tz(chrono_tz::Europe::Helsinki);
        let fluxes = calculate_file_fluxes(&file, &params).unwrap();
        assert_eq!(fluxes.results[0].measurement_start_time, "12:00");
        // 12:00 EEST is 09:00 UTC
        assert_eq!(fluxes.results[0].datetime.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn measured_policy_uses_chamber_readings() {
        let mut rows = String::new();
        chamber_rows(&mut rows, 1, 0, 0.05, 0.01);
        let mut csv = format!("{HEADER},pair[kpa],temp[c]");
        for line in rows.lines().filter(|l| !l.is_empty()) {
            csv.push_str(&format!("\n{line},90.0,5.0"));
        }
        let file = DataFile::new("a.csv", csv);

        let standard = calculate_file_fluxes(&file, &params()).unwrap().results;
        let measured = calculate_file_fluxes(
            &file,
            &params().with_conditions(ConditionsPolicy::Measured),
        )
        .unwrap()
        .results;

        let default_flux =
            FluxUnit::KgCHaD.from_slope(standard[0].co2_slope, 15.0, AmbientConditions::default());
        assert!((standard[0].co2_flux - default_flux).abs() < 1e-9);

        let readings = AmbientConditions { temperature_c: 5.0, pressure_kpa: 90.0 };
        let co2 = FluxUnit::KgCHaD.from_slope(measured[0].co2_slope, 15.0, readings);
        let n2o = FluxUnit::GNHaD.from_slope(measured[0].n2o_slope, 15.0, readings);
        assert!((measured[0].co2_flux - co2).abs() < 1e-9, "got {}", measured[0].co2_flux);
        assert!((measured[0].n2o_flux - n2o).abs() < 1e-9);
        // 90 kPa outweighs 5 °C: a larger molar volume than at 25 °C / 101.325 kPa
        assert!(measured[0].co2_flux < standard[0].co2_flux);
    }

    #[test]
    fn flat_co2_fails_quality() {
        let mut csv = HEADER.to_owned();
        chamber_rows(&mut csv, 2, 0, 0.0, 0.01);
        let mut noisy = String::new();
        for (i, line) in csv.lines().enumerate() {
            if i > 0 && i % 2 == 0 {
                noisy.push_str(&line.replace(",400,", ",430,"));
            } else {
                noisy.push_str(line);
            }
            noisy.push('\n');
        }
        let fluxes = calculate_file_fluxes(&DataFile::new("b.csv", noisy), &params()).unwrap();
        assert_eq!(fluxes.results[0].quality_flag, QualityFlag::Failed);
    }

    #[test]
    fn corrupt_file_becomes_event() {
        let (tx, mut rx) = unbounded_channel();
        let results = process_file(&DataFile::new("bad.csv", "nothing,useful\n1,2"), &params(), &tx);
        assert!(results.is_empty());

        let mut failed = false;
        while let Ok(ev) = rx.try_recv() {
            if let ProcessEvent::Read(ReadEvent::FileFail(name, _)) = ev {
                assert_eq!(name, "bad.csv");
                failed = true;
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn corrupt_middle_file_does_not_stop_the_batch() {
        let (tx, mut rx) = unbounded_channel();
        let processor = Processor::new(params(), tx);
        let files = vec![
            DataFile::new("run_20240701_1200.csv", file_with_chambers(&[1, 2])),
            DataFile::new("run_20240701_1600.csv", "\u{0}\u{1}garbage without header"),
            DataFile::new("run_20240702_1200.csv", file_with_chambers(&[2, 3])),
        ];

        let results = processor.run(files).await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.run_id != "20240701_160000"));
        assert!(results.windows(2).all(|w| w[0].datetime <= w[1].datetime));

        let mut fails = Vec::new();
        let mut finished = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                ProcessEvent::Read(ReadEvent::FileFail(name, _)) => fails.push(name),
                ProcessEvent::Done(res) => finished = res.is_ok(),
                _ => {},
            }
        }
        assert_eq!(fails, vec!["run_20240701_1600.csv".to_owned()]);
        assert!(finished);
    }
}
