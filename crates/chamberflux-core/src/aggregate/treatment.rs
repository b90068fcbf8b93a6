use crate::aggregate::daily::DailyFluxPerChamber;
use crate::flux::FluxResult;
use crate::stats::MeanSe;
use crate::types::FastMap;

use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTreatmentFlux {
    pub date: NaiveDate,
    pub treatment: String,
    pub co2_flux_mean: f64,
    pub co2_flux_se: f64,
    pub n2o_flux_mean: f64,
    pub n2o_flux_se: f64,
    pub chamber_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeTreatmentFlux {
    pub date: NaiveDate,
    pub treatment: String,
    pub co2_flux_cumulative_mean: f64,
    pub co2_flux_cumulative_se: f64,
    pub n2o_flux_cumulative_mean: f64,
    pub n2o_flux_cumulative_se: f64,
    pub chamber_count: usize,
}

/// Mean ± SE across the replicate chambers of each treatment on each date.
pub fn daily_treatment_flux(daily: &[DailyFluxPerChamber]) -> Vec<DailyTreatmentFlux> {
    let chunks = daily
        .iter()
        .sorted_by(|a, b| a.date.cmp(&b.date).then_with(|| a.treatment.cmp(&b.treatment)))
        .chunk_by(|d| (d.date, d.treatment.as_str()));

    let mut out = Vec::new();
    for ((date, treatment), group) in &chunks {
        let (co2, n2o): (Vec<f64>, Vec<f64>) = group.map(|d| (d.co2_flux, d.n2o_flux)).unzip();
        let co2 = MeanSe::from_values(&co2);
        let n2o = MeanSe::from_values(&n2o);
        out.push(DailyTreatmentFlux {
            date,
            treatment: treatment.to_owned(),
            co2_flux_mean: co2.mean,
            co2_flux_se: co2.se,
            n2o_flux_mean: n2o.mean,
            n2o_flux_se: n2o.se,
            chamber_count: co2.n,
        });
    }
    out
}

/// Running per-chamber totals of daily flux, summarized per treatment on each date.
///
/// Totals are accumulated chamber by chamber first and only then averaged. On a given date
/// a treatment's statistic covers the chambers that have a daily value on that date.
pub fn cumulative_treatment_flux(daily: &[DailyFluxPerChamber]) -> Vec<CumulativeTreatmentFlux> {
    let mut running: FastMap<u32, (f64, f64)> = FastMap::default();
    let mut out = Vec::new();

    let by_date = daily
        .iter()
        .sorted_by(|a, b| a.date.cmp(&b.date).then(a.chamber.cmp(&b.chamber)))
        .chunk_by(|d| d.date);

    for (date, day) in &by_date {
        let mut per_treatment: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
        for d in day {
            let total = running.entry(d.chamber).or_insert((0.0, 0.0));
            total.0 += d.co2_flux;
            total.1 += d.n2o_flux;
            per_treatment.entry(d.treatment.as_str()).or_default().push(*total);
        }

        for (treatment, totals) in per_treatment {
            let (co2, n2o): (Vec<f64>, Vec<f64>) = totals.into_iter().unzip();
            let co2 = MeanSe::from_values(&co2);
            let n2o = MeanSe::from_values(&n2o);
            out.push(CumulativeTreatmentFlux {
                date,
                treatment: treatment.to_owned(),
                co2_flux_cumulative_mean: co2.mean,
                co2_flux_cumulative_se: co2.se,
                n2o_flux_cumulative_mean: n2o.mean,
                n2o_flux_cumulative_se: n2o.se,
                chamber_count: co2.n,
            });
        }
    }
    out
}

/// Treatment statistics of one measurement run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTreatmentFlux {
    /// time of the run's first chamber of this treatment
    pub datetime: DateTime<Utc>,
    pub run_id: String,
    pub treatment: String,
    pub co2_flux_mean: f64,
    pub co2_flux_se: f64,
    pub n2o_flux_mean: f64,
    pub n2o_flux_se: f64,
    pub h2o_mean: f64,
    pub h2o_se: f64,
    pub replicate_count: usize,
    pub chamber_list: Vec<u32>,
}

/// Group results by treatment and run. Ordered by time.
pub fn run_treatment_flux(results: &[FluxResult]) -> Vec<RunTreatmentFlux> {
    let groups = results
        .iter()
        .sorted_by(|a, b| {
            (a.treatment.as_str(), a.run_id.as_str())
                .cmp(&(b.treatment.as_str(), b.run_id.as_str()))
                .then(a.datetime.cmp(&b.datetime))
        })
        .chunk_by(|r| (r.treatment.as_str(), r.run_id.as_str()));

    let mut out: Vec<RunTreatmentFlux> = Vec::new();
    for ((treatment, run_id), group) in &groups {
        let group: Vec<&FluxResult> = group.collect();
        let co2: Vec<f64> = group.iter().map(|r| r.co2_flux).collect();
        let n2o: Vec<f64> = group.iter().map(|r| r.n2o_flux).collect();
        let h2o: Vec<f64> = group.iter().map(|r| r.h2o_avg).collect();
        let (co2, n2o, h2o) =
            (MeanSe::from_values(&co2), MeanSe::from_values(&n2o), MeanSe::from_values(&h2o));
        let chambers: BTreeSet<u32> = group.iter().map(|r| r.chamber).collect();

        out.push(RunTreatmentFlux {
            datetime: group[0].datetime,
            run_id: run_id.to_owned(),
            treatment: treatment.to_owned(),
            co2_flux_mean: co2.mean,
            co2_flux_se: co2.se,
            n2o_flux_mean: n2o.mean,
            n2o_flux_se: n2o.se,
            h2o_mean: h2o.mean,
            h2o_se: h2o.se,
            replicate_count: group.len(),
            chamber_list: chambers.into_iter().collect(),
        });
    }

    out.sort_by(|a, b| a.datetime.cmp(&b.datetime).then_with(|| a.treatment.cmp(&b.treatment)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::flux_for;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn daily(d: u32, chamber: u32, treatment: &str, co2: f64, n2o: f64) -> DailyFluxPerChamber {
        DailyFluxPerChamber {
            date: day(d),
            chamber,
            treatment: treatment.to_owned(),
            replicate: chamber,
            co2_flux: co2,
            n2o_flux: n2o,
            h2o_avg: 0.0,
            measurement_count: 6,
        }
    }

    #[test]
    fn daily_mean_and_se_across_replicates() {
        let rows = vec![
            daily(1, 1, "control", 2.0, 1.0),
            daily(1, 2, "control", 4.0, 3.0),
            daily(1, 3, "biochar", 7.0, 0.5),
        ];
        let out = daily_treatment_flux(&rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].treatment, "biochar");
        assert_eq!(out[0].chamber_count, 1);
        assert_eq!(out[0].co2_flux_se, 0.0);

        let control = &out[1];
        assert_eq!(control.co2_flux_mean, 3.0);
        // sample sd of [2, 4] is sqrt(2), SE = sqrt(2) / sqrt(2)
        assert!((control.co2_flux_se - 1.0).abs() < 1e-12);
        assert_eq!(control.n2o_flux_mean, 2.0);
        assert_eq!(control.chamber_count, 2);
    }

    #[test]
    fn cumulative_sums_per_chamber_first() {
        let rows = vec![
            daily(1, 1, "control", 2.0, 0.0),
            daily(1, 2, "control", 4.0, 0.0),
            daily(2, 1, "control", 3.0, 0.0),
            daily(2, 2, "control", 1.0, 0.0),
        ];
        let out = cumulative_treatment_flux(&rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].co2_flux_cumulative_mean, 3.0);
        assert_eq!(out[1].date, day(2));
        assert_eq!(out[1].co2_flux_cumulative_mean, 5.0);
        assert_eq!(out[1].co2_flux_cumulative_se, 0.0);
        assert_eq!(out[1].chamber_count, 2);
    }

    #[test]
    fn cumulative_differs_from_summed_means_when_replicates_vary() {
        let rows = vec![
            daily(1, 1, "control", 10.0, 0.0),
            daily(2, 1, "control", 10.0, 0.0),
            daily(2, 2, "control", 2.0, 0.0),
        ];
        let out = cumulative_treatment_flux(&rows);
        // day 2 totals are 20 and 2, summing the daily means would give 16
        assert_eq!(out[1].co2_flux_cumulative_mean, 11.0);
    }

    #[test]
    fn per_run_statistics() {
        let t = |h: u32, m: u32| Utc.with_ymd_and_hms(2024, 7, 1, h, m, 0).unwrap();
        let results = vec![
            flux_for(3, "control", "r2", t(14, 0), 5.0),
            flux_for(1, "control", "r1", t(10, 0), 2.0),
            flux_for(2, "control", "r1", t(10, 8), 4.0),
            flux_for(4, "biochar", "r1", t(10, 16), 1.0),
        ];
        let runs = run_treatment_flux(&results);
        assert_eq!(runs.len(), 3);
        assert_eq!((runs[0].run_id.as_str(), runs[0].treatment.as_str()), ("r1", "control"));
        assert_eq!(runs[0].datetime, t(10, 0));
        assert_eq!(runs[0].chamber_list, vec![1, 2]);
        assert_eq!(runs[0].replicate_count, 2);
        assert_eq!(runs[0].co2_flux_mean, 3.0);
        assert_eq!(runs[1].treatment, "biochar");
        assert_eq!(runs[2].run_id, "r2");
    }
}
