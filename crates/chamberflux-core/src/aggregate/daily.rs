use crate::aggregate::interpolate::InterpolatedFluxPoint;
use crate::stats::mean;

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyFluxPerChamber {
    pub date: NaiveDate,
    pub chamber: u32,
    pub treatment: String,
    pub replicate: u32,
    pub co2_flux: f64,
    pub n2o_flux: f64,
    pub h2o_avg: f64,
    pub measurement_count: usize,
}

/// Average the grid points of each chamber over each local day. Ordered by date, then chamber.
pub fn daily_flux_per_chamber(points: &[InterpolatedFluxPoint]) -> Vec<DailyFluxPerChamber> {
    let mut groups: BTreeMap<(NaiveDate, u32), Vec<&InterpolatedFluxPoint>> = BTreeMap::new();
    for p in points {
        groups.entry((p.date, p.chamber)).or_default().push(p);
    }

    groups
        .into_iter()
        .map(|((date, chamber), group)| {
            let co2: Vec<f64> = group.iter().map(|p| p.co2_flux).collect();
            let n2o: Vec<f64> = group.iter().map(|p| p.n2o_flux).collect();
            let h2o: Vec<f64> = group.iter().map(|p| p.h2o_avg).collect();
            DailyFluxPerChamber {
                date,
                chamber,
                treatment: group[0].treatment.clone(),
                replicate: group[0].replicate,
                co2_flux: mean(&co2),
                n2o_flux: mean(&n2o),
                h2o_avg: mean(&h2o),
                measurement_count: group.len(),
            }
        })
        .collect()
}
