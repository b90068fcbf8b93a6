use crate::flux::FluxResult;
use crate::query::DateRange;
use crate::utils::{day_start, local_date};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;

/// A chamber's flux at one grid instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpolatedFluxPoint {
    pub datetime: DateTime<Utc>,
    /// local calendar date of `datetime`
    pub date: NaiveDate,
    pub chamber: u32,
    pub treatment: String,
    pub replicate: u32,
    pub co2_flux: f64,
    pub n2o_flux: f64,
    pub h2o_avg: f64,
    /// false only when a measurement sits exactly on the grid instant
    pub interpolated: bool,
}

/// `measurements_per_day` evenly spaced instants per local day, first one at local midnight.
pub fn time_grid(range: &DateRange, measurements_per_day: u32, tz: Tz) -> Vec<DateTime<Utc>> {
    if measurements_per_day == 0 {
        return Vec::new();
    }
    let step = Duration::milliseconds(86_400_000 / i64::from(measurements_per_day));
    range
        .days()
        .filter_map(|day| day_start(day, tz))
        .flat_map(|start| (0..measurements_per_day).map(move |i| start + step * i as i32))
        .collect()
}

struct Values {
    co2: f64,
    n2o: f64,
    h2o: f64,
}

impl Values {
    fn of(r: &FluxResult) -> Self {
        Self { co2: r.co2_flux, n2o: r.n2o_flux, h2o: r.h2o_avg }
    }

    fn lerp(a: &FluxResult, b: &FluxResult, frac: f64) -> Self {
        let lerp = |x: f64, y: f64| x + (y - x) * frac;
        Self {
            co2: lerp(a.co2_flux, b.co2_flux),
            n2o: lerp(a.n2o_flux, b.n2o_flux),
            h2o: lerp(a.h2o_avg, b.h2o_avg),
        }
    }
}

/// Values at `t` from one chamber's results, sorted by time. Outside the measured span the
/// nearest edge value is held.
fn value_at(sorted: &[&FluxResult], t: DateTime<Utc>) -> (Values, bool) {
    // number of results at or before t
    let idx = sorted.partition_point(|r| r.datetime <= t);

    if idx == 0 {
        return (Values::of(sorted[0]), true);
    }
    let left = sorted[idx - 1];
    if left.datetime == t {
        return (Values::of(left), false);
    }
    if idx == sorted.len() {
        return (Values::of(left), true);
    }

    let right = sorted[idx];
    let span = secs_between(left.datetime, right.datetime);
    if span <= 0.0 {
        return (Values::of(left), true);
    }
    let frac = (secs_between(left.datetime, t) / span).clamp(0.0, 1.0);
    (Values::lerp(left, right, frac), true)
}

/// Seconds from `a` to `b` at nanosecond resolution.
fn secs_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let d = b - a;
    d.num_seconds() as f64 + f64::from(d.subsec_nanos()) * 1e-9
}

/// Interpolate one chamber onto `grid`. `results` must all belong to the same chamber.
pub fn interpolate_chamber(
    results: &[&FluxResult],
    grid: &[DateTime<Utc>],
    tz: Tz,
) -> Vec<InterpolatedFluxPoint> {
    let Some(first) = results.first() else {
        return Vec::new();
    };
    let mut sorted = results.to_vec();
    sorted.sort_by_key(|r| r.datetime);

    grid.iter()
        .map(|&t| {
            let (v, interpolated) = value_at(&sorted, t);
            InterpolatedFluxPoint {
                datetime: t,
                date: local_date(t, tz),
                chamber: first.chamber,
                treatment: first.treatment.clone(),
                replicate: first.replicate,
                co2_flux: v.co2,
                n2o_flux: v.n2o,
                h2o_avg: v.h2o,
                interpolated,
            }
        })
        .collect()
}

/// Put every chamber found in `results` on the same grid. Output is ordered by chamber, then
/// time.
pub fn interpolate_fluxes(
    results: &[FluxResult],
    grid: &[DateTime<Utc>],
    tz: Tz,
) -> Vec<InterpolatedFluxPoint> {
    let mut by_chamber: BTreeMap<u32, Vec<&FluxResult>> = BTreeMap::new();
    for r in results {
        by_chamber.entry(r.chamber).or_default().push(r);
    }

    by_chamber.values().flat_map(|chamber| interpolate_chamber(chamber, grid, tz)).collect()
}
