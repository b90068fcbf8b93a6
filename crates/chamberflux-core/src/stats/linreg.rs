use crate::stats::stats::r2_from_predictions;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinReg {
    pub intercept: f64,
    pub slope: f64,
}

impl LinReg {
    pub fn calculate(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Ordinary least squares. Zero variance in `x` gives NaN coefficients, callers decide what
    /// that means.
    pub fn train(x: &[f64], y: &[f64]) -> Self {
        debug_assert_eq!(x.len(), y.len(), "Input vectors x and y must have the same length");

        let n = x.len().min(y.len()) as f64;
        let avg_x: f64 = x.iter().sum::<f64>() / n;
        let avg_y: f64 = y.iter().sum::<f64>() / n;

        let ss_xx: f64 = x.iter().map(|xi| (xi - avg_x).powi(2)).sum();
        let ss_xy: f64 = x.iter().zip(y).map(|(xi, yi)| (xi - avg_x) * (yi - avg_y)).sum();

        let slope = ss_xy / ss_xx;
        let intercept = avg_y - slope * avg_x;

        Self { intercept, slope }
    }
}

/// One concentration sample as seen by the regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionPoint {
    pub x: f64,
    pub y: f64,
    pub included: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearRegressionResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub points_used: usize,
    pub data_points: Vec<RegressionPoint>,
}

impl LinearRegressionResult {
    fn degenerate(data_points: Vec<RegressionPoint>) -> Self {
        Self { slope: 0.0, intercept: 0.0, r_squared: 0.0, points_used: 0, data_points }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

/// Fit `y` against `x` using only points with `head <= x <= tail`.
///
/// Fewer than two points inside the window is not an error: the result has zero slope,
/// intercept and r², and `points_used == 0`. Every input point is returned with its
/// `included` flag.
pub fn fit_window(points: &[(f64, f64)], head: f64, tail: f64) -> LinearRegressionResult {
    let data_points: Vec<RegressionPoint> = points
        .iter()
        .map(|&(x, y)| RegressionPoint { x, y, included: x >= head && x <= tail })
        .collect();

    let (x, y): (Vec<f64>, Vec<f64>) =
        data_points.iter().filter(|p| p.included).map(|p| (p.x, p.y)).unzip();

    if x.len() < 2 {
        return LinearRegressionResult::degenerate(data_points);
    }

    let model = LinReg::train(&x, &y);
    let y_hat: Vec<f64> = x.iter().map(|&xi| model.calculate(xi)).collect();
    // constant y is a perfect fit
    let r2 = r2_from_predictions(&y, &y_hat).unwrap_or(1.0);

    LinearRegressionResult {
        slope: finite_or_zero(model.slope),
        intercept: finite_or_zero(model.intercept),
        r_squared: finite_or_zero(r2).clamp(0.0, 1.0),
        points_used: x.len(),
        data_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn recovers_exact_line() {
        let res = fit_window(&[(0., 400.), (1., 402.), (2., 404.)], 0., 2.);
        assert!((res.slope - 2.0).abs() < EPS);
        assert!((res.intercept - 400.0).abs() < EPS);
        assert!((res.r_squared - 1.0).abs() < EPS);
        assert_eq!(res.points_used, 3);
        assert!(res.data_points.iter().all(|p| p.included));
    }

    #[test]
    fn window_outside_data_is_degenerate() {
        let points: Vec<(f64, f64)> = (0..=300).map(|t| (t as f64, 400.0 + t as f64)).collect();
        let res = fit_window(&points, 1000., 2000.);
        assert_eq!(res.points_used, 0);
        assert_eq!(res.slope, 0.0);
        assert_eq!(res.intercept, 0.0);
        assert_eq!(res.r_squared, 0.0);
        assert_eq!(res.data_points.len(), 301);
        assert!(res.data_points.iter().all(|p| !p.included));
    }

    #[test]
    fn single_point_in_window_is_degenerate() {
        let res = fit_window(&[(0., 1.), (5., 2.), (10., 3.)], 4., 6.);
        assert_eq!(res.points_used, 0);
        assert_eq!(res.slope, 0.0);
    }

    #[test]
    fn window_is_inclusive() {
        let res = fit_window(&[(0., 0.), (1., 10.), (2., 20.), (3., 99.)], 1., 2.);
        assert_eq!(res.points_used, 2);
        assert!((res.slope - 10.0).abs() < EPS);
        let flags: Vec<bool> = res.data_points.iter().map(|p| p.included).collect();
        assert_eq!(flags, vec![false, true, true, false]);
    }

    #[test]
    fn constant_series_is_perfect_fit() {
        let res = fit_window(&[(0., 5.), (1., 5.), (2., 5.)], 0., 2.);
        assert_eq!(res.slope, 0.0);
        assert!((res.intercept - 5.0).abs() < EPS);
        assert_eq!(res.r_squared, 1.0);
    }

    #[test]
    fn identical_x_coerces_nan_to_zero() {
        let res = fit_window(&[(3., 1.), (3., 2.), (3., 4.)], 0., 10.);
        assert_eq!(res.slope, 0.0);
        assert_eq!(res.intercept, 0.0);
        assert_eq!(res.r_squared, 0.0);
        assert_eq!(res.points_used, 3);
    }

    #[test]
    fn r_squared_stays_in_unit_range() {
        let res = fit_window(&[(0., 1.), (1., 3.), (2., 2.), (3., 5.), (4., 4.)], 0., 4.);
        assert!(res.r_squared > 0.0 && res.r_squared < 1.0);
        assert!((res.slope - 0.8).abs() < EPS);
    }

    #[test]
    fn linreg_train_matches_closed_form() {
        let model = LinReg::train(&[1., 2., 3., 4.], &[3., 5., 7., 9.]);
        assert!((model.slope - 2.0).abs() < EPS);
        assert!((model.intercept - 1.0).abs() < EPS);
        assert!((model.calculate(10.) - 21.0).abs() < EPS);
    }
}
