pub mod linreg;
pub mod stats;

pub use linreg::{fit_window, LinReg, LinearRegressionResult, RegressionPoint};
pub use stats::{mean, r2_from_predictions, standard_error, MeanSe};
