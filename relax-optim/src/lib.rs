//! Driver loop for the `relax` estimators.
//!
//! One iteration is one atomic estimator invocation followed by two
//! independent adaptive-moment updates: the model logits move along the
//! gradient estimate, the estimator hyperparameters move along the gradient
//! of the estimator's own variance. A bounded iteration count is the only
//! termination control.

pub mod adam;
pub mod driver;

pub use adam::{Adam, AdamConfig};
pub use driver::{optimize, RunConfig, RunResult};
