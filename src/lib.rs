//! Unbiased, low-variance gradient estimation for the parameters of
//! Bernoulli distributions.
//!
//! Discrete sampling has no pathwise gradient, so the expectation of a
//! black-box objective over Bernoulli samples is differentiated with the
//! REBAR and RELAX constructions: a continuous relaxation of the sample, a
//! conditional relaxation given the realized discrete outcome, and a scaled
//! control variate combine score-function and reparameterization terms into
//! an estimate that is unbiased for any temperature and scale. The
//! estimator also reports the gradient of its own empirical variance with
//! respect to those hyperparameters, so a driver can tune them online.

pub mod ad;
pub mod estimator;
pub mod sampler;
pub mod surrogate;

pub use ad::{grad, Scalar};
pub use estimator::{rebar_estimate, relax_estimate, Estimate, Objective};
pub use sampler::NoiseBatch;
pub use surrogate::MlpShape;
