//! Relaxation sampler for Bernoulli variables.
//!
//! Every stochastic quantity is a deterministic function of logits and
//! externally supplied uniform noise: the discrete sample `b` thresholds one
//! uniform against the sigmoid probability, the relaxed sample `z` shifts a
//! logistic variate by the logits, and the conditional relaxation `z̃` maps
//! the *same* uniform through the closed-form inverse CDF of the logistic
//! restricted to the side of the threshold `b` landed on. Keeping sampling
//! in this form is what makes the whole pipeline differentiable.

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::ad::Scalar;

/// Uniform inputs are clamped into `[NOISE_EPS, 1 − NOISE_EPS]` before any
/// logit, so saturated logits cannot push the pipeline to NaN.
pub const NOISE_EPS: f64 = 1e-7;

/// Numerically stable logistic function `1 / (1 + exp(−x))`.
#[inline]
pub fn sigmoid<T: Scalar>(x: T) -> T {
    if x >= T::zero() {
        T::one() / (T::one() + (-x).exp())
    } else {
        let e = x.exp();
        e / (T::one() + e)
    }
}

/// Inverse of [`sigmoid`] on the open unit interval.
#[inline]
pub fn logit<T: Scalar>(p: T) -> T {
    p.ln() - (-p).ln_1p()
}

/// Numerically stable `ln(1 + exp(x))`.
#[inline]
pub fn softplus<T: Scalar>(x: T) -> T {
    x.max(T::zero()) + (-x.abs()).exp().ln_1p()
}

/// Clamp a probability-like value into the open unit interval.
#[inline]
pub fn clamp_unit<T: Scalar>(p: T) -> T {
    let lo = T::from(NOISE_EPS).unwrap();
    let hi = T::one() - lo;
    p.max(lo).min(hi)
}

/// Discrete Bernoulli sample: `b = 1[u < sigmoid(logits)]`, elementwise.
///
/// Pure in `(logits, u)`; returned as floats so the result can be lifted
/// straight into AD-generic code.
pub fn bernoulli_sample(logits: &[f64], u: &[f64]) -> Vec<f64> {
    assert_eq!(
        logits.len(),
        u.len(),
        "shape mismatch: {} logits against {} uniforms",
        logits.len(),
        u.len()
    );
    logits
        .iter()
        .zip(u.iter())
        .map(|(&t, &ui)| if ui < sigmoid(t) { 1.0 } else { 0.0 })
        .collect()
}

/// Logistic variate with location `logit_theta`: `z = logit_theta + logit(v)`.
#[inline]
pub fn logistic_sample<T: Scalar>(logit_theta: T, v: T) -> T {
    logit_theta + logit(clamp_unit(v))
}

/// Remap a uniform so the resulting logistic variate lands on the side of
/// the threshold consistent with the realized sample `b`.
///
/// With `u′ = sigmoid(−logit_theta) = P(b = 0)`, a fresh uniform for the
/// conditional is `u′ + (1 − u′)·v` when `b = 1` (mass above the threshold)
/// and `u′·v` when `b = 0` (mass below it). `b` enters as a 0/1 scalar so
/// the selection stays inside the differentiable pipeline.
#[inline]
pub fn conditional_noise<T: Scalar>(logit_theta: T, b: T, v: T) -> T {
    let u0 = sigmoid(-logit_theta);
    b * (u0 + (T::one() - u0) * v) + (T::one() - b) * u0 * v
}

/// Conditional relaxation: a logistic variate distributed as `z | b`.
#[inline]
pub fn conditional_logistic_sample<T: Scalar>(logit_theta: T, b: T, v: T) -> T {
    logistic_sample(logit_theta, conditional_noise(logit_theta, b, v))
}

/// `log p(b | sigmoid(logit_theta))` for a single coordinate, computed as
/// `−softplus(−logit_theta·(2b − 1))` to stay finite at saturation.
#[inline]
pub fn bernoulli_logprob<T: Scalar>(logit_theta: T, b: T) -> T {
    let two = T::from(2.0).unwrap();
    -softplus(-(logit_theta * (two * b - T::one())))
}

/// Two independent uniform matrices of shape `(num_samples × dim)`.
///
/// Drawn from a stream keyed by a seed (the driver uses the iteration
/// index), so every estimator invocation is reproducible. Consumed within
/// one invocation, never stored across iterations.
#[derive(Clone, Debug)]
pub struct NoiseBatch {
    u: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
    dim: usize,
}

impl NoiseBatch {
    /// Draw a fresh batch from `XorShiftRng::seed_from_u64(seed)`.
    pub fn draw(num_samples: usize, dim: usize, seed: u64) -> Self {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let mut matrix = |n: usize, d: usize| -> Vec<Vec<f64>> {
            (0..n)
                .map(|_| (0..d).map(|_| rng.gen::<f64>()).collect())
                .collect()
        };
        let u = matrix(num_samples, dim);
        let v = matrix(num_samples, dim);
        NoiseBatch { u, v, dim }
    }

    pub fn num_samples(&self) -> usize {
        self.u.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The `i`-th pair of noise rows `(u, v)`.
    pub fn row(&self, i: usize) -> (&[f64], &[f64]) {
        (&self.u[i], &self.v[i])
    }
}
