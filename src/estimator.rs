//! REBAR and RELAX gradient estimators with variance-driven tuning.
//!
//! Both estimators combine three ingredients into one unbiased, low-variance
//! gradient estimate per logit:
//!
//! ```text
//! g = [f(b) − C(σ(z̃/T))]·∇ log p(b) + ∇C(σ(z/T)) − ∇C(σ(z̃/T))
//! ```
//!
//! where `b` is the discrete sample, `z` the relaxed sample, `z̃` the
//! conditional relaxation given `b`, and `C = η·f̃` the scaled control
//! variate — the objective itself for REBAR, a trainable network for RELAX.
//! The estimate is unbiased for every temperature `T`, scale `η`, and
//! surrogate weight setting; those hyperparameters only move its variance,
//! and they are trained by descending an empirical variance proxy whose
//! hyperparameter gradient is obtained by differentiating *through* the
//! per-sample gradient computation (forward-over-reverse).

use crate::ad::tape::{Tape, TapeScope, UNTRACKED};
use crate::ad::{Scalar, Tangent, Var};
use crate::sampler::{
    bernoulli_logprob, bernoulli_sample, conditional_logistic_sample, logistic_sample, sigmoid,
    NoiseBatch,
};
use crate::surrogate::MlpShape;

/// Index of `log(temperature)` in the flattened hyperparameter vector.
pub const LOG_TEMPERATURE: usize = 0;
/// Index of `log(eta)` in the flattened hyperparameter vector.
pub const LOG_ETA: usize = 1;
/// Offset of the surrogate weights in the flattened hyperparameter vector.
pub const SURROGATE_OFFSET: usize = 2;

/// Black-box objective `f(params, sample)`.
///
/// Must accept both discrete `{0,1}` samples and relaxed samples in
/// `[0,1]^D`, and be differentiable in the sample argument; the generic
/// scalar makes that structural.
pub trait Objective {
    fn eval<T: Scalar>(&self, params: &[T], sample: &[T]) -> T;
}

/// One estimator invocation: a pure function of the current parameters,
/// hyperparameters, and noise batch.
#[derive(Clone, Debug)]
pub struct Estimate {
    /// Batch-mean objective value at the discrete samples.
    pub objective: f64,
    /// Batch-mean gradient estimate with respect to the logits.
    pub grad_logits: Vec<f64>,
    /// Gradient of the variance proxy with respect to the flattened
    /// hyperparameters `[log_temperature, log_eta, surrogate weights...]`.
    pub grad_hyper: Vec<f64>,
    /// Per-coordinate mean of squared per-sample gradient estimates — the
    /// quantity the hyperparameter gradient descends.
    pub variance: Vec<f64>,
}

/// The `f̃` slot in the estimator: maps a relaxed sample to a scalar.
trait ControlVariate {
    /// Number of trainable weights appended to the hyperparameter vector.
    fn num_weights(&self) -> usize;

    fn eval<T: Scalar>(&self, weights: &[T], model_params: &[T], relaxed: &[T]) -> T;
}

/// REBAR: the objective itself, evaluated at the relaxed sample.
struct SelfSurrogate<'a, O: Objective>(&'a O);

impl<O: Objective> ControlVariate for SelfSurrogate<'_, O> {
    fn num_weights(&self) -> usize {
        0
    }

    fn eval<T: Scalar>(&self, _weights: &[T], model_params: &[T], relaxed: &[T]) -> T {
        self.0.eval(model_params, relaxed)
    }
}

/// RELAX: a trainable feed-forward surrogate.
struct NetworkSurrogate<'a> {
    shape: &'a MlpShape,
}

impl ControlVariate for NetworkSurrogate<'_> {
    fn num_weights(&self) -> usize {
        self.shape.num_params()
    }

    fn eval<T: Scalar>(&self, weights: &[T], _model_params: &[T], relaxed: &[T]) -> T {
        self.shape.predict(weights, relaxed)
    }
}

/// REBAR estimate over one noise batch.
///
/// `hyper = [log_temperature, log_eta]`.
///
/// # Panics
///
/// Panics on any shape mismatch between `logits`, `hyper`, and `noise`.
pub fn rebar_estimate<O: Objective>(
    logits: &[f64],
    hyper: &[f64],
    noise: &NoiseBatch,
    objective: &O,
) -> Estimate {
    estimate_with(logits, hyper, noise, objective, &SelfSurrogate(objective))
}

/// RELAX estimate over one noise batch.
///
/// `hyper = [log_temperature, log_eta, surrogate weights...]` with the
/// weights laid out per `shape`.
///
/// # Panics
///
/// Panics on any shape mismatch between `logits`, `hyper`, `shape`, and
/// `noise`.
pub fn relax_estimate<O: Objective>(
    logits: &[f64],
    hyper: &[f64],
    shape: &MlpShape,
    noise: &NoiseBatch,
    objective: &O,
) -> Estimate {
    assert_eq!(
        shape.input_dim(),
        logits.len(),
        "shape mismatch: surrogate network expects {}-dimensional input, logits are {}-dimensional",
        shape.input_dim(),
        logits.len()
    );
    estimate_with(logits, hyper, noise, objective, &NetworkSurrogate { shape })
}

/// Per-sample surrogate loss whose logits-gradient is the estimator.
///
/// `theta` carries the differentiation path; `theta_w` is a second set of
/// parameter copies routed into the score weight, which is a coefficient and
/// must not contribute a logits-gradient. The caller decides how each set is
/// tracked, which is what lets the same expression serve both the
/// first-order sweep and the forward-over-reverse variance sweep.
fn sample_loss<T, C>(
    theta: &[T],
    theta_w: &[T],
    log_temperature: T,
    log_eta: T,
    weights: &[T],
    b: &[T],
    v: &[T],
    f_b: T,
    cv: &C,
) -> T
where
    T: Scalar,
    C: ControlVariate,
{
    let temperature = log_temperature.exp();
    let eta = log_eta.exp();

    let relaxed: Vec<T> = theta
        .iter()
        .zip(v)
        .map(|(&t, &vi)| sigmoid(logistic_sample(t, vi) / temperature))
        .collect();
    let relaxed_cond: Vec<T> = theta
        .iter()
        .zip(b.iter().zip(v))
        .map(|(&t, (&bi, &vi))| sigmoid(conditional_logistic_sample(t, bi, vi) / temperature))
        .collect();
    let relaxed_cond_w: Vec<T> = theta_w
        .iter()
        .zip(b.iter().zip(v))
        .map(|(&t, (&bi, &vi))| sigmoid(conditional_logistic_sample(t, bi, vi) / temperature))
        .collect();

    let weight = f_b - eta * cv.eval(weights, theta_w, &relaxed_cond_w);

    let logprob = theta
        .iter()
        .zip(b)
        .map(|(&t, &bi)| bernoulli_logprob(t, bi))
        .fold(T::zero(), |acc, lp| acc + lp);

    weight * logprob + eta * cv.eval(weights, theta, &relaxed)
        - eta * cv.eval(weights, theta, &relaxed_cond)
}

/// First round: reverse sweep of the surrogate loss with respect to the
/// logits, hyperparameters held constant.
fn sample_grad<C>(
    logits: &[f64],
    hyper: &[f64],
    b: &[f64],
    v: &[f64],
    f_b: f64,
    cv: &C,
) -> Vec<f64>
where
    C: ControlVariate,
{
    crate::ad::grad(
        |theta: &[Var<f64>]| {
            let lift = |xs: &[f64]| -> Vec<Var<f64>> {
                xs.iter().map(|&x| Var::constant(x)).collect()
            };
            sample_loss(
                theta,
                &lift(logits),
                Var::constant(hyper[LOG_TEMPERATURE]),
                Var::constant(hyper[LOG_ETA]),
                &lift(&hyper[SURROGATE_OFFSET..]),
                &lift(b),
                &lift(v),
                Var::constant(f_b),
                cv,
            )
        },
        logits,
    )
}

/// Second round: gradient of `⟨g, ∇_logits S⟩` with respect to the
/// hyperparameters, with the first-round gradient `g` detached and seeded as
/// the logits tangent direction. Summed over samples and scaled, this is the
/// gradient of the mean-of-squared-gradients variance proxy.
fn sample_hyper_grad<C>(
    logits: &[f64],
    hyper: &[f64],
    b: &[f64],
    v: &[f64],
    f_b: f64,
    g: &[f64],
    cv: &C,
) -> Vec<f64>
where
    C: ControlVariate,
{
    let num_hyper = hyper.len();
    let mut tape: Tape<f64> = Tape::with_capacity(num_hyper + logits.len() * 64);

    // Hyperparameters occupy nodes 0..num_hyper; nothing else is tracked.
    let hyper_vars: Vec<Var<f64>> = hyper
        .iter()
        .map(|&h| Var::from_node(h, tape.variable()))
        .collect();
    let _scope = TapeScope::new(&mut tape);

    let on_tape = |h: Var<f64>| Tangent::new(h, Var::constant(0.0));
    let constant = |x: f64| Tangent::constant(Var::constant(x));

    // The logits tangent carries the detached first-round gradient; the
    // score-weight copies carry no tangent.
    let theta: Vec<Tangent<Var<f64>>> = logits
        .iter()
        .zip(g)
        .map(|(&t, &gd)| Tangent::new(Var::constant(t), Var::constant(gd)))
        .collect();
    let theta_w: Vec<Tangent<Var<f64>>> = logits.iter().map(|&t| constant(t)).collect();
    let b_lifted: Vec<Tangent<Var<f64>>> = b.iter().map(|&x| constant(x)).collect();
    let v_lifted: Vec<Tangent<Var<f64>>> = v.iter().map(|&x| constant(x)).collect();
    let weights: Vec<Tangent<Var<f64>>> =
        hyper_vars[SURROGATE_OFFSET..].iter().map(|&h| on_tape(h)).collect();

    let s = sample_loss(
        &theta,
        &theta_w,
        on_tape(hyper_vars[LOG_TEMPERATURE]),
        on_tape(hyper_vars[LOG_ETA]),
        &weights,
        &b_lifted,
        &v_lifted,
        constant(f_b),
        cv,
    );

    // s.dot is ⟨g, ∇_logits S⟩ as a tape function of the hyperparameters.
    if s.dot.node() == UNTRACKED {
        return vec![0.0; num_hyper];
    }
    let adj = tape.adjoints(s.dot.node());
    (0..num_hyper)
        .map(|j| adj[hyper_vars[j].node() as usize])
        .collect()
}

fn estimate_with<O, C>(
    logits: &[f64],
    hyper: &[f64],
    noise: &NoiseBatch,
    objective: &O,
    cv: &C,
) -> Estimate
where
    O: Objective,
    C: ControlVariate,
{
    let dim = logits.len();
    let num_samples = noise.num_samples();
    assert_eq!(
        noise.dim(),
        dim,
        "shape mismatch: noise batch is {}-dimensional, logits are {}-dimensional",
        noise.dim(),
        dim
    );
    assert_eq!(
        hyper.len(),
        SURROGATE_OFFSET + cv.num_weights(),
        "shape mismatch: hyperparameter vector has length {}, estimator expects {}",
        hyper.len(),
        SURROGATE_OFFSET + cv.num_weights()
    );
    assert!(num_samples > 0, "shape mismatch: empty noise batch");

    let mut sum_obj = 0.0;
    let mut sum_g = vec![0.0; dim];
    let mut sum_g_sq = vec![0.0; dim];
    let mut sum_h = vec![0.0; hyper.len()];

    for i in 0..num_samples {
        let (u, v) = noise.row(i);
        let b = bernoulli_sample(logits, u);
        let f_b = objective.eval(logits, &b);
        sum_obj += f_b;

        let g = sample_grad(logits, hyper, &b, v, f_b, cv);
        let h = sample_hyper_grad(logits, hyper, &b, v, f_b, &g, cv);

        for d in 0..dim {
            sum_g[d] += g[d];
            sum_g_sq[d] += g[d] * g[d];
        }
        for (acc, hk) in sum_h.iter_mut().zip(&h) {
            *acc += hk;
        }
    }

    let n = num_samples as f64;
    // The tuner loss is the coordinate-mean of the per-coordinate second
    // moment; each accumulated sweep is the gradient of one sample's squared
    // contribution up to the factor 2/(N·D).
    let hyper_scale = 2.0 / (n * dim as f64);

    Estimate {
        objective: sum_obj / n,
        grad_logits: sum_g.iter().map(|s| s / n).collect(),
        grad_hyper: sum_h.iter().map(|s| s * hyper_scale).collect(),
        variance: sum_g_sq.iter().map(|s| s / n).collect(),
    }
}
