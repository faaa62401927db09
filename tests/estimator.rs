//! Statistical properties of the REBAR and RELAX estimators: unbiasedness
//! for any hyperparameter setting, bias/variance decoupling, degeneracy to
//! the score-function estimator, and descent of the variance proxy.

use approx::assert_abs_diff_eq;
use relax::sampler::{bernoulli_sample, sigmoid};
use relax::{rebar_estimate, relax_estimate, MlpShape, NoiseBatch, Objective, Scalar};

/// Squared distance to fixed targets; ignores the parameter argument like
/// the demo scenarios do.
struct Quadratic {
    targets: Vec<f64>,
}

impl Objective for Quadratic {
    fn eval<T: Scalar>(&self, _params: &[T], sample: &[T]) -> T {
        self.targets
            .iter()
            .zip(sample)
            .fold(T::zero(), |acc, (&t, &s)| {
                let d = s - T::from(t).unwrap();
                acc + d * d
            })
    }
}

/// Exact gradient of E[f(b)] for the quadratic objective:
/// d/dθ_d = σ'(θ_d)·(1 − 2·t_d).
fn exact_gradient(logits: &[f64], targets: &[f64]) -> Vec<f64> {
    logits
        .iter()
        .zip(targets)
        .map(|(&theta, &t)| {
            let s = sigmoid(theta);
            s * (1.0 - s) * (1.0 - 2.0 * t)
        })
        .collect()
}

/// Per-coordinate mean and standard error over a set of gradient vectors.
fn mean_and_stderr(batches: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let n = batches.len() as f64;
    let dim = batches[0].len();
    let mut mean = vec![0.0; dim];
    for g in batches {
        for d in 0..dim {
            mean[d] += g[d];
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }
    let mut var = vec![0.0; dim];
    for g in batches {
        for d in 0..dim {
            let delta = g[d] - mean[d];
            var[d] += delta * delta;
        }
    }
    let stderr = var.iter().map(|v| (v / (n - 1.0) / n).sqrt()).collect();
    (mean, stderr)
}

#[test]
fn rebar_is_unbiased() {
    let logits = [0.3, -0.4];
    let objective = Quadratic {
        targets: vec![0.1, 0.7],
    };
    let hyper = [-0.5, 0.0];
    let exact = exact_gradient(&logits, &objective.targets);

    let num_batches: u64 = 4000;
    let grads: Vec<Vec<f64>> = (0..num_batches)
        .map(|t| {
            let noise = NoiseBatch::draw(2, 2, t);
            rebar_estimate(&logits, &hyper, &noise, &objective).grad_logits
        })
        .collect();

    let (mean, stderr) = mean_and_stderr(&grads);
    for d in 0..2 {
        assert!(
            (mean[d] - exact[d]).abs() < 5.0 * stderr[d] + 1e-3,
            "coordinate {d}: Monte-Carlo mean {} vs exact {} (stderr {})",
            mean[d],
            exact[d],
            stderr[d]
        );
    }
}

#[test]
fn relax_is_unbiased_for_any_surrogate() {
    // The surrogate weights are arbitrary: they may only move variance.
    let logits = [0.3, -0.4];
    let objective = Quadratic {
        targets: vec![0.1, 0.7],
    };
    let shape = MlpShape::new(vec![2, 3, 1]);
    let mut hyper = vec![0.2, 0.1];
    hyper.extend(shape.init(0.3, 5));
    let exact = exact_gradient(&logits, &objective.targets);

    let num_batches: u64 = 3000;
    let grads: Vec<Vec<f64>> = (0..num_batches)
        .map(|t| {
            let noise = NoiseBatch::draw(2, 2, t);
            relax_estimate(&logits, &hyper, &shape, &noise, &objective).grad_logits
        })
        .collect();

    let (mean, stderr) = mean_and_stderr(&grads);
    for d in 0..2 {
        assert!(
            (mean[d] - exact[d]).abs() < 5.0 * stderr[d] + 1e-3,
            "coordinate {d}: Monte-Carlo mean {} vs exact {} (stderr {})",
            mean[d],
            exact[d],
            stderr[d]
        );
    }
}

#[test]
fn hyperparameters_move_variance_not_bias() {
    let logits = [0.4];
    let objective = Quadratic {
        targets: vec![0.1],
    };
    // η ≈ 0 strips the control variate down to the raw score-function
    // estimator; η = 1 engages it. Same temperature in both runs.
    let score_only = [-0.693, -30.0];
    let controlled = [-0.693, 0.0];

    let num_batches: u64 = 2000;
    let run = |hyper: &[f64]| -> Vec<Vec<f64>> {
        (0..num_batches)
            .map(|t| {
                let noise = NoiseBatch::draw(1, 1, t);
                rebar_estimate(&logits, hyper, &noise, &objective).grad_logits
            })
            .collect()
    };

    let (mean_a, se_a) = mean_and_stderr(&run(&score_only));
    let (mean_b, se_b) = mean_and_stderr(&run(&controlled));

    // Means agree within sampling tolerance...
    let combined = (se_a[0] * se_a[0] + se_b[0] * se_b[0]).sqrt();
    assert!(
        (mean_a[0] - mean_b[0]).abs() < 5.0 * combined + 1e-3,
        "means diverged: {} vs {} (combined stderr {})",
        mean_a[0],
        mean_b[0],
        combined
    );

    // ...while the control variate shrinks the spread.
    let n = num_batches as f64;
    let var_a = se_a[0] * se_a[0] * n;
    let var_b = se_b[0] * se_b[0] * n;
    assert!(
        var_b < var_a,
        "control variate did not reduce variance: {var_b} vs {var_a}"
    );
}

#[test]
fn zero_surrogate_reduces_to_score_function() {
    let logits = [0.2, -0.5, 1.0];
    let objective = Quadratic {
        targets: vec![0.1, 0.5, 0.9],
    };
    let shape = MlpShape::new(vec![3, 4, 1]);
    let mut hyper = vec![0.3, 0.7];
    hyper.extend(vec![0.0; shape.num_params()]);

    let noise = NoiseBatch::draw(6, 3, 11);
    let est = relax_estimate(&logits, &hyper, &shape, &noise, &objective);

    // With all-zero weights the surrogate is identically zero with zero
    // input gradient, so only the score term survives:
    // g_d = mean_i f(b_i)·(b_i − σ(θ_d)).
    let mut expected = vec![0.0; 3];
    for i in 0..6 {
        let (u, _v) = noise.row(i);
        let b = bernoulli_sample(&logits, u);
        let f_b: f64 = objective.eval(&logits, &b);
        for d in 0..3 {
            expected[d] += f_b * (b[d] - sigmoid(logits[d]));
        }
    }
    for e in expected.iter_mut() {
        *e /= 6.0;
    }

    for d in 0..3 {
        assert_abs_diff_eq!(est.grad_logits[d], expected[d], epsilon = 1e-10);
    }
}

#[test]
fn variance_gradient_points_downhill() {
    // Under common random numbers the reported hyperparameter gradient is
    // the exact gradient of the empirical variance proxy, so a small step
    // against it must reduce the proxy on the same noise.
    let logits = [0.4];
    let objective = Quadratic {
        targets: vec![0.1],
    };

    let evaluate = |hyper: &[f64]| -> (f64, Vec<f64>) {
        let mut proxy = 0.0;
        let mut grad = vec![0.0; 2];
        for t in 0..20u64 {
            let noise = NoiseBatch::draw(4, 1, 100 + t);
            let est = rebar_estimate(&logits, hyper, &noise, &objective);
            proxy += est.variance[0];
            for k in 0..2 {
                grad[k] += est.grad_hyper[k];
            }
        }
        proxy /= 20.0;
        for g in grad.iter_mut() {
            *g /= 20.0;
        }
        (proxy, grad)
    };

    let hyper = [0.5, 0.5];
    let (before, grad) = evaluate(&hyper);
    let norm = (grad[0] * grad[0] + grad[1] * grad[1]).sqrt();
    assert!(norm > 0.0, "variance gradient vanished");

    let alpha = 0.02 / norm.max(1.0);
    let stepped = [hyper[0] - alpha * grad[0], hyper[1] - alpha * grad[1]];
    let (after, _) = evaluate(&stepped);

    assert!(
        after < before,
        "variance proxy rose after a descent step: {after} vs {before}"
    );
}

#[test]
fn saturated_logits_give_finite_estimates() {
    let logits = [40.0, -40.0];
    let objective = Quadratic {
        targets: vec![0.2, 0.8],
    };
    let noise = NoiseBatch::draw(8, 2, 1);
    let est = rebar_estimate(&logits, &[0.0, 0.0], &noise, &objective);

    assert!(est.objective.is_finite());
    assert!(est.grad_logits.iter().all(|g| g.is_finite()));
    assert!(est.grad_hyper.iter().all(|g| g.is_finite()));
    assert!(est.variance.iter().all(|v| v.is_finite()));
}

#[test]
fn estimate_is_a_pure_function() {
    let logits = [0.3, -0.2];
    let objective = Quadratic {
        targets: vec![0.4, 0.6],
    };
    let hyper = [0.1, -0.3];
    let noise = NoiseBatch::draw(3, 2, 9);

    let a = rebar_estimate(&logits, &hyper, &noise, &objective);
    let b = rebar_estimate(&logits, &hyper, &noise, &objective);

    assert_eq!(a.objective, b.objective);
    assert_eq!(a.grad_logits, b.grad_logits);
    assert_eq!(a.grad_hyper, b.grad_hyper);
    assert_eq!(a.variance, b.variance);
}

#[test]
#[should_panic(expected = "shape mismatch")]
fn wrong_hyperparameter_length_panics() {
    let objective = Quadratic {
        targets: vec![0.5],
    };
    let noise = NoiseBatch::draw(1, 1, 0);
    rebar_estimate(&[0.0], &[0.0, 0.0, 0.0], &noise, &objective);
}
