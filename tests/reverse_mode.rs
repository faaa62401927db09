use approx::assert_relative_eq;
use num_traits::Float;
use relax::ad::tape::{Tape, TapeScope};
use relax::ad::Var;
use relax::sampler::{bernoulli_logprob, sigmoid, softplus};

/// Run a single-variable reverse-mode differentiation.
fn reverse_grad(f: impl FnOnce(Var<f64>) -> Var<f64>, x: f64) -> f64 {
    let mut tape = Tape::new();
    let x_var = Var::from_node(x, tape.variable());
    let _scope = TapeScope::new(&mut tape);
    let y = f(x_var);
    let adj = tape.adjoints(y.node());
    adj[0]
}

/// Central finite difference for comparison.
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-6;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

// ── Arithmetic ──

#[test]
fn x_squared() {
    let g = reverse_grad(|x| x * x, 3.0);
    assert_relative_eq!(g, 6.0, max_relative = 1e-12);
}

#[test]
fn quotient() {
    let g = reverse_grad(|x| Var::constant(1.0) / (x * x), 2.0);
    assert_relative_eq!(g, finite_diff(|x| 1.0 / (x * x), 2.0), max_relative = 1e-6);
}

#[test]
fn negation_chain() {
    let g = reverse_grad(|x| -(-x * x), 1.5);
    assert_relative_eq!(g, 3.0, max_relative = 1e-12);
}

// ── Elementals ──

#[test]
fn exp_elemental() {
    let g = reverse_grad(|x| x.exp(), 0.7);
    assert_relative_eq!(g, 0.7_f64.exp(), max_relative = 1e-12);
}

#[test]
fn ln_elemental() {
    let g = reverse_grad(|x| x.ln(), 2.5);
    assert_relative_eq!(g, 0.4, max_relative = 1e-12);
}

#[test]
fn tanh_elemental() {
    let g = reverse_grad(|x| x.tanh(), 0.3);
    assert_relative_eq!(g, finite_diff(|x| x.tanh(), 0.3), max_relative = 1e-7);
}

#[test]
fn ln_1p_elemental() {
    let g = reverse_grad(|x| x.ln_1p(), 0.4);
    assert_relative_eq!(g, 1.0 / 1.4, max_relative = 1e-12);
}

// ── Pipeline primitives ──

#[test]
fn sigmoid_gradient_is_closed_form() {
    for &x in &[-3.0, -0.5, 0.0, 0.8, 4.0] {
        let g = reverse_grad(sigmoid, x);
        let s = sigmoid(x);
        assert_relative_eq!(g, s * (1.0 - s), max_relative = 1e-10);
    }
}

#[test]
fn softplus_gradient_is_sigmoid() {
    for &x in &[-20.0, -1.0, 0.0, 2.0, 20.0] {
        let g = reverse_grad(softplus, x);
        assert_relative_eq!(g, sigmoid(x), max_relative = 1e-10, epsilon = 1e-12);
    }
}

#[test]
fn bernoulli_logprob_gradient_is_residual() {
    // d/dθ log p(b | σ(θ)) = b − σ(θ)
    for &(theta, b) in &[(0.3, 1.0), (0.3, 0.0), (-2.0, 1.0), (5.0, 0.0)] {
        let g = reverse_grad(|t| bernoulli_logprob(t, Var::constant(b)), theta);
        assert_relative_eq!(g, b - sigmoid(theta), max_relative = 1e-10, epsilon = 1e-12);
    }
}

// ── grad API ──

#[test]
fn grad_multivariate() {
    // f(x, y) = x²y + y³ → ∇ = [2xy, x² + 3y²]
    let g = relax::ad::grad(
        |x: &[Var<f64>]| x[0] * x[0] * x[1] + x[1] * x[1] * x[1],
        &[3.0, 2.0],
    );
    assert_relative_eq!(g[0], 12.0, max_relative = 1e-12);
    assert_relative_eq!(g[1], 21.0, max_relative = 1e-12);
}

#[test]
fn grad_of_constant_is_zero() {
    let g = relax::ad::grad(|_x: &[Var<f64>]| Var::constant(7.0), &[1.0, 2.0]);
    assert_eq!(g, vec![0.0, 0.0]);
}

#[test]
fn value_and_grad_returns_value() {
    let (v, g) = relax::ad::value_and_grad(|x: &[Var<f64>]| x[0] * x[0], &[4.0]);
    assert_relative_eq!(v, 16.0, max_relative = 1e-12);
    assert_relative_eq!(g[0], 8.0, max_relative = 1e-12);
}

#[test]
fn fan_out_accumulates_adjoints() {
    // y = x·x + x: the input is used three times.
    let g = reverse_grad(|x| x * x + x, 5.0);
    assert_relative_eq!(g, 11.0, max_relative = 1e-12);
}

#[test]
fn branch_follows_value() {
    // max picks the larger operand's derivative path.
    let g = reverse_grad(|x| x.max(Var::constant(0.0)) * x, 2.0);
    assert_relative_eq!(g, 4.0, max_relative = 1e-12);
    let g = reverse_grad(|x| x.max(Var::constant(0.0)) * x, -2.0);
    assert_relative_eq!(g, 0.0, max_relative = 1e-12, epsilon = 1e-12);
}
