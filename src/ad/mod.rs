//! Scalar automatic differentiation.
//!
//! The estimator consumes differentiation through this module only: write a
//! function once, generic over [`Scalar`], then evaluate it with
//!
//! - `f64` for plain values,
//! - [`Var<f64>`](Var) under a [`TapeScope`](tape::TapeScope) for a
//!   reverse-mode gradient ([`grad`] wraps the common case),
//! - [`Tangent<Var<f64>>`](Tangent) for forward-over-reverse: the tangent
//!   components carry a directional derivative whose tape node can itself be
//!   swept in reverse, which is the second round of differentiation the
//!   variance tuner needs.

pub mod dual;
pub mod reverse;
pub mod tape;

use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

pub use dual::Tangent;
pub use reverse::Var;
pub use tape::{Tape, TapeHook, TapeScope, UNTRACKED};

/// Base numeric type an AD wrapper can be built over.
///
/// Implemented for `f32` and `f64`, and for `Var<f64>` so that a forward
/// tangent can ride on top of a reverse tape (`Tangent<Var<f64>>`).
pub trait Real:
    NumFloat + FloatConst + FromPrimitive + Copy + Default + Debug + Display + Send + Sync + 'static
{
}

impl Real for f32 {}
impl Real for f64 {}
impl Real for Var<f64> {}

/// The trait AD-generic numeric code is written against.
///
/// `fn f<T: Scalar>(x: &[T]) -> T` evaluates identically with plain floats
/// and with any wrapper; only the caller decides what is differentiated.
pub trait Scalar:
    NumFloat + FloatConst + FromPrimitive + Copy + Debug + Display + 'static
{
    /// The scalar one nesting level down.
    type Real: Real;

    /// Lift a base value into this scalar as a constant.
    fn lift(val: Self::Real) -> Self;

    /// Project out the primal value, dropping derivative information.
    fn primal(&self) -> Self::Real;
}

impl Scalar for f32 {
    type Real = f32;

    #[inline]
    fn lift(val: f32) -> Self {
        val
    }

    #[inline]
    fn primal(&self) -> f32 {
        *self
    }
}

impl Scalar for f64 {
    type Real = f64;

    #[inline]
    fn lift(val: f64) -> Self {
        val
    }

    #[inline]
    fn primal(&self) -> f64 {
        *self
    }
}

impl<F: Real> Scalar for Tangent<F> {
    type Real = F;

    #[inline]
    fn lift(val: F) -> Self {
        Tangent::constant(val)
    }

    #[inline]
    fn primal(&self) -> F {
        self.val
    }
}

impl<F: Real + TapeHook> Scalar for Var<F> {
    type Real = F;

    #[inline]
    fn lift(val: F) -> Self {
        Var::constant(val)
    }

    #[inline]
    fn primal(&self) -> F {
        self.value()
    }
}

/// Reverse-mode gradient of a scalar function `f : R^n → R`.
///
/// ```
/// let g = relax::ad::grad(|x: &[relax::ad::Var<f64>]| x[0] * x[0] + x[1] * x[1], &[3.0, 4.0]);
/// assert!((g[0] - 6.0).abs() < 1e-12);
/// assert!((g[1] - 8.0).abs() < 1e-12);
/// ```
pub fn grad<F: Real + TapeHook>(
    f: impl FnOnce(&[Var<F>]) -> Var<F>,
    x: &[F],
) -> Vec<F> {
    value_and_grad(f, x).1
}

/// Like [`grad`], also returning the function value.
pub fn value_and_grad<F: Real + TapeHook>(
    f: impl FnOnce(&[Var<F>]) -> Var<F>,
    x: &[F],
) -> (F, Vec<F>) {
    let n = x.len();
    let mut tape = Tape::with_capacity(n * 8);

    // Inputs occupy nodes 0..n.
    let inputs: Vec<Var<F>> = x
        .iter()
        .map(|&val| Var::from_node(val, tape.variable()))
        .collect();

    let _scope = TapeScope::new(&mut tape);
    let output = f(&inputs);

    if output.node() == UNTRACKED {
        // The output never touched an input; the gradient is identically zero.
        return (output.value(), vec![F::zero(); n]);
    }

    let adj = tape.adjoints(output.node());
    let g = (0..n).map(|i| adj[i]).collect();
    (output.value(), g)
}
