//! Reverse-mode variable.

use std::fmt::{self, Display};
use std::num::FpCategory;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign};

use num_traits::{
    Float as NumFloat, FloatConst, FromPrimitive, Num, NumCast, One, Signed, ToPrimitive, Zero,
};

use crate::ad::tape::{with_tape, Tape, TapeHook, UNTRACKED};
use crate::ad::Real;

/// A value tracked on the active reverse tape: the primal plus a node index.
///
/// `Copy` because the tape lives in a thread-local, not in the struct.
/// Untracked constants carry the [`UNTRACKED`] sentinel and cost nothing.
#[derive(Clone, Copy, Debug)]
pub struct Var<F: Real> {
    pub(crate) value: F,
    pub(crate) node: u32,
}

impl<F: Real> Var<F> {
    /// A constant: participates in arithmetic but records nothing.
    #[inline]
    pub fn constant(value: F) -> Self {
        Var {
            value,
            node: UNTRACKED,
        }
    }

    /// Attach a value to an existing tape node (see [`Tape::variable`]).
    #[inline]
    pub fn from_node(value: F, node: u32) -> Self {
        Var { value, node }
    }

    /// The primal value.
    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    /// The tape node index, or [`UNTRACKED`].
    #[inline]
    pub fn node(&self) -> u32 {
        self.node
    }
}

impl<F: Real> Default for Var<F> {
    fn default() -> Self {
        Var::constant(F::zero())
    }
}

impl<F: Real> Display for Var<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Record a unary elemental, folding constants away from the tape.
#[inline]
fn lift1<F: Real + TapeHook>(x: Var<F>, value: F, dfdx: F) -> Var<F> {
    let node = if x.node == UNTRACKED {
        UNTRACKED
    } else {
        with_tape(|t: &mut Tape<F>| t.unary(x.node, dfdx))
    };
    Var { value, node }
}

/// Record a binary elemental, folding constants away from the tape.
#[inline]
fn lift2<F: Real + TapeHook>(x: Var<F>, y: Var<F>, value: F, dfdx: F, dfdy: F) -> Var<F> {
    let node = if x.node == UNTRACKED && y.node == UNTRACKED {
        UNTRACKED
    } else {
        with_tape(|t: &mut Tape<F>| t.binary(x.node, dfdx, y.node, dfdy))
    };
    Var { value, node }
}

// ── Arithmetic operators ──

impl<F: Real + TapeHook> Add for Var<F> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        lift2(self, rhs, self.value + rhs.value, F::one(), F::one())
    }
}

impl<F: Real + TapeHook> Sub for Var<F> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        lift2(self, rhs, self.value - rhs.value, F::one(), -F::one())
    }
}

impl<F: Real + TapeHook> Mul for Var<F> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        lift2(self, rhs, self.value * rhs.value, rhs.value, self.value)
    }
}

impl<F: Real + TapeHook> Div for Var<F> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let inv = F::one() / rhs.value;
        lift2(self, rhs, self.value * inv, inv, -self.value * inv * inv)
    }
}

impl<F: Real + TapeHook> Neg for Var<F> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        lift1(self, -self.value, -F::one())
    }
}

impl<F: Real + TapeHook> Rem for Var<F> {
    type Output = Self;
    #[inline]
    fn rem(self, rhs: Self) -> Self {
        // Piecewise-constant offset: derivative passes through the numerator.
        lift2(self, rhs, self.value % rhs.value, F::one(), F::zero())
    }
}

impl<F: Real + TapeHook> AddAssign for Var<F> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<F: Real + TapeHook> SubAssign for Var<F> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<F: Real + TapeHook> MulAssign for Var<F> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<F: Real + TapeHook> DivAssign for Var<F> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl<F: Real + TapeHook> RemAssign for Var<F> {
    #[inline]
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl<F: Real> PartialEq for Var<F> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<F: Real> PartialOrd for Var<F> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

// ── num-traits surface ──

impl<F: Real + TapeHook> Zero for Var<F> {
    #[inline]
    fn zero() -> Self {
        Var::constant(F::zero())
    }
    #[inline]
    fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

impl<F: Real + TapeHook> One for Var<F> {
    #[inline]
    fn one() -> Self {
        Var::constant(F::one())
    }
}

impl<F: Real + TapeHook> Num for Var<F> {
    type FromStrRadixErr = F::FromStrRadixErr;
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        F::from_str_radix(str, radix).map(Var::constant)
    }
}

impl<F: Real> FromPrimitive for Var<F> {
    #[inline]
    fn from_i64(n: i64) -> Option<Self> {
        F::from_i64(n).map(Var::constant)
    }
    #[inline]
    fn from_u64(n: u64) -> Option<Self> {
        F::from_u64(n).map(Var::constant)
    }
    #[inline]
    fn from_f32(n: f32) -> Option<Self> {
        F::from_f32(n).map(Var::constant)
    }
    #[inline]
    fn from_f64(n: f64) -> Option<Self> {
        F::from_f64(n).map(Var::constant)
    }
}

impl<F: Real> ToPrimitive for Var<F> {
    #[inline]
    fn to_i64(&self) -> Option<i64> {
        self.value.to_i64()
    }
    #[inline]
    fn to_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }
    #[inline]
    fn to_f32(&self) -> Option<f32> {
        self.value.to_f32()
    }
    #[inline]
    fn to_f64(&self) -> Option<f64> {
        self.value.to_f64()
    }
}

impl<F: Real + TapeHook> NumCast for Var<F> {
    #[inline]
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        F::from(n).map(Var::constant)
    }
}

impl<F: Real + TapeHook> Signed for Var<F> {
    #[inline]
    fn abs(&self) -> Self {
        lift1(*self, self.value.abs(), self.value.signum())
    }
    #[inline]
    fn abs_sub(&self, other: &Self) -> Self {
        if self.value > other.value {
            *self - *other
        } else {
            Self::zero()
        }
    }
    #[inline]
    fn signum(&self) -> Self {
        Var::constant(self.value.signum())
    }
    #[inline]
    fn is_positive(&self) -> bool {
        self.value.is_sign_positive()
    }
    #[inline]
    fn is_negative(&self) -> bool {
        self.value.is_sign_negative()
    }
}

impl<F: Real + TapeHook> FloatConst for Var<F> {
    fn E() -> Self { Var::constant(F::E()) }
    fn FRAC_1_PI() -> Self { Var::constant(F::FRAC_1_PI()) }
    fn FRAC_1_SQRT_2() -> Self { Var::constant(F::FRAC_1_SQRT_2()) }
    fn FRAC_2_PI() -> Self { Var::constant(F::FRAC_2_PI()) }
    fn FRAC_2_SQRT_PI() -> Self { Var::constant(F::FRAC_2_SQRT_PI()) }
    fn FRAC_PI_2() -> Self { Var::constant(F::FRAC_PI_2()) }
    fn FRAC_PI_3() -> Self { Var::constant(F::FRAC_PI_3()) }
    fn FRAC_PI_4() -> Self { Var::constant(F::FRAC_PI_4()) }
    fn FRAC_PI_6() -> Self { Var::constant(F::FRAC_PI_6()) }
    fn FRAC_PI_8() -> Self { Var::constant(F::FRAC_PI_8()) }
    fn LN_10() -> Self { Var::constant(F::LN_10()) }
    fn LN_2() -> Self { Var::constant(F::LN_2()) }
    fn LOG10_E() -> Self { Var::constant(F::LOG10_E()) }
    fn LOG2_E() -> Self { Var::constant(F::LOG2_E()) }
    fn PI() -> Self { Var::constant(F::PI()) }
    fn SQRT_2() -> Self { Var::constant(F::SQRT_2()) }
    fn TAU() -> Self { Var::constant(F::TAU()) }
    fn LOG10_2() -> Self { Var::constant(F::LOG10_2()) }
    fn LOG2_10() -> Self { Var::constant(F::LOG2_10()) }
}

impl<F: Real + TapeHook> NumFloat for Var<F> {
    fn nan() -> Self { Var::constant(F::nan()) }
    fn infinity() -> Self { Var::constant(F::infinity()) }
    fn neg_infinity() -> Self { Var::constant(F::neg_infinity()) }
    fn neg_zero() -> Self { Var::constant(F::neg_zero()) }

    fn min_value() -> Self { Var::constant(F::min_value()) }
    fn min_positive_value() -> Self { Var::constant(F::min_positive_value()) }
    fn max_value() -> Self { Var::constant(F::max_value()) }
    fn epsilon() -> Self { Var::constant(F::epsilon()) }

    fn is_nan(self) -> bool { self.value.is_nan() }
    fn is_infinite(self) -> bool { self.value.is_infinite() }
    fn is_finite(self) -> bool { self.value.is_finite() }
    fn is_normal(self) -> bool { self.value.is_normal() }
    fn is_sign_positive(self) -> bool { self.value.is_sign_positive() }
    fn is_sign_negative(self) -> bool { self.value.is_sign_negative() }
    fn classify(self) -> FpCategory { self.value.classify() }

    // Locally constant steps: no derivative.
    fn floor(self) -> Self { Var::constant(self.value.floor()) }
    fn ceil(self) -> Self { Var::constant(self.value.ceil()) }
    fn round(self) -> Self { Var::constant(self.value.round()) }
    fn trunc(self) -> Self { Var::constant(self.value.trunc()) }
    fn signum(self) -> Self { Var::constant(self.value.signum()) }

    fn fract(self) -> Self {
        lift1(self, self.value.fract(), F::one())
    }

    fn abs(self) -> Self {
        lift1(self, self.value.abs(), self.value.signum())
    }

    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }

    fn recip(self) -> Self {
        let inv = F::one() / self.value;
        lift1(self, inv, -inv * inv)
    }

    fn powi(self, n: i32) -> Self {
        let val = self.value.powi(n);
        let deriv = F::from(n).unwrap() * self.value.powi(n - 1);
        lift1(self, val, deriv)
    }

    fn powf(self, n: Self) -> Self {
        let val = self.value.powf(n.value);
        let dx = n.value * self.value.powf(n.value - F::one());
        let dy = val * self.value.ln();
        lift2(self, n, val, dx, dy)
    }

    fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        let two = F::one() + F::one();
        lift1(self, s, F::one() / (two * s))
    }

    fn cbrt(self) -> Self {
        let c = self.value.cbrt();
        let three = F::from(3.0).unwrap();
        lift1(self, c, F::one() / (three * c * c))
    }

    fn exp(self) -> Self {
        let e = self.value.exp();
        lift1(self, e, e)
    }

    fn exp2(self) -> Self {
        let e = self.value.exp2();
        lift1(self, e, e * F::LN_2())
    }

    fn exp_m1(self) -> Self {
        lift1(self, self.value.exp_m1(), self.value.exp())
    }

    fn ln(self) -> Self {
        lift1(self, self.value.ln(), F::one() / self.value)
    }

    fn log2(self) -> Self {
        lift1(self, self.value.log2(), F::one() / (self.value * F::LN_2()))
    }

    fn log10(self) -> Self {
        lift1(self, self.value.log10(), F::one() / (self.value * F::LN_10()))
    }

    fn ln_1p(self) -> Self {
        lift1(self, self.value.ln_1p(), F::one() / (F::one() + self.value))
    }

    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }

    fn sin(self) -> Self {
        lift1(self, self.value.sin(), self.value.cos())
    }

    fn cos(self) -> Self {
        lift1(self, self.value.cos(), -self.value.sin())
    }

    fn tan(self) -> Self {
        let c = self.value.cos();
        lift1(self, self.value.tan(), F::one() / (c * c))
    }

    fn sin_cos(self) -> (Self, Self) {
        let (s, c) = self.value.sin_cos();
        (lift1(self, s, c), lift1(self, c, -s))
    }

    fn asin(self) -> Self {
        lift1(
            self,
            self.value.asin(),
            F::one() / (F::one() - self.value * self.value).sqrt(),
        )
    }

    fn acos(self) -> Self {
        lift1(
            self,
            self.value.acos(),
            -F::one() / (F::one() - self.value * self.value).sqrt(),
        )
    }

    fn atan(self) -> Self {
        lift1(
            self,
            self.value.atan(),
            F::one() / (F::one() + self.value * self.value),
        )
    }

    fn atan2(self, other: Self) -> Self {
        let denom = self.value * self.value + other.value * other.value;
        lift2(
            self,
            other,
            self.value.atan2(other.value),
            other.value / denom,
            -self.value / denom,
        )
    }

    fn sinh(self) -> Self {
        lift1(self, self.value.sinh(), self.value.cosh())
    }

    fn cosh(self) -> Self {
        lift1(self, self.value.cosh(), self.value.sinh())
    }

    fn tanh(self) -> Self {
        let t = self.value.tanh();
        lift1(self, t, F::one() - t * t)
    }

    fn asinh(self) -> Self {
        lift1(
            self,
            self.value.asinh(),
            F::one() / (self.value * self.value + F::one()).sqrt(),
        )
    }

    fn acosh(self) -> Self {
        lift1(
            self,
            self.value.acosh(),
            F::one() / (self.value * self.value - F::one()).sqrt(),
        )
    }

    fn atanh(self) -> Self {
        lift1(
            self,
            self.value.atanh(),
            F::one() / (F::one() - self.value * self.value),
        )
    }

    fn hypot(self, other: Self) -> Self {
        let h = self.value.hypot(other.value);
        lift2(self, other, h, self.value / h, other.value / h)
    }

    // The selected branch's derivative passes through unchanged.
    fn max(self, other: Self) -> Self {
        if self.value >= other.value {
            lift1(self, self.value, F::one())
        } else {
            lift1(other, other.value, F::one())
        }
    }

    fn min(self, other: Self) -> Self {
        if self.value <= other.value {
            lift1(self, self.value, F::one())
        } else {
            lift1(other, other.value, F::one())
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.value > other.value {
            self - other
        } else {
            Self::zero()
        }
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.value.integer_decode()
    }

    fn to_degrees(self) -> Self {
        let factor = F::from(180.0).unwrap() / F::PI();
        lift1(self, self.value.to_degrees(), factor)
    }

    fn to_radians(self) -> Self {
        let factor = F::PI() / F::from(180.0).unwrap();
        lift1(self, self.value.to_radians(), factor)
    }
}
