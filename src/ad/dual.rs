//! Forward-mode dual number.
//!
//! A [`Tangent`] carries a primal value and the derivative of that value
//! along one tangent direction. Composed over a reverse variable
//! (`Tangent<Var<f64>>`) it differentiates a directional derivative: seed
//! the direction in the `dot` components, then run a reverse sweep from the
//! output's `dot` node. That composition is how the variance tuner obtains
//! hyperparameter gradients of the per-sample logits gradient.

use std::fmt::{self, Display};
use std::num::FpCategory;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign};

use num_traits::{
    Float as NumFloat, FloatConst, FromPrimitive, Num, NumCast, One, Signed, ToPrimitive, Zero,
};

use crate::ad::Real;

/// Value plus directional derivative: `val + dot·ε` with `ε² = 0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tangent<F: Real> {
    /// Primal value.
    pub val: F,
    /// Derivative along the seeded direction.
    pub dot: F,
}

impl<F: Real> Tangent<F> {
    #[inline]
    pub fn new(val: F, dot: F) -> Self {
        Tangent { val, dot }
    }

    /// A constant: zero derivative.
    #[inline]
    pub fn constant(val: F) -> Self {
        Tangent {
            val,
            dot: F::zero(),
        }
    }

    /// Chain rule for a unary elemental with known value and derivative.
    #[inline]
    fn chain(self, f_val: F, f_deriv: F) -> Self {
        Tangent {
            val: f_val,
            dot: self.dot * f_deriv,
        }
    }
}

impl<F: Real> Display for Tangent<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}ε", self.val, self.dot)
    }
}

// ── Arithmetic operators ──

impl<F: Real> Add for Tangent<F> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Tangent {
            val: self.val + rhs.val,
            dot: self.dot + rhs.dot,
        }
    }
}

impl<F: Real> Sub for Tangent<F> {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Tangent {
            val: self.val - rhs.val,
            dot: self.dot - rhs.dot,
        }
    }
}

impl<F: Real> Mul for Tangent<F> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Tangent {
            val: self.val * rhs.val,
            dot: self.val * rhs.dot + self.dot * rhs.val,
        }
    }
}

impl<F: Real> Div for Tangent<F> {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        let inv = F::one() / rhs.val;
        Tangent {
            val: self.val * inv,
            dot: (self.dot * rhs.val - self.val * rhs.dot) * inv * inv,
        }
    }
}

impl<F: Real> Neg for Tangent<F> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Tangent {
            val: -self.val,
            dot: -self.dot,
        }
    }
}

impl<F: Real> Rem for Tangent<F> {
    type Output = Self;
    #[inline]
    fn rem(self, rhs: Self) -> Self {
        Tangent {
            val: self.val % rhs.val,
            dot: self.dot,
        }
    }
}

impl<F: Real> AddAssign for Tangent<F> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<F: Real> SubAssign for Tangent<F> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<F: Real> MulAssign for Tangent<F> {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<F: Real> DivAssign for Tangent<F> {
    #[inline]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl<F: Real> RemAssign for Tangent<F> {
    #[inline]
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl<F: Real> PartialEq for Tangent<F> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl<F: Real> PartialOrd for Tangent<F> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.val.partial_cmp(&other.val)
    }
}

// ── num-traits surface ──

impl<F: Real> Zero for Tangent<F> {
    #[inline]
    fn zero() -> Self {
        Tangent::constant(F::zero())
    }
    #[inline]
    fn is_zero(&self) -> bool {
        self.val.is_zero()
    }
}

impl<F: Real> One for Tangent<F> {
    #[inline]
    fn one() -> Self {
        Tangent::constant(F::one())
    }
}

impl<F: Real> Num for Tangent<F> {
    type FromStrRadixErr = F::FromStrRadixErr;
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        F::from_str_radix(str, radix).map(Tangent::constant)
    }
}

impl<F: Real> FromPrimitive for Tangent<F> {
    #[inline]
    fn from_i64(n: i64) -> Option<Self> {
        F::from_i64(n).map(Tangent::constant)
    }
    #[inline]
    fn from_u64(n: u64) -> Option<Self> {
        F::from_u64(n).map(Tangent::constant)
    }
    #[inline]
    fn from_f32(n: f32) -> Option<Self> {
        F::from_f32(n).map(Tangent::constant)
    }
    #[inline]
    fn from_f64(n: f64) -> Option<Self> {
        F::from_f64(n).map(Tangent::constant)
    }
}

impl<F: Real> ToPrimitive for Tangent<F> {
    #[inline]
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    #[inline]
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    #[inline]
    fn to_f32(&self) -> Option<f32> {
        self.val.to_f32()
    }
    #[inline]
    fn to_f64(&self) -> Option<f64> {
        self.val.to_f64()
    }
}

impl<F: Real> NumCast for Tangent<F> {
    #[inline]
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        F::from(n).map(Tangent::constant)
    }
}

impl<F: Real> Signed for Tangent<F> {
    #[inline]
    fn abs(&self) -> Self {
        self.chain(self.val.abs(), self.val.signum())
    }
    #[inline]
    fn abs_sub(&self, other: &Self) -> Self {
        if self.val > other.val {
            *self - *other
        } else {
            Self::zero()
        }
    }
    #[inline]
    fn signum(&self) -> Self {
        Tangent::constant(self.val.signum())
    }
    #[inline]
    fn is_positive(&self) -> bool {
        self.val.is_sign_positive()
    }
    #[inline]
    fn is_negative(&self) -> bool {
        self.val.is_sign_negative()
    }
}

impl<F: Real> FloatConst for Tangent<F> {
    fn E() -> Self { Tangent::constant(F::E()) }
    fn FRAC_1_PI() -> Self { Tangent::constant(F::FRAC_1_PI()) }
    fn FRAC_1_SQRT_2() -> Self { Tangent::constant(F::FRAC_1_SQRT_2()) }
    fn FRAC_2_PI() -> Self { Tangent::constant(F::FRAC_2_PI()) }
    fn FRAC_2_SQRT_PI() -> Self { Tangent::constant(F::FRAC_2_SQRT_PI()) }
    fn FRAC_PI_2() -> Self { Tangent::constant(F::FRAC_PI_2()) }
    fn FRAC_PI_3() -> Self { Tangent::constant(F::FRAC_PI_3()) }
    fn FRAC_PI_4() -> Self { Tangent::constant(F::FRAC_PI_4()) }
    fn FRAC_PI_6() -> Self { Tangent::constant(F::FRAC_PI_6()) }
    fn FRAC_PI_8() -> Self { Tangent::constant(F::FRAC_PI_8()) }
    fn LN_10() -> Self { Tangent::constant(F::LN_10()) }
    fn LN_2() -> Self { Tangent::constant(F::LN_2()) }
    fn LOG10_E() -> Self { Tangent::constant(F::LOG10_E()) }
    fn LOG2_E() -> Self { Tangent::constant(F::LOG2_E()) }
    fn PI() -> Self { Tangent::constant(F::PI()) }
    fn SQRT_2() -> Self { Tangent::constant(F::SQRT_2()) }
    fn TAU() -> Self { Tangent::constant(F::TAU()) }
    fn LOG10_2() -> Self { Tangent::constant(F::LOG10_2()) }
    fn LOG2_10() -> Self { Tangent::constant(F::LOG2_10()) }
}

impl<F: Real> NumFloat for Tangent<F> {
    fn nan() -> Self { Tangent::constant(F::nan()) }
    fn infinity() -> Self { Tangent::constant(F::infinity()) }
    fn neg_infinity() -> Self { Tangent::constant(F::neg_infinity()) }
    fn neg_zero() -> Self { Tangent::constant(F::neg_zero()) }

    fn min_value() -> Self { Tangent::constant(F::min_value()) }
    fn min_positive_value() -> Self { Tangent::constant(F::min_positive_value()) }
    fn max_value() -> Self { Tangent::constant(F::max_value()) }
    fn epsilon() -> Self { Tangent::constant(F::epsilon()) }

    fn is_nan(self) -> bool { self.val.is_nan() }
    fn is_infinite(self) -> bool { self.val.is_infinite() }
    fn is_finite(self) -> bool { self.val.is_finite() }
    fn is_normal(self) -> bool { self.val.is_normal() }
    fn is_sign_positive(self) -> bool { self.val.is_sign_positive() }
    fn is_sign_negative(self) -> bool { self.val.is_sign_negative() }
    fn classify(self) -> FpCategory { self.val.classify() }

    fn floor(self) -> Self { Tangent::constant(self.val.floor()) }
    fn ceil(self) -> Self { Tangent::constant(self.val.ceil()) }
    fn round(self) -> Self { Tangent::constant(self.val.round()) }
    fn trunc(self) -> Self { Tangent::constant(self.val.trunc()) }
    fn signum(self) -> Self { Tangent::constant(self.val.signum()) }

    fn fract(self) -> Self {
        Tangent {
            val: self.val.fract(),
            dot: self.dot,
        }
    }

    fn abs(self) -> Self {
        self.chain(self.val.abs(), self.val.signum())
    }

    fn mul_add(self, a: Self, b: Self) -> Self {
        Tangent {
            val: self.val.mul_add(a.val, b.val),
            dot: self.dot * a.val + self.val * a.dot + b.dot,
        }
    }

    fn recip(self) -> Self {
        let inv = F::one() / self.val;
        self.chain(inv, -inv * inv)
    }

    fn powi(self, n: i32) -> Self {
        let val = self.val.powi(n);
        let deriv = F::from(n).unwrap() * self.val.powi(n - 1);
        self.chain(val, deriv)
    }

    fn powf(self, n: Self) -> Self {
        let val = self.val.powf(n.val);
        Tangent {
            val,
            dot: val * (n.val * self.dot / self.val + n.dot * self.val.ln()),
        }
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        let two = F::one() + F::one();
        self.chain(s, F::one() / (two * s))
    }

    fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        let three = F::from(3.0).unwrap();
        self.chain(c, F::one() / (three * c * c))
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }

    fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * F::LN_2())
    }

    fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }

    fn ln(self) -> Self {
        self.chain(self.val.ln(), F::one() / self.val)
    }

    fn log2(self) -> Self {
        self.chain(self.val.log2(), F::one() / (self.val * F::LN_2()))
    }

    fn log10(self) -> Self {
        self.chain(self.val.log10(), F::one() / (self.val * F::LN_10()))
    }

    fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), F::one() / (F::one() + self.val))
    }

    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }

    fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }

    fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }

    fn tan(self) -> Self {
        let c = self.val.cos();
        self.chain(self.val.tan(), F::one() / (c * c))
    }

    fn sin_cos(self) -> (Self, Self) {
        let (s, c) = self.val.sin_cos();
        (self.chain(s, c), self.chain(c, -s))
    }

    fn asin(self) -> Self {
        self.chain(
            self.val.asin(),
            F::one() / (F::one() - self.val * self.val).sqrt(),
        )
    }

    fn acos(self) -> Self {
        self.chain(
            self.val.acos(),
            -F::one() / (F::one() - self.val * self.val).sqrt(),
        )
    }

    fn atan(self) -> Self {
        self.chain(self.val.atan(), F::one() / (F::one() + self.val * self.val))
    }

    fn atan2(self, other: Self) -> Self {
        let denom = self.val * self.val + other.val * other.val;
        Tangent {
            val: self.val.atan2(other.val),
            dot: (other.val * self.dot - self.val * other.dot) / denom,
        }
    }

    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }

    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }

    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, F::one() - t * t)
    }

    fn asinh(self) -> Self {
        self.chain(
            self.val.asinh(),
            F::one() / (self.val * self.val + F::one()).sqrt(),
        )
    }

    fn acosh(self) -> Self {
        self.chain(
            self.val.acosh(),
            F::one() / (self.val * self.val - F::one()).sqrt(),
        )
    }

    fn atanh(self) -> Self {
        self.chain(self.val.atanh(), F::one() / (F::one() - self.val * self.val))
    }

    fn hypot(self, other: Self) -> Self {
        let h = self.val.hypot(other.val);
        Tangent {
            val: h,
            dot: (self.val * self.dot + other.val * other.dot) / h,
        }
    }

    fn max(self, other: Self) -> Self {
        if self.val >= other.val {
            self
        } else {
            other
        }
    }

    fn min(self, other: Self) -> Self {
        if self.val <= other.val {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.val > other.val {
            self - other
        } else {
            Self::zero()
        }
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }

    fn to_degrees(self) -> Self {
        let factor = F::from(180.0).unwrap() / F::PI();
        Tangent {
            val: self.val.to_degrees(),
            dot: self.dot * factor,
        }
    }

    fn to_radians(self) -> Self {
        let factor = F::PI() / F::from(180.0).unwrap();
        Tangent {
            val: self.val.to_radians(),
            dot: self.dot * factor,
        }
    }
}
