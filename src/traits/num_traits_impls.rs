//! `num_traits` for tracked values, so `Reverse<F>` can stand in for a
//! primitive float in generic numeric code.
//!
//! Constructors and casts produce constants. Elemental functions record
//! their local derivative on the active tape. Rounding and sign extraction
//! have zero derivative almost everywhere and come back as constants.

use std::num::FpCategory;

use num_traits::{
    Float as NumFloat, FromPrimitive, Num, NumCast, One, Signed, ToPrimitive, Zero,
};

use crate::float::Float;
use crate::reverse::Reverse;
use crate::tape::{with_tape, ActiveTape};

impl<F: Float + ActiveTape> Reverse<F> {
    /// Record `value = f(self)` with local derivative `d`.
    #[inline]
    fn chain(self, value: F, d: F) -> Self {
        let slot = with_tape(|t| t.push_unary(self.slot, d));
        Reverse { value, slot }
    }

    /// Record `value = f(self, other)` with local partials `d_self`, `d_other`.
    #[inline]
    fn chain2(self, other: Self, value: F, d_self: F, d_other: F) -> Self {
        let slot = with_tape(|t| t.push_binary(self.slot, d_self, other.slot, d_other));
        Reverse { value, slot }
    }
}

impl<F: Float> FromPrimitive for Reverse<F> {
    #[inline]
    fn from_i64(n: i64) -> Option<Self> {
        F::from_i64(n).map(Reverse::constant)
    }
    #[inline]
    fn from_u64(n: u64) -> Option<Self> {
        F::from_u64(n).map(Reverse::constant)
    }
    #[inline]
    fn from_f32(n: f32) -> Option<Self> {
        F::from_f32(n).map(Reverse::constant)
    }
    #[inline]
    fn from_f64(n: f64) -> Option<Self> {
        F::from_f64(n).map(Reverse::constant)
    }
}

impl<F: Float> ToPrimitive for Reverse<F> {
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

impl<F: Float> NumCast for Reverse<F> {
    #[inline]
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        F::from(n).map(Reverse::constant)
    }
}

impl<F: Float + ActiveTape> Zero for Reverse<F> {
    #[inline]
    fn zero() -> Self {
        Reverse::constant(F::zero())
    }
    #[inline]
    fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
}

impl<F: Float + ActiveTape> One for Reverse<F> {
    #[inline]
    fn one() -> Self {
        Reverse::constant(F::one())
    }
}

impl<F: Float + ActiveTape> Num for Reverse<F> {
    type FromStrRadixErr = F::FromStrRadixErr;
    fn from_str_radix(src: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        F::from_str_radix(src, radix).map(Reverse::constant)
    }
}

impl<F: Float + ActiveTape> Signed for Reverse<F> {
    #[inline]
    fn abs(&self) -> Self {
        NumFloat::abs(*self)
    }
    #[inline]
    fn abs_sub(&self, other: &Self) -> Self {
        NumFloat::abs_sub(*self, *other)
    }
    #[inline]
    fn signum(&self) -> Self {
        Reverse::constant(self.value.signum())
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

/// Nullary constructors lifted to constants.
macro_rules! lifted_consts {
    ($($name:ident)*) => {
        $(
            #[inline]
            fn $name() -> Self {
                Reverse::constant(F::$name())
            }
        )*
    };
}

/// Predicates answered by the value alone.
macro_rules! value_predicates {
    ($($name:ident)*) => {
        $(
            #[inline]
            fn $name(self) -> bool {
                self.value.$name()
            }
        )*
    };
}

/// Piecewise-flat maps: the derivative is zero wherever it exists.
macro_rules! flat_to_constant {
    ($($name:ident)*) => {
        $(
            #[inline]
            fn $name(self) -> Self {
                Reverse::constant(self.value.$name())
            }
        )*
    };
}

/// Smooth unary elementals. Each entry yields `(value, derivative)` in
/// terms of `$x`, the operand value.
macro_rules! elementals {
    ($($name:ident: |$x:ident| $body:expr;)*) => {
        $(
            fn $name(self) -> Self {
                let $x = self.value;
                let (value, d) = $body;
                self.chain(value, d)
            }
        )*
    };
}

impl<F: Float + ActiveTape> NumFloat for Reverse<F> {
    lifted_consts! {
        nan infinity neg_infinity neg_zero
        min_value min_positive_value max_value epsilon
    }

    value_predicates! {
        is_nan is_infinite is_finite is_normal
        is_sign_positive is_sign_negative
    }

    #[inline]
    fn classify(self) -> FpCategory {
        self.value.classify()
    }

    #[inline]
    fn integer_decode(self) -> (u64, i16, i8) {
        self.value.integer_decode()
    }

    flat_to_constant! {
        floor ceil round trunc signum
    }

    elementals! {
        fract: |x| (x.fract(), F::one());
        abs: |x| (x.abs(), x.signum());
        recip: |x| {
            let inv = x.recip();
            (inv, -inv * inv)
        };
        sqrt: |x| {
            let s = x.sqrt();
            (s, (s + s).recip())
        };
        cbrt: |x| {
            let c = x.cbrt();
            (c, (c * c * F::from(3.0).unwrap()).recip())
        };
        exp: |x| {
            let e = x.exp();
            (e, e)
        };
        exp2: |x| {
            let e = x.exp2();
            (e, e * F::LN_2())
        };
        exp_m1: |x| (x.exp_m1(), x.exp());
        ln: |x| (x.ln(), x.recip());
        log2: |x| (x.log2(), (x * F::LN_2()).recip());
        log10: |x| (x.log10(), (x * F::LN_10()).recip());
        ln_1p: |x| (x.ln_1p(), (F::one() + x).recip());
        sin: |x| (x.sin(), x.cos());
        cos: |x| (x.cos(), -x.sin());
        tan: |x| {
            let c = x.cos();
            (x.tan(), (c * c).recip())
        };
        asin: |x| (x.asin(), (F::one() - x * x).sqrt().recip());
        acos: |x| (x.acos(), -(F::one() - x * x).sqrt().recip());
        atan: |x| (x.atan(), (F::one() + x * x).recip());
        sinh: |x| (x.sinh(), x.cosh());
        cosh: |x| (x.cosh(), x.sinh());
        tanh: |x| {
            let c = x.cosh();
            (x.tanh(), (c * c).recip())
        };
        asinh: |x| (x.asinh(), (x * x + F::one()).sqrt().recip());
        acosh: |x| (x.acosh(), (x * x - F::one()).sqrt().recip());
        atanh: |x| (x.atanh(), (F::one() - x * x).recip());
        to_degrees: |x| (x.to_degrees(), F::one().to_degrees());
        to_radians: |x| (x.to_radians(), F::one().to_radians());
    }

    #[inline]
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }

    fn powi(self, n: i32) -> Self {
        let d = F::from(n).unwrap() * self.value.powi(n - 1);
        self.chain(self.value.powi(n), d)
    }

    fn powf(self, n: Self) -> Self {
        let value = self.value.powf(n.value);
        let d_base = n.value * self.value.powf(n.value - F::one());
        let d_exp = value * self.value.ln();
        self.chain2(n, value, d_base, d_exp)
    }

    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }

    fn sin_cos(self) -> (Self, Self) {
        let (s, c) = self.value.sin_cos();
        (self.chain(s, c), self.chain(c, -s))
    }

    fn atan2(self, other: Self) -> Self {
        let denom = self.value * self.value + other.value * other.value;
        let value = self.value.atan2(other.value);
        self.chain2(other, value, other.value / denom, -self.value / denom)
    }

    fn hypot(self, other: Self) -> Self {
        let h = self.value.hypot(other.value);
        self.chain2(other, h, self.value / h, other.value / h)
    }

    // max and min record only the winning operand. Ties go to self, which
    // keeps the subgradient choice deterministic.
    fn max(self, other: Self) -> Self {
        let winner = if self.value >= other.value { self } else { other };
        winner.chain(winner.value, F::one())
    }

    fn min(self, other: Self) -> Self {
        let winner = if self.value <= other.value { self } else { other };
        winner.chain(winner.value, F::one())
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.value > other.value {
            self - other
        } else {
            Self::zero()
        }
    }
}
