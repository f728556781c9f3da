//! Arithmetic on tracked values.
//!
//! Every operator computes its value on the primitives and pushes the
//! operand partials as one tape span. Constants fall out naturally: an
//! unrecorded operand contributes no partial, so no adjoint ever flows
//! back into it.

use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

use crate::float::Float;
use crate::reverse::Reverse;
use crate::tape::{with_tape, ActiveTape};

/// Tracked ⊕ tracked. Each entry yields `(value, d_lhs, d_rhs)` in terms of
/// the operand values.
macro_rules! tracked_binary {
    ($($op:ident :: $method:ident: |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            impl<F: Float + ActiveTape> $op for Reverse<F> {
                type Output = Self;
                #[inline]
                fn $method(self, rhs: Self) -> Self {
                    let ($a, $b) = (self.value, rhs.value);
                    let (value, d_lhs, d_rhs) = $body;
                    let slot =
                        with_tape(|t| t.push_binary(self.slot, d_lhs, rhs.slot, d_rhs));
                    Reverse { value, slot }
                }
            }
        )*
    };
}

tracked_binary! {
    Add::add: |a, b| (a + b, F::one(), F::one());
    Sub::sub: |a, b| (a - b, F::one(), -F::one());
    Mul::mul: |a, b| (a * b, b, a);
    Div::div: |a, b| {
        let inv = b.recip();
        (a * inv, inv, -a * inv * inv)
    };
    // d(a % b)/db is -floor(a/b) at the value, but the networks only ever
    // take remainders by untracked quantities, so the modulus is treated as
    // frozen.
    Rem::rem: |a, b| (a % b, F::one(), F::zero());
}

/// Tracked ⊕ plain float: a single-operand span. Entries yield `(value, d)`.
macro_rules! tracked_with_plain {
    ($($op:ident :: $method:ident: |$a:ident, $c:ident| $body:expr;)*) => {
        $(
            impl<F: Float + ActiveTape> $op<F> for Reverse<F> {
                type Output = Reverse<F>;
                #[inline]
                fn $method(self, rhs: F) -> Reverse<F> {
                    let ($a, $c) = (self.value, rhs);
                    let (value, d) = $body;
                    let slot = with_tape(|t| t.push_unary(self.slot, d));
                    Reverse { value, slot }
                }
            }
        )*
    };
}

tracked_with_plain! {
    Add::add: |a, c| (a + c, F::one());
    Sub::sub: |a, c| (a - c, F::one());
    Mul::mul: |a, c| (a * c, c);
    Div::div: |a, c| {
        let inv = c.recip();
        (a * inv, inv)
    };
    Rem::rem: |a, c| (a % c, F::one());
}

/// Plain float ⊕ tracked. The orphan rule needs a concrete self type here,
/// so these go through a per-primitive macro instead of a blanket impl.
macro_rules! plain_with_tracked {
    ($f:ty) => {
        impl Add<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn add(self, rhs: Reverse<$f>) -> Reverse<$f> {
                let slot = with_tape(|t| t.push_unary(rhs.slot, 1.0));
                Reverse {
                    value: self + rhs.value,
                    slot,
                }
            }
        }

        impl Sub<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn sub(self, rhs: Reverse<$f>) -> Reverse<$f> {
                let slot = with_tape(|t| t.push_unary(rhs.slot, -1.0));
                Reverse {
                    value: self - rhs.value,
                    slot,
                }
            }
        }

        impl Mul<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn mul(self, rhs: Reverse<$f>) -> Reverse<$f> {
                let slot = with_tape(|t| t.push_unary(rhs.slot, self));
                Reverse {
                    value: self * rhs.value,
                    slot,
                }
            }
        }

        impl Div<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn div(self, rhs: Reverse<$f>) -> Reverse<$f> {
                let inv = 1.0 / rhs.value;
                let slot = with_tape(|t| t.push_unary(rhs.slot, -self * inv * inv));
                Reverse {
                    value: self * inv,
                    slot,
                }
            }
        }

        impl Rem<Reverse<$f>> for $f {
            type Output = Reverse<$f>;
            #[inline]
            fn rem(self, rhs: Reverse<$f>) -> Reverse<$f> {
                // Frozen modulus, see above.
                Reverse::constant(self % rhs.value)
            }
        }
    };
}

plain_with_tracked!(f32);
plain_with_tracked!(f64);

macro_rules! tracked_assign {
    ($($op:ident :: $method:ident => $binop:tt;)*) => {
        $(
            impl<F: Float + ActiveTape> $op for Reverse<F> {
                #[inline]
                fn $method(&mut self, rhs: Self) {
                    *self = *self $binop rhs;
                }
            }
        )*
    };
}

tracked_assign! {
    AddAssign::add_assign => +;
    SubAssign::sub_assign => -;
    MulAssign::mul_assign => *;
    DivAssign::div_assign => /;
    RemAssign::rem_assign => %;
}

impl<F: Float + ActiveTape> Neg for Reverse<F> {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        let slot = with_tape(|t| t.push_unary(self.slot, -F::one()));
        Reverse {
            value: -self.value,
            slot,
        }
    }
}

// Comparisons look straight through to the values, so branch conditions in
// generic code take the same path tracked and untracked.
impl<F: Float> PartialEq for Reverse<F> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<F: Float> PartialOrd for Reverse<F> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value.partial_cmp(&other.value)
    }
}
