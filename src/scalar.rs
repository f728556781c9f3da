//! The [`Scalar`] abstraction the numeric code is written against.
//!
//! Everything differentiable in this crate has one implementation, generic
//! over `Scalar`: run it at `f64` for plain evaluation, at `Reverse<f64>`
//! under a recording tape for gradients.

use std::fmt::{Debug, Display};

use num_traits::FromPrimitive;

use crate::float::Float;
use crate::reverse::Reverse;
use crate::tape::{with_tape, ActiveTape, UNRECORDED};

pub trait Scalar:
    num_traits::Float + FromPrimitive + Copy + Default + Debug + Display + Send + 'static
{
    /// The primitive float underneath.
    type Float: Float;

    /// Embed a plain float as a constant of this scalar type.
    fn from_f(val: Self::Float) -> Self;

    /// The primal value, derivatives stripped.
    fn value(&self) -> Self::Float;

    /// Introduce a result computed outside the scalar algebra, declaring its
    /// local derivatives by hand: `partials` pairs each operand with
    /// `d(result)/d(operand)`. Plain floats ignore the partials; [`Reverse`]
    /// records one tape span holding all of them. This is the entry point
    /// for kernels whose Jacobian is known analytically but whose
    /// computation should not be traced (the taut-string projection, the
    /// Moreau envelope rule).
    fn custom_op(value: Self::Float, partials: &[(Self, Self::Float)]) -> Self;
}

macro_rules! untracked_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                type Float = $t;

                #[inline]
                fn from_f(val: $t) -> Self {
                    val
                }

                #[inline]
                fn value(&self) -> $t {
                    *self
                }

                #[inline]
                fn custom_op(value: $t, _partials: &[(Self, $t)]) -> Self {
                    value
                }
            }
        )*
    };
}

untracked_scalar!(f32, f64);

impl<F: Float + ActiveTape> Scalar for Reverse<F> {
    type Float = F;

    #[inline]
    fn from_f(val: F) -> Self {
        Reverse::constant(val)
    }

    #[inline]
    fn value(&self) -> F {
        self.value
    }

    fn custom_op(value: F, partials: &[(Self, F)]) -> Self {
        if partials.iter().all(|(op, _)| op.slot == UNRECORDED) {
            return Reverse::constant(value);
        }
        let slot = with_tape(|tape| {
            tape.push_nary(partials.iter().map(|&(op, d)| (op.slot, d)))
        });
        Reverse::recorded(value, slot)
    }
}
