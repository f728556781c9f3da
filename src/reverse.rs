use std::fmt::{self, Display};

use crate::tape::UNRECORDED;
use crate::Float;

/// A tracked value: the primal plus the slot it occupies on the recording
/// tape. `Copy` and two words wide, since the tape itself lives in a
/// thread-local rather than behind a reference here.
#[derive(Clone, Copy, Debug)]
pub struct Reverse<F: Float> {
    pub(crate) value: F,
    pub(crate) slot: u32,
}

impl<F: Float> Reverse<F> {
    /// A value the tape will never differentiate through.
    #[inline]
    pub fn constant(value: F) -> Self {
        Reverse {
            value,
            slot: UNRECORDED,
        }
    }

    /// Wrap a value at the tape slot it was recorded under.
    #[inline]
    pub fn recorded(value: F, slot: u32) -> Self {
        Reverse { value, slot }
    }

    /// The tape slot, [`UNRECORDED`] for constants.
    #[inline]
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

impl<F: Float> Default for Reverse<F> {
    fn default() -> Self {
        Reverse::constant(F::zero())
    }
}

impl<F: Float> Display for Reverse<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.value, f)
    }
}
