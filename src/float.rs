use std::fmt::{Debug, Display};

use num_traits::{FloatConst, FromPrimitive};

/// The primitive floats (`f32`, `f64`), with every bound the crate leans on
/// gathered in one place. Tracked AD types wrap a `Float`; they never
/// implement it themselves.
pub trait Float:
    num_traits::Float
    + FloatConst
    + FromPrimitive
    + Copy
    + Default
    + Debug
    + Display
    + Send
    + Sync
    + 'static
{
}

impl Float for f32 {}
impl Float for f64 {}
