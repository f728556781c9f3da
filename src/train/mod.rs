//! Gradient-based training of the unrolled networks.
//!
//! The networks expose their trainable parameters as one flat vector (see
//! [`ParamLayout`](crate::params::ParamLayout)); everything here works on
//! that vector through the [`Objective`] trait and knows nothing about
//! layers or operators.

pub mod convergence;
pub mod descent;
pub mod line_search;
pub mod objective;
pub mod result;

pub use convergence::ConvergenceParams;
pub use descent::{gradient_descent, DescentParams};
pub use line_search::ArmijoParams;
pub use objective::Objective;
pub use result::{FitResult, OptimResult};
