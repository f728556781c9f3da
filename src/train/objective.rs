//! Objective abstraction consumed by the optimizers.

/// A differentiable objective over a flat parameter vector.
pub trait Objective {
    /// Value at `theta`.
    fn eval(&self, theta: &[f64]) -> f64;

    /// Value and gradient at `theta`.
    fn eval_grad(&self, theta: &[f64]) -> (f64, Vec<f64>);
}
