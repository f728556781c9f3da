//! Stopping criteria shared by the optimizers.

/// Tolerances that end a run before the iteration budget does.
#[derive(Clone, Copy, Debug)]
pub struct ConvergenceParams {
    /// Stop once the gradient's Euclidean norm falls below this.
    pub grad_tol: f64,
    /// Stop once an accepted step decreases the loss by less than this,
    /// relative to the current loss.
    pub loss_tol: f64,
}

impl Default for ConvergenceParams {
    fn default() -> Self {
        ConvergenceParams {
            grad_tol: 1e-9,
            loss_tol: 1e-12,
        }
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}
