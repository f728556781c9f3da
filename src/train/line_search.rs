//! Backtracking line search with the Armijo sufficient-decrease rule.

use super::convergence::dot;

#[derive(Clone, Copy, Debug)]
pub struct ArmijoParams {
    /// Sufficient-decrease constant.
    pub c1: f64,
    /// Step multiplier applied on rejection.
    pub shrink: f64,
    /// Step multiplier applied after an accepted iteration.
    pub grow: f64,
    /// Rejections tolerated before the search gives up.
    pub max_backtracks: usize,
}

impl Default for ArmijoParams {
    fn default() -> Self {
        ArmijoParams {
            c1: 1e-4,
            shrink: 0.5,
            grow: 2.0,
            max_backtracks: 40,
        }
    }
}

/// Shrink `step` until `theta - step * direction` satisfies
/// `f(new) <= loss - c1 * step * <grad, direction>`.
///
/// Returns the accepted step together with the new point and its loss, or
/// `None` when every tried step was rejected.
pub fn backtrack(
    f: impl Fn(&[f64]) -> f64,
    theta: &[f64],
    loss: f64,
    grad: &[f64],
    direction: &[f64],
    step: f64,
    params: &ArmijoParams,
) -> Option<(f64, Vec<f64>, f64)> {
    let slope = dot(grad, direction);
    if slope <= 0.0 {
        // Not a descent direction.
        return None;
    }
    let mut step = step;
    for _ in 0..=params.max_backtracks {
        let candidate: Vec<f64> = theta
            .iter()
            .zip(direction)
            .map(|(t, d)| t - step * d)
            .collect();
        let candidate_loss = f(&candidate);
        if candidate_loss.is_finite() && candidate_loss <= loss - params.c1 * step * slope {
            return Some((step, candidate, candidate_loss));
        }
        step *= params.shrink;
    }
    None
}
