//! Gradient descent with backtracking, the trainer behind
//! [`fit`](crate::analysis::AnalysisNetwork::fit).
//!
//! The unrolled training objectives are non-convex and only piecewise
//! smooth, so the step size is chosen adaptively: each iteration backtracks
//! from twice the previously accepted step.

use log::debug;

use super::convergence::{norm, ConvergenceParams};
use super::line_search::{backtrack, ArmijoParams};
use super::objective::Objective;
use super::result::OptimResult;

#[derive(Clone, Copy, Debug)]
pub struct DescentParams {
    pub max_iter: usize,
    pub initial_step: f64,
    pub armijo: ArmijoParams,
    pub convergence: ConvergenceParams,
    pub verbose: u8,
}

impl Default for DescentParams {
    fn default() -> Self {
        DescentParams {
            max_iter: 100,
            initial_step: 1.0,
            armijo: ArmijoParams::default(),
            convergence: ConvergenceParams::default(),
            verbose: 0,
        }
    }
}

/// Minimize `objective` from `theta0`.
pub fn gradient_descent(
    objective: &impl Objective,
    theta0: &[f64],
    params: &DescentParams,
) -> OptimResult {
    let mut theta = theta0.to_vec();
    let (mut loss, mut grad) = objective.eval_grad(&theta);
    let mut history = vec![loss];
    let mut step = params.initial_step;
    let mut iterations = 0;
    let mut converged = false;

    for it in 0..params.max_iter {
        if norm(&grad) < params.convergence.grad_tol {
            converged = true;
            break;
        }
        let accepted = backtrack(
            |t| objective.eval(t),
            &theta,
            loss,
            &grad,
            &grad,
            step,
            &params.armijo,
        );
        let (accepted_step, new_theta, new_loss) = match accepted {
            // No step decreases the loss any further.
            None => {
                converged = true;
                break;
            }
            Some(found) => found,
        };

        let decrease = loss - new_loss;
        theta = new_theta;
        history.push(new_loss);
        iterations = it + 1;
        step = accepted_step * params.armijo.grow;
        if params.verbose > 0 {
            debug!("iteration {it}: loss {new_loss:.6e}, step {accepted_step:.3e}");
        }

        if decrease <= params.convergence.loss_tol * loss.abs().max(1.0) {
            loss = new_loss;
            converged = true;
            break;
        }
        let refreshed = objective.eval_grad(&theta);
        loss = refreshed.0;
        grad = refreshed.1;
    }

    OptimResult {
        theta,
        loss,
        loss_history: history,
        iterations,
        converged,
    }
}
