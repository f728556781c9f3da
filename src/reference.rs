//! Classical iterative solvers for the analysis problem.
//!
//! These are the algorithms whose unrolled, parametrized counterparts the
//! networks learn. At their analytic initialization the networks reproduce
//! them layer for layer, which the integration tests rely on.

use crate::init::{init_vuz, TvOperators};
use crate::linalg::Mat;
use crate::loss::analysis_loss;
use crate::prox::prox_tv_rows;

/// Iterate trace of a classical solver.
#[derive(Clone, Debug)]
pub struct SolverTrace {
    pub u: Mat<f64>,
    /// Loss before the first iteration and after each one.
    pub loss_history: Vec<f64>,
}

/// Proximal gradient descent with the exact TV prox and the `1 / ||A||^2`
/// step size.
pub fn prox_gradient_tv(ops: &TvOperators, x: &Mat<f64>, lbda: f64, n_iter: usize) -> SolverTrace {
    let step = 1.0 / ops.l_a();
    let (_v0, mut u, _z0) = init_vuz(ops, x, lbda, None);
    let mut loss_history = Vec::with_capacity(n_iter + 1);
    loss_history.push(analysis_loss(&u, ops.a(), x, lbda, false));
    for _ in 0..n_iter {
        let grad = u.matmul(ops.a()).sub(x).matmul(ops.a_t());
        u = prox_tv_rows(&u.sub(&grad.scale(step)), lbda * step);
        loss_history.push(analysis_loss(&u, ops.a(), x, lbda, false));
    }
    SolverTrace { u, loss_history }
}

/// Condat-Vu primal-dual iteration with the safe step sizes
/// `sigma = 0.5`, `tau = 1 / (||A||^2 / 2 + sigma * ||D||^2)`.
pub fn condat_vu_tv(ops: &TvOperators, x: &Mat<f64>, lbda: f64, n_iter: usize) -> SolverTrace {
    let sigma = 0.5;
    let tau = 1.0 / (ops.l_a() / 2.0 + sigma * ops.l_d());
    let (mut v, mut u, _z0) = init_vuz(ops, x, lbda, None);
    let mut loss_history = Vec::with_capacity(n_iter + 1);
    loss_history.push(analysis_loss(&u, ops.a(), x, lbda, false));
    for _ in 0..n_iter {
        let residual = u.matmul(ops.a()).sub(x);
        let u_new = u
            .sub(&residual.matmul(ops.a_t()).scale(tau))
            .sub(&v.matmul(ops.d_t()).scale(tau));
        let v_half = v.add(&u_new.scale(2.0).sub(&u).matmul(ops.d()).scale(sigma));
        // Dual projection onto the lbda-ball.
        v = v_half.map(|e| e.max(-lbda).min(lbda));
        u = u_new;
        loss_history.push(analysis_loss(&u, ops.a(), x, lbda, false));
    }
    SolverTrace { u, loss_history }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn setup() -> (TvOperators, Mat<f64>) {
        let ops = TvOperators::new(Mat::from_rows(vec![
            vec![1.0, 0.4, 0.0, 0.2],
            vec![0.3, 1.0, 0.5, 0.0],
            vec![0.0, 0.2, 1.0, 0.6],
        ]))
        .unwrap();
        let x = Mat::from_rows(vec![
            vec![0.8, -0.3, 0.5, 0.1],
            vec![-0.2, 0.9, 0.4, -0.7],
        ]);
        (ops, x)
    }

    #[test]
    fn prox_gradient_descends_monotonically() {
        let (ops, x) = setup();
        let trace = prox_gradient_tv(&ops, &x, 0.3, 50);
        assert_eq!(trace.loss_history.len(), 51);
        for pair in trace.loss_history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }

    #[test]
    fn the_two_solvers_agree_on_the_minimum() {
        let (ops, x) = setup();
        let pgd = prox_gradient_tv(&ops, &x, 0.3, 2000);
        let cv = condat_vu_tv(&ops, &x, 0.3, 2000);
        let last_pgd = *pgd.loss_history.last().unwrap();
        let last_cv = *cv.loss_history.last().unwrap();
        assert_relative_eq!(last_pgd, last_cv, max_relative = 1e-5);
        for (&a, &b) in pgd.u.data().iter().zip(cv.u.data()) {
            assert_relative_eq!(a, b, epsilon = 1e-3);
        }
    }
}
