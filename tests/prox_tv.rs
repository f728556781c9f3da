use approx::assert_relative_eq;
use lpgd::prox::{prox_tv1d, pseudo_soft_threshold, soft_threshold, taut_string};
use lpgd::{grad, Reverse};

/// Check the optimality conditions of `argmin_z 0.5·||z - y||² + t·TV(z)`:
/// with `c_i` the running sum of `z - y`, every `|c_i|` stays within `t`,
/// `c` returns to zero at the end, and `c_i = t·sign(z_{i+1} - z_i)` at
/// every jump.
fn check_kkt(y: &[f64], z: &[f64], t: f64) {
    let n = y.len();
    let mut c = 0.0;
    for i in 0..n {
        c += z[i] - y[i];
        if i == n - 1 {
            assert_relative_eq!(c, 0.0, epsilon = 1e-9);
        } else {
            assert!(c.abs() <= t + 1e-9, "running sum {c} exceeds {t} at {i}");
            let jump = z[i + 1] - z[i];
            if jump.abs() > 1e-9 {
                assert_relative_eq!(c, t * jump.signum(), epsilon = 1e-9);
            }
        }
    }
}

fn next_uniform(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 33) as f64) / (u64::MAX >> 33) as f64 - 0.5
}

#[test]
fn taut_string_satisfies_the_optimality_conditions() {
    let mut state = 7u64;
    for n in [1usize, 2, 3, 7, 20, 51] {
        for t in [0.01, 0.1, 1.0, 10.0] {
            let y: Vec<f64> = (0..n).map(|_| 4.0 * next_uniform(&mut state)).collect();
            let mut z = vec![0.0; n];
            taut_string(&y, t, &mut z);
            check_kkt(&y, &z, t);
        }
    }
}

#[test]
fn zero_threshold_is_the_identity() {
    let y = [0.4, -1.2, 3.3, 3.3, 0.0];
    let mut z = [0.0; 5];
    taut_string(&y, 0.0, &mut z);
    assert_eq!(z, y);
}

#[test]
fn prox_gradients_match_finite_differences() {
    // Differentiate a weighted sum of the prox output with respect to both
    // the signal and the threshold.
    let y = [0.7, -0.2, 0.4, 1.5, 1.1, -0.8];
    let t = 0.3;
    let w = [0.3, -1.0, 0.8, 0.2, -0.4, 0.6];

    let weighted = |z: &[f64]| -> f64 { z.iter().zip(w).map(|(zi, wi)| zi * wi).sum() };
    let eval = |inputs: &[f64]| -> f64 {
        let (row, th) = inputs.split_at(inputs.len() - 1);
        let mut z = vec![0.0; row.len()];
        taut_string(row, th[0], &mut z);
        weighted(&z)
    };

    let mut inputs: Vec<f64> = y.to_vec();
    inputs.push(t);
    let g = grad(
        |vars: &[Reverse<f64>]| {
            let (row, th) = vars.split_at(vars.len() - 1);
            let z = prox_tv1d(row, th[0]);
            let mut acc = Reverse::constant(0.0);
            for (zi, wi) in z.iter().zip(w) {
                acc = acc + *zi * wi;
            }
            acc
        },
        &inputs,
    );

    let eps = 1e-6;
    for k in 0..inputs.len() {
        let mut plus = inputs.clone();
        let mut minus = inputs.clone();
        plus[k] += eps;
        minus[k] -= eps;
        let fd = (eval(&plus) - eval(&minus)) / (2.0 * eps);
        assert_relative_eq!(g[k], fd, epsilon = 1e-6, max_relative = 1e-6);
    }
}

#[test]
fn soft_threshold_gradients_match_finite_differences() {
    // One point on each branch, away from the kinks at |z| = t.
    for (z, t) in [(1.7, 0.4), (-2.0, 0.55), (0.3, 0.8)] {
        let g = grad(
            |vars: &[Reverse<f64>]| soft_threshold(vars[0], vars[1]),
            &[z, t],
        );

        let eps = 1e-6;
        for k in 0..2 {
            let mut plus = [z, t];
            let mut minus = [z, t];
            plus[k] += eps;
            minus[k] -= eps;
            let fd = (soft_threshold(plus[0], plus[1])
                - soft_threshold(minus[0], minus[1]))
                / (2.0 * eps);
            assert_relative_eq!(g[k], fd, epsilon = 1e-9, max_relative = 1e-9);
        }
    }
}

#[test]
fn pseudo_soft_threshold_splits_the_weight() {
    for z in [-2.0, -0.4, 0.0, 0.3, 5.0] {
        assert_relative_eq!(
            pseudo_soft_threshold(z, 0.5, 0.2),
            soft_threshold(z, 0.1),
            epsilon = 1e-15
        );
    }
}

#[test]
fn dual_update_forms_agree() {
    // The subtract-the-shrinkage form used by the unrolled layers reduces
    // to a plain clamp onto the lbda-ball.
    let sigma = 0.5;
    let lbda = 0.7;
    for z in [-3.0f64, -0.7, -0.35, 0.0, 0.2, 0.7, 1.9] {
        let subtract_form = z - sigma * pseudo_soft_threshold(z / sigma, lbda, 1.0 / sigma);
        let clamp_form = z.max(-lbda).min(lbda);
        assert_relative_eq!(subtract_form, clamp_form, epsilon = 1e-15);
    }
}
