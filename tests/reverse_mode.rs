use approx::assert_relative_eq;
use lpgd::tape::{Recording, Tape, UNRECORDED};
use lpgd::{grad, vjp, Reverse, Scalar};
use num_traits::Float;

/// Run a single-variable reverse-mode differentiation.
fn reverse_grad(f: impl FnOnce(Reverse<f64>) -> Reverse<f64>, x_val: f64) -> f64 {
    let mut tape = Tape::new();
    let x = Reverse::recorded(x_val, tape.variable());
    let _rec = Recording::new(&mut tape);
    let y = f(x);
    tape.reverse(y.slot())[0]
}

/// Central finite difference for comparison.
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-7;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

fn check_elemental(
    f_rev: impl FnOnce(Reverse<f64>) -> Reverse<f64>,
    f_f64: impl Fn(f64) -> f64,
    x: f64,
) {
    let g = reverse_grad(f_rev, x);
    let expected = finite_diff(&f_f64, x);
    assert_relative_eq!(g, expected, max_relative = 1e-5);
}

// ── Arithmetic ──

#[test]
fn x_squared() {
    assert_relative_eq!(reverse_grad(|x| x * x, 3.0), 6.0, max_relative = 1e-12);
}

#[test]
fn x_times_y() {
    let mut tape: Tape<f64> = Tape::new();
    let x = Reverse::recorded(3.0, tape.variable());
    let y = Reverse::recorded(4.0, tape.variable());
    let _rec = Recording::new(&mut tape);
    let z = x * y;
    let adjoints = tape.reverse(z.slot());
    assert_relative_eq!(adjoints[0], 4.0, max_relative = 1e-12); // dz/dx = y
    assert_relative_eq!(adjoints[1], 3.0, max_relative = 1e-12); // dz/dy = x
}

#[test]
fn diamond_pattern() {
    // z = x² + x³, dz/dx = 2x + 3x²
    let g = reverse_grad(|x| x * x + x * x * x, 2.0);
    assert_relative_eq!(g, 4.0 + 12.0, max_relative = 1e-12);
}

#[test]
fn fan_out() {
    let g = reverse_grad(|x| x + x + x, 5.0);
    assert_relative_eq!(g, 3.0, max_relative = 1e-12);
}

#[test]
fn constants_do_not_accumulate_adjoints() {
    let g = reverse_grad(|x| 3.0 * x + Reverse::constant(5.0), 2.0);
    assert_relative_eq!(g, 3.0, max_relative = 1e-12);
}

// ── Elementals the networks lean on ──

#[test]
fn smooth_elementals() {
    check_elemental(|x| x.sqrt(), |x| x.sqrt(), 4.0);
    check_elemental(|x| x.exp(), |x| x.exp(), 1.0);
    check_elemental(|x| x.ln(), |x| x.ln(), 2.0);
    check_elemental(|x| x.recip(), |x| x.recip(), 2.5);
    check_elemental(|x| x.powi(3), |x| x.powi(3), 2.0);
    check_elemental(|x| x.tanh(), |x| x.tanh(), 1.0);
}

#[test]
fn abs_propagates_the_sign() {
    assert_relative_eq!(reverse_grad(|x| x.abs(), 3.0), 1.0, max_relative = 1e-12);
    assert_relative_eq!(reverse_grad(|x| x.abs(), -3.0), -1.0, max_relative = 1e-12);
}

#[test]
fn max_and_min_propagate_the_winning_branch() {
    // x wins the max, loses the min.
    let g = reverse_grad(|x| x.max(Reverse::constant(1.0)), 2.0);
    assert_relative_eq!(g, 1.0, max_relative = 1e-12);
    let g = reverse_grad(|x| x.min(Reverse::constant(1.0)), 2.0);
    assert_relative_eq!(g, 0.0, epsilon = 1e-15);
    // Clamping below the upper bound is the identity.
    let g = reverse_grad(
        |x| x.max(Reverse::constant(0.5)).min(Reverse::constant(2.0)),
        0.9,
    );
    assert_relative_eq!(g, 1.0, max_relative = 1e-12);
}

#[test]
fn signum_is_locally_constant() {
    let g = reverse_grad(|x| x.signum() * x, 3.0);
    // d(sign(x)·x)/dx away from 0 is sign(x).
    assert_relative_eq!(g, 1.0, max_relative = 1e-12);
}

// ── Custom operations ──

#[test]
fn custom_op_records_every_partial() {
    let mut tape: Tape<f64> = Tape::new();
    let x = Reverse::recorded(3.0, tape.variable());
    let y = Reverse::recorded(4.0, tape.variable());
    let _rec = Recording::new(&mut tape);
    // Register x·y as one opaque node with hand-written partials.
    let z = Reverse::custom_op(x.value() * y.value(), &[(x, y.value()), (y, x.value())]);
    assert_relative_eq!(z.value(), 12.0);
    let adjoints = tape.reverse(z.slot());
    assert_relative_eq!(adjoints[0], 4.0, max_relative = 1e-12);
    assert_relative_eq!(adjoints[1], 3.0, max_relative = 1e-12);
}

#[test]
fn custom_op_over_constants_is_a_constant() {
    let mut tape: Tape<f64> = Tape::new();
    let _rec = Recording::new(&mut tape);
    let c = Reverse::constant(2.0);
    let z = Reverse::custom_op(5.0, &[(c, 1.0)]);
    assert_eq!(z.slot(), UNRECORDED);
    assert_relative_eq!(z.value(), 5.0);
}

#[test]
fn custom_op_mixes_with_recorded_arithmetic() {
    // g(x) = x² through the tape, h = custom node with partial 3 on g,
    // so dh/dx = 3 · 2x.
    let g = reverse_grad(
        |x| {
            let sq = x * x;
            Reverse::custom_op(3.0 * sq.value(), &[(sq, 3.0)])
        },
        2.0,
    );
    assert_relative_eq!(g, 12.0, max_relative = 1e-12);
}

// ── Driver functions ──

#[test]
fn grad_of_a_two_variable_function() {
    let g = grad(|x: &[Reverse<f64>]| x[0] * x[0] * x[1] + x[1], &[3.0, 4.0]);
    assert_relative_eq!(g[0], 24.0, max_relative = 1e-12);
    assert_relative_eq!(g[1], 10.0, max_relative = 1e-12);
}

#[test]
fn grad_with_value_reports_the_loss_it_differentiated() {
    let (value, g) = lpgd::grad_with_value(|x: &[Reverse<f64>]| x[0] * x[0], &[3.0]);
    assert_relative_eq!(value, 9.0);
    assert_relative_eq!(g[0], 6.0, max_relative = 1e-12);
}

#[test]
fn grad_of_a_constant_output_is_zero() {
    let (value, g) =
        lpgd::grad_with_value(|_: &[Reverse<f64>]| Reverse::constant(7.0), &[1.0, 2.0]);
    assert_relative_eq!(value, 7.0);
    assert_eq!(g, vec![0.0, 0.0]);
}

#[test]
fn vjp_weights_the_outputs() {
    let (values, pullback) = vjp(
        |x: &[Reverse<f64>]| vec![x[0] + x[1], x[0] * x[1]],
        &[2.0, 5.0],
        &[1.0, 10.0],
    );
    assert_relative_eq!(values[0], 7.0);
    assert_relative_eq!(values[1], 10.0);
    // wᵀJ = [1·1 + 10·5, 1·1 + 10·2]
    assert_relative_eq!(pullback[0], 51.0, max_relative = 1e-12);
    assert_relative_eq!(pullback[1], 21.0, max_relative = 1e-12);
}
