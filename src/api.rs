//! Entry points that record a closure and run the reverse sweep.

use crate::float::Float;
use crate::reverse::Reverse;
use crate::tape::{ActiveTape, Recording, Tape, UNRECORDED};

/// Run `f` over tracked inputs, recording onto a fresh tape.
///
/// The inputs occupy the first `x.len()` slots, so their adjoints sit at
/// the front of the sweep result.
fn trace<F: ActiveTape, R>(x: &[F], f: impl FnOnce(&[Reverse<F>]) -> R) -> (Tape<F>, R) {
    let mut tape = Tape::with_capacity(x.len() * 16);
    let inputs: Vec<Reverse<F>> = x
        .iter()
        .map(|&value| Reverse::recorded(value, tape.variable()))
        .collect();

    let rec = Recording::new(&mut tape);
    let out = f(&inputs);
    drop(rec);

    (tape, out)
}

/// Evaluate `f : R^n → R` at `x` and return the value together with the
/// gradient. An output that never touched the inputs has a zero gradient.
pub fn grad_with_value<F: Float + ActiveTape>(
    f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>,
    x: &[F],
) -> (F, Vec<F>) {
    let (tape, out) = trace(x, f);
    if out.slot() == UNRECORDED {
        return (out.value, vec![F::zero(); x.len()]);
    }
    let adjoints = tape.reverse(out.slot());
    (out.value, adjoints[..x.len()].to_vec())
}

/// Gradient of a scalar function `f : R^n → R`, reverse mode.
///
/// ```
/// let g = lpgd::grad(|v: &[lpgd::Reverse<f64>]| v[0] * v[1] + v[1], &[2.0, 5.0]);
/// assert!((g[0] - 5.0).abs() < 1e-12);
/// assert!((g[1] - 3.0).abs() < 1e-12);
/// ```
pub fn grad<F: Float + ActiveTape>(
    f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>,
    x: &[F],
) -> Vec<F> {
    grad_with_value(f, x).1
}

/// Vector-Jacobian product: `(f(x), wᵀ·J)` for `f : R^n → R^m`.
pub fn vjp<F: Float + ActiveTape>(
    f: impl FnOnce(&[Reverse<F>]) -> Vec<Reverse<F>>,
    x: &[F],
    w: &[F],
) -> (Vec<F>, Vec<F>) {
    let (tape, outputs) = trace(x, f);
    assert_eq!(outputs.len(), w.len(), "one weight per output");

    let values: Vec<F> = outputs.iter().map(|out| out.value).collect();
    let seeds: Vec<(u32, F)> = outputs
        .iter()
        .zip(w)
        .filter(|(out, _)| out.slot() != UNRECORDED)
        .map(|(out, &wi)| (out.slot(), wi))
        .collect();
    let adjoints = tape.reverse_seeded(&seeds);

    (values, adjoints[..x.len()].to_vec())
}
