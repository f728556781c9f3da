//! Forward-operator bundle and the shared state initialization.
//!
//! Every network variant starts from the same triplet `(v0, u0, z0)`: a dual
//! point `v0` (zeros unless the caller provides one), the primal estimate
//! `u0` obtained by mapping `v0` back through the pseudo-inverse of the
//! forward operator, and the synthesis coefficients `z0` whose running sum
//! reproduces `u0`.

use crate::error::LpgdError;
use crate::linalg::{pinverse, spectral_norm, Mat};

/// First-order finite-difference operator, shape `(n_atoms, n_atoms - 1)`.
///
/// Right-multiplying a batch of signals by it yields adjacent differences:
/// `(u * D)[i, j] = u[i, j + 1] - u[i, j]`.
pub fn difference_operator(n_atoms: usize) -> Mat<f64> {
    Mat::from_fn(n_atoms, n_atoms.saturating_sub(1), |i, j| {
        if i == j {
            -1.0
        } else if i == j + 1 {
            1.0
        } else {
            0.0
        }
    })
}

/// Forward operator `A` together with everything derived from it that the
/// networks need: the difference operator `D`, transposes, the
/// pseudo-inverse `A^+`, `Psi = A^+ * D`, and the squared spectral norms of
/// `A` and `D`.
#[derive(Clone, Debug)]
pub struct TvOperators {
    a: Mat<f64>,
    a_t: Mat<f64>,
    d: Mat<f64>,
    d_t: Mat<f64>,
    inv_a: Mat<f64>,
    psi: Mat<f64>,
    l_a: f64,
    l_d: f64,
}

impl TvOperators {
    /// Derive all operators from `a`, shape `(n_atoms, n_dim)`.
    pub fn new(a: Mat<f64>) -> Result<Self, LpgdError> {
        let inv_a = pinverse(&a)?;
        let d = difference_operator(a.rows());
        let psi = inv_a.matmul(&d);
        let norm_a = spectral_norm(&a);
        let norm_d = spectral_norm(&d);
        Ok(TvOperators {
            a_t: a.t(),
            d_t: d.t(),
            inv_a,
            psi,
            l_a: norm_a * norm_a,
            l_d: norm_d * norm_d,
            a,
            d,
        })
    }

    pub fn a(&self) -> &Mat<f64> {
        &self.a
    }

    pub fn a_t(&self) -> &Mat<f64> {
        &self.a_t
    }

    pub fn d(&self) -> &Mat<f64> {
        &self.d
    }

    pub fn d_t(&self) -> &Mat<f64> {
        &self.d_t
    }

    pub fn inv_a(&self) -> &Mat<f64> {
        &self.inv_a
    }

    pub fn psi(&self) -> &Mat<f64> {
        &self.psi
    }

    /// Squared spectral norm of `A`.
    pub fn l_a(&self) -> f64 {
        self.l_a
    }

    /// Squared spectral norm of `D`.
    pub fn l_d(&self) -> f64 {
        self.l_d
    }

    pub fn n_atoms(&self) -> usize {
        self.a.rows()
    }

    pub fn n_dim(&self) -> usize {
        self.a.cols()
    }
}

/// `u = (x - lbda * v * Psi^T) * A^+` with precomputed operators.
pub fn v_to_u_with(v: &Mat<f64>, x: &Mat<f64>, lbda: f64, inv_a: &Mat<f64>, psi: &Mat<f64>) -> Mat<f64> {
    x.sub(&v.matmul(&psi.t()).scale(lbda)).matmul(inv_a)
}

/// Map a dual point to its primal estimate.
///
/// Uses the `(inv_a, psi)` pair when both are given; otherwise derives them
/// from `(a, d)`. With neither pair available this is
/// [`LpgdError::MissingOperators`].
pub fn v_to_u(
    v: &Mat<f64>,
    x: &Mat<f64>,
    lbda: f64,
    a: Option<&Mat<f64>>,
    d: Option<&Mat<f64>>,
    inv_a: Option<&Mat<f64>>,
    psi: Option<&Mat<f64>>,
) -> Result<Mat<f64>, LpgdError> {
    if let (Some(inv_a), Some(psi)) = (inv_a, psi) {
        return Ok(v_to_u_with(v, x, lbda, inv_a, psi));
    }
    match (a, d) {
        (Some(a), Some(d)) => {
            let inv_a = pinverse(a)?;
            let psi = inv_a.matmul(d);
            Ok(v_to_u_with(v, x, lbda, &inv_a, &psi))
        }
        _ => Err(LpgdError::MissingOperators),
    }
}

/// Initial `(v0, u0, z0)` for a batch of observations.
///
/// `v0` defaults to zeros. `z0` stacks the first primal coefficient with the
/// adjacent differences of `u0`, so the running sum of `z0` recovers `u0`.
pub fn init_vuz(
    ops: &TvOperators,
    x: &Mat<f64>,
    lbda: f64,
    v0: Option<&Mat<f64>>,
) -> (Mat<f64>, Mat<f64>, Mat<f64>) {
    let n_samples = x.rows();
    let n_atoms = ops.n_atoms();
    let v0 = match v0 {
        Some(v0) => v0.clone(),
        None => Mat::zeros(n_samples, n_atoms.saturating_sub(1)),
    };
    let u0 = v_to_u_with(&v0, x, lbda, &ops.inv_a, &ops.psi);
    let du = u0.matmul(&ops.d);
    let z0 = Mat::from_fn(n_samples, n_atoms, |i, j| {
        if j == 0 {
            u0.get(i, 0)
        } else {
            du.get(i, j - 1)
        }
    });
    (v0, u0, z0)
}
