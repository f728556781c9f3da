//! Training loss of the analysis formulation.

use crate::linalg::Mat;
use crate::prox::moreau_tv_reg;
use crate::scalar::Scalar;

/// Anisotropic TV penalty: sum of absolute adjacent differences per row.
pub fn tv_penalty<T: Scalar>(u: &Mat<T>) -> T {
    u.diff_rows().map(|d| d.abs()).sum()
}

/// Loss of a primal estimate `u` against observations `x`,
/// `(0.5 * ||u A - x||^2 + lbda * TV(u)) / n_samples`.
///
/// With `use_moreau` the TV term contributes its exact value but
/// differentiates as the gradient of its Moreau envelope, `u - prox(u)`,
/// which smooths training without changing the reported loss.
pub fn analysis_loss<T: Scalar<Float = f64>>(
    u: &Mat<T>,
    a: &Mat<T>,
    x: &Mat<T>,
    lbda: f64,
    use_moreau: bool,
) -> T {
    let n_samples = x.rows();
    let residual = u.matmul(a).sub(x);
    let mut data_fit = T::zero();
    for &r in residual.data() {
        data_fit = data_fit + r * r;
    }
    data_fit = T::from_f(0.5) * data_fit;

    let loss = if use_moreau {
        moreau_tv_reg(data_fit, u, lbda)
    } else {
        data_fit + T::from_f(lbda) * tv_penalty(u)
    };
    loss / T::from_f(n_samples as f64)
}
