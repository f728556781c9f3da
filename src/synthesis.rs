//! Unrolled ISTA in the synthesis domain.
//!
//! [`ListaLASSO`] unrolls ISTA on the reparametrized problem
//! `argmin_z 0.5 * ||z L A - x||^2 + lbda * ||z[:, 1:]||_1`, where `L` is the
//! running-sum operator. The first coefficient carries the signal offset and
//! is never penalized. With the dictionary fixed to the identity the running
//! sum of the output approximates TV denoising of `x`, which is how the
//! analysis networks use this net as their learned proximal operator.

use crate::config::NetworkConfig;
use crate::error::LpgdError;
use crate::init::difference_operator;
use crate::linalg::{pinverse, spectral_norm, Mat};
use crate::network::UnrolledNet;
use crate::params::{ParameterGroup, ParameterStore};
use crate::prox::soft_threshold;
use crate::scalar::Scalar;

/// Running-sum operator: upper-triangular ones, so `(z L)[i, j]` is the sum
/// of `z[i, ..=j]`.
pub fn integration_operator(n_atoms: usize) -> Mat<f64> {
    Mat::from_fn(n_atoms, n_atoms, |i, j| if i <= j { 1.0 } else { 0.0 })
}

/// Unrolled ISTA network for the synthesis-form LASSO.
#[derive(Clone, Debug)]
pub struct ListaLASSO {
    pub(crate) base: UnrolledNet,
    a: Mat<f64>,
    inv_a: Mat<f64>,
    d: Mat<f64>,
    l_b: f64,
}

impl ListaLASSO {
    /// Build the network for a dictionary `a` of shape `(n_atoms, n_dim)`.
    ///
    /// Every layer starts at the analytic ISTA step for the integrated
    /// dictionary `B = L A`: `Wz = I - B B^T / ||B||^2`, `Wx = B^T / ||B||^2`
    /// and a threshold of `1 / ||B||^2` (present only when thresholds are
    /// learned; the forward pass falls back to the same constant otherwise).
    pub fn new(a: Mat<f64>, cfg: &NetworkConfig) -> Result<Self, LpgdError> {
        let n_atoms = a.rows();
        let learn_th = cfg.learn_th.unwrap_or(true);
        let name = cfg.name.clone().unwrap_or_else(|| "LISTA".to_string());
        let mut base = UnrolledNet::new(cfg, learn_th, name);

        let inv_a = pinverse(&a)?;
        let d = difference_operator(n_atoms);
        let b = integration_operator(n_atoms).matmul(&a);
        let norm_b = spectral_norm(&b);
        let l_b = norm_b * norm_b;

        let wz = Mat::eye(n_atoms).sub(&b.matmul(&b.t()).scale(1.0 / l_b));
        let wx = b.t().scale(1.0 / l_b);
        for key in base.layer_keys() {
            let mut group = ParameterGroup::new();
            group.insert("Wz", wz.clone());
            group.insert("Wx", wx.clone());
            if learn_th {
                group.insert_scalar("threshold", 1.0 / l_b);
            }
            base.store.insert_group(key, group);
        }
        if let Some(overrides) = &cfg.initial_parameters {
            base.apply_initial_parameters(overrides)?;
        }

        Ok(ListaLASSO {
            base,
            a,
            inv_a,
            d,
            l_b,
        })
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn n_layers(&self) -> usize {
        self.base.n_layers
    }

    pub fn parameters(&self) -> &ParameterStore<f64> {
        &self.base.store
    }

    /// Forward pass with an externally supplied parameter store, so the
    /// coefficients can carry derivatives when this net is nested inside a
    /// differentiable outer iteration.
    pub fn forward_in<T: Scalar<Float = f64>>(
        &self,
        params: &ParameterStore<T>,
        x: &Mat<T>,
        lbda: T,
        output_layer: Option<usize>,
    ) -> Result<Mat<T>, LpgdError> {
        let depth = self.base.check_output_layer(output_layer)?;
        if x.cols() != self.a.cols() {
            return Err(LpgdError::FeatureMismatch {
                expected: self.a.cols(),
                got: x.cols(),
            });
        }
        let n_samples = x.rows();
        let n_atoms = self.a.rows();

        // Seed with the least-squares fit, re-expressed as increments.
        let u0 = x.matmul(&self.inv_a.lift::<T>());
        let du = u0.matmul(&self.d.lift::<T>());
        let mut z = Mat::from_fn(n_samples, n_atoms, |i, j| {
            if j == 0 {
                u0.get(i, 0)
            } else {
                du.get(i, j - 1)
            }
        });

        let fallback_th = T::from_f(1.0 / self.l_b);
        for layer_id in 0..depth {
            let key = self.base.layer_key(layer_id);
            let group = params.group(&key).expect("layer parameters are present");
            let wz = group.tensor("Wz").expect("layer parameters are present");
            let wx = group.tensor("Wx").expect("layer parameters are present");
            let threshold = lbda * group.scalar("threshold").unwrap_or(fallback_th);

            let y = z.matmul(wz).add(&x.matmul(wx));
            z = Mat::from_fn(n_samples, n_atoms, |i, j| {
                if j == 0 {
                    y.get(i, 0)
                } else {
                    soft_threshold(y.get(i, j), threshold)
                }
            });
        }
        Ok(z)
    }

    /// Forward pass with the network's own parameters.
    pub fn forward(
        &self,
        x: &Mat<f64>,
        lbda: f64,
        output_layer: Option<usize>,
    ) -> Result<Mat<f64>, LpgdError> {
        self.forward_in(&self.base.store, x, lbda, output_layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn integration_operator_is_a_running_sum() {
        let l = integration_operator(4);
        let z = Mat::from_rows(vec![vec![1.0, 2.0, -1.0, 3.0]]);
        assert_eq!(z.matmul(&l).data(), &[1.0, 3.0, 2.0, 5.0]);
    }

    #[test]
    fn analytic_initialization() {
        let net = ListaLASSO::new(Mat::eye(3), &NetworkConfig::new(4)).unwrap();
        assert_eq!(net.name(), "LISTA");
        // Recursive policy: one shared group.
        assert_eq!(net.parameters().len(), 1);
        let group = net.parameters().group("layer-0").unwrap();
        assert_eq!(group.tensor("Wz").unwrap().shape(), (3, 3));
        assert_eq!(group.tensor("Wx").unwrap().shape(), (3, 3));
        let b = integration_operator(3);
        let l_b = spectral_norm(&b).powi(2);
        assert_relative_eq!(group.scalar("threshold").unwrap(), 1.0 / l_b, epsilon = 1e-10);

        let frozen = ListaLASSO::new(
            Mat::eye(3),
            &NetworkConfig::new(4).with_learn_th(false),
        )
        .unwrap();
        assert!(frozen
            .parameters()
            .group("layer-0")
            .unwrap()
            .scalar("threshold")
            .is_none());
    }

    #[test]
    fn zero_layers_integrate_back_to_the_input() {
        let net = ListaLASSO::new(Mat::eye(4), &NetworkConfig::new(3)).unwrap();
        let x = Mat::from_rows(vec![vec![0.3, -1.0, 2.5, 2.5]]);
        let z = net.forward(&x, 0.7, Some(0)).unwrap();
        let back = z.cumsum_rows();
        for (&got, &want) in back.data().iter().zip(x.data()) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn one_layer_matches_a_hand_rolled_ista_step() {
        let net = ListaLASSO::new(Mat::eye(3), &NetworkConfig::new(1)).unwrap();
        let x = Mat::from_rows(vec![vec![1.0, -0.5, 0.25]]);
        let lbda = 0.2;
        let z = net.forward(&x, lbda, None).unwrap();

        let b = integration_operator(3);
        let l_b = spectral_norm(&b).powi(2);
        let z0 = Mat::from_rows(vec![vec![1.0, -1.5, 0.75]]);
        let y = z0
            .matmul(&Mat::eye(3).sub(&b.matmul(&b.t()).scale(1.0 / l_b)))
            .add(&x.matmul(&b.t().scale(1.0 / l_b)));
        for j in 0..3 {
            let expected = if j == 0 {
                y.get(0, 0)
            } else {
                soft_threshold(y.get(0, j), lbda / l_b)
            };
            assert_relative_eq!(z.get(0, j), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn rejects_feature_mismatch() {
        let net = ListaLASSO::new(Mat::eye(3), &NetworkConfig::new(1)).unwrap();
        let x = Mat::zeros(1, 4);
        assert!(matches!(
            net.forward(&x, 0.1, None),
            Err(LpgdError::FeatureMismatch {
                expected: 3,
                got: 4
            })
        ));
    }
}
