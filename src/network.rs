//! Machinery shared by every unrolled network.
//!
//! [`UnrolledNet`] owns the parameter store and the bookkeeping that does not
//! depend on the iteration being unrolled: which group a layer reads under
//! each solver policy, which groups a fit run trains, output-layer
//! validation, and initial-parameter overrides.

use log::warn;

use crate::config::{Device, NetSolverType, NetworkConfig};
use crate::error::LpgdError;
use crate::params::{validated_override, ParameterStore};

#[derive(Clone, Debug)]
pub(crate) struct UnrolledNet {
    pub(crate) store: ParameterStore<f64>,
    pub(crate) n_layers: usize,
    pub(crate) learn_th: bool,
    pub(crate) max_iter: usize,
    pub(crate) net_solver_type: NetSolverType,
    /// Top-level groups trained in addition to the per-layer ones.
    pub(crate) force_learn_groups: Vec<String>,
    pub(crate) name: String,
    pub(crate) verbose: u8,
    pub(crate) device: Device,
}

impl UnrolledNet {
    /// Base with an empty store; the variant constructor fills the groups in.
    pub(crate) fn new(cfg: &NetworkConfig, learn_th: bool, name: String) -> Self {
        let device = match cfg.device {
            Device::Cuda => {
                warn!("device 'cuda' is not available; falling back to 'cpu'");
                Device::Cpu
            }
            Device::Cpu => Device::Cpu,
        };
        UnrolledNet {
            store: ParameterStore::new(),
            n_layers: cfg.n_layers,
            learn_th,
            max_iter: cfg.max_iter,
            net_solver_type: cfg.net_solver_type,
            force_learn_groups: Vec::new(),
            name,
            verbose: cfg.verbose,
            device,
        }
    }

    /// Group read by layer `layer_id` during the forward pass.
    pub(crate) fn layer_key(&self, layer_id: usize) -> String {
        match self.net_solver_type {
            NetSolverType::Recursive => "layer-0".to_string(),
            _ => format!("layer-{layer_id}"),
        }
    }

    /// All distinct per-layer group names the store holds.
    pub(crate) fn layer_keys(&self) -> Vec<String> {
        match self.net_solver_type {
            NetSolverType::Recursive => vec!["layer-0".to_string()],
            _ => (0..self.n_layers).map(|l| format!("layer-{l}")).collect(),
        }
    }

    /// Resolve a requested output layer, `None` meaning the full depth.
    pub(crate) fn check_output_layer(
        &self,
        output_layer: Option<usize>,
    ) -> Result<usize, LpgdError> {
        let requested = output_layer.unwrap_or(self.n_layers);
        if requested > self.n_layers {
            return Err(LpgdError::InvalidOutputLayer {
                requested,
                n_layers: self.n_layers,
            });
        }
        Ok(requested)
    }

    /// Groups trained when fitting a network truncated at `up_to` layers.
    pub(crate) fn trainable_group_names(&self, up_to: usize) -> Vec<String> {
        let mut names = match self.net_solver_type {
            NetSolverType::Recursive => vec!["layer-0".to_string()],
            _ => (0..up_to).map(|l| format!("layer-{l}")).collect(),
        };
        names.extend(self.force_learn_groups.iter().cloned());
        names
    }

    /// Replace whole parameter groups with caller-supplied values. Each
    /// replacement must match the defaults it displaces tensor for tensor.
    pub(crate) fn apply_initial_parameters(
        &mut self,
        overrides: &ParameterStore<f64>,
    ) -> Result<(), LpgdError> {
        for (group_name, replacement) in overrides.groups() {
            let validated = match self.store.group(group_name) {
                None => {
                    return Err(LpgdError::UnknownParameter {
                        group: group_name.to_string(),
                        name: group_name.to_string(),
                    })
                }
                Some(defaults) => validated_override(group_name, defaults, replacement)?,
            };
            self.store.insert_group(group_name, validated);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterGroup;

    fn base(n_layers: usize, solver: NetSolverType) -> UnrolledNet {
        let cfg = NetworkConfig::new(n_layers).with_net_solver_type(solver);
        UnrolledNet::new(&cfg, true, "test-net".to_string())
    }

    #[test]
    fn recursive_policy_shares_one_group() {
        let net = base(5, NetSolverType::Recursive);
        assert_eq!(net.layer_key(0), "layer-0");
        assert_eq!(net.layer_key(4), "layer-0");
        assert_eq!(net.layer_keys(), vec!["layer-0"]);
        assert_eq!(net.trainable_group_names(3), vec!["layer-0"]);
    }

    #[test]
    fn independent_policy_keys_each_layer() {
        let mut net = base(3, NetSolverType::Independent);
        net.force_learn_groups.push("prox".to_string());
        assert_eq!(net.layer_key(2), "layer-2");
        assert_eq!(
            net.trainable_group_names(2),
            vec!["layer-0", "layer-1", "prox"]
        );
    }

    #[test]
    fn output_layer_defaults_to_full_depth_and_is_bounded() {
        let net = base(4, NetSolverType::Recursive);
        assert_eq!(net.check_output_layer(None).unwrap(), 4);
        assert_eq!(net.check_output_layer(Some(2)).unwrap(), 2);
        assert!(matches!(
            net.check_output_layer(Some(5)),
            Err(LpgdError::InvalidOutputLayer {
                requested: 5,
                n_layers: 4
            })
        ));
    }

    #[test]
    fn overrides_replace_known_groups_only() {
        let mut net = base(1, NetSolverType::Recursive);
        let mut g = ParameterGroup::new();
        g.insert_scalar("threshold", 0.1);
        net.store.insert_group("layer-0", g);

        let mut replacement = ParameterGroup::new();
        replacement.insert_scalar("threshold", 0.7);
        let mut overrides = ParameterStore::new();
        overrides.insert_group("layer-0", replacement);
        net.apply_initial_parameters(&overrides).unwrap();
        assert_eq!(net.store.group("layer-0").unwrap().scalar("threshold"), Some(0.7));

        let mut unknown = ParameterStore::new();
        unknown.insert_group("layer-9", ParameterGroup::new());
        assert!(matches!(
            net.apply_initial_parameters(&unknown),
            Err(LpgdError::UnknownParameter { .. })
        ));
    }
}
