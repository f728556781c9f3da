//! Network construction options.
//!
//! [`NetworkConfig`] collects everything a network constructor accepts beyond
//! the forward operator itself. Options a constructor resolves differently
//! per variant (threshold learning, Moreau smoothing, display name) are
//! `Option`s here; `None` means "use that variant's default".

use std::fmt;
use std::str::FromStr;

use crate::error::LpgdError;
use crate::params::ParameterStore;

/// Compute device requested for a network.
///
/// Only [`Device::Cpu`] is backed by an implementation; constructors that
/// receive [`Device::Cuda`] log a warning and fall back to the CPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl FromStr for Device {
    type Err = LpgdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "cpu" {
            Ok(Device::Cpu)
        } else if s.starts_with("cuda") {
            Ok(Device::Cuda)
        } else {
            Err(LpgdError::UnknownDevice(s.to_string()))
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

/// How [`fit`](crate::analysis::AnalysisNetwork::fit) treats the per-layer
/// parameter groups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NetSolverType {
    /// One shared parameter group applied at every layer; a single fit run.
    #[default]
    Recursive,
    /// Independent per-layer groups, all trained jointly in a single run.
    Independent,
    /// Independent per-layer groups trained in stages: layer depth grows
    /// from 1 to `n_layers`, each stage warm-started from the previous one
    /// with an equal share of the iteration budget.
    Progressive,
}

impl FromStr for NetSolverType {
    type Err = LpgdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recursive" => Ok(NetSolverType::Recursive),
            "independent" => Ok(NetSolverType::Independent),
            "progressive" => Ok(NetSolverType::Progressive),
            _ => Err(LpgdError::UnknownNetSolver(s.to_string())),
        }
    }
}

impl fmt::Display for NetSolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetSolverType::Recursive => write!(f, "recursive"),
            NetSolverType::Independent => write!(f, "independent"),
            NetSolverType::Progressive => write!(f, "progressive"),
        }
    }
}

/// How [`lista_tv`](crate::analysis::AnalysisNetwork::lista_tv) handles the
/// parameters of its nested proximal networks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProxLearn {
    /// One proximal network shared by all layers, parameters frozen at their
    /// analytic initialization.
    #[default]
    None,
    /// One shared proximal network whose parameters are trained as an extra
    /// top-level `prox` group.
    Global,
    /// A separate proximal network per layer, its parameters nested inside
    /// that layer's group.
    PerLayer,
}

impl FromStr for ProxLearn {
    type Err = LpgdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ProxLearn::None),
            "global" => Ok(ProxLearn::Global),
            "per-layer" => Ok(ProxLearn::PerLayer),
            _ => Err(LpgdError::UnimplementedProxMode { got: s.to_string() }),
        }
    }
}

impl fmt::Display for ProxLearn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxLearn::None => write!(f, "none"),
            ProxLearn::Global => write!(f, "global"),
            ProxLearn::PerLayer => write!(f, "per-layer"),
        }
    }
}

/// Options shared by all network constructors.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub n_layers: usize,
    /// Learn per-layer thresholds. Default depends on the variant.
    pub learn_th: Option<bool>,
    pub learn_prox: ProxLearn,
    /// Smooth the training loss with the Moreau envelope of the TV term.
    /// Default depends on the variant.
    pub use_moreau: Option<bool>,
    /// Unrolling depth of each nested proximal network.
    pub n_inner_layers: usize,
    /// Total iteration budget for [`fit`](crate::analysis::AnalysisNetwork::fit).
    pub max_iter: usize,
    pub net_solver_type: NetSolverType,
    /// Per-group replacements for the analytic parameter initialization.
    pub initial_parameters: Option<ParameterStore<f64>>,
    /// Display name; `None` picks the variant's default.
    pub name: Option<String>,
    pub verbose: u8,
    pub device: Device,
}

impl NetworkConfig {
    pub fn new(n_layers: usize) -> Self {
        NetworkConfig {
            n_layers,
            learn_th: None,
            learn_prox: ProxLearn::None,
            use_moreau: None,
            n_inner_layers: 500,
            max_iter: 100,
            net_solver_type: NetSolverType::Recursive,
            initial_parameters: None,
            name: None,
            verbose: 0,
            device: Device::Cpu,
        }
    }

    pub fn with_learn_th(mut self, learn_th: bool) -> Self {
        self.learn_th = Some(learn_th);
        self
    }

    pub fn with_learn_prox(mut self, learn_prox: ProxLearn) -> Self {
        self.learn_prox = learn_prox;
        self
    }

    pub fn with_use_moreau(mut self, use_moreau: bool) -> Self {
        self.use_moreau = Some(use_moreau);
        self
    }

    pub fn with_n_inner_layers(mut self, n_inner_layers: usize) -> Self {
        self.n_inner_layers = n_inner_layers;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_net_solver_type(mut self, net_solver_type: NetSolverType) -> Self {
        self.net_solver_type = net_solver_type;
        self
    }

    pub fn with_initial_parameters(mut self, parameters: ParameterStore<f64>) -> Self {
        self.initial_parameters = Some(parameters);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tokens() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!("cuda:0".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!(
            "recursive".parse::<NetSolverType>().unwrap(),
            NetSolverType::Recursive
        );
        assert_eq!(
            "progressive".parse::<NetSolverType>().unwrap(),
            NetSolverType::Progressive
        );
        assert_eq!("per-layer".parse::<ProxLearn>().unwrap(), ProxLearn::PerLayer);
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert!(matches!(
            "tpu".parse::<Device>(),
            Err(LpgdError::UnknownDevice(_))
        ));
        assert!(matches!(
            "greedy".parse::<NetSolverType>(),
            Err(LpgdError::UnknownNetSolver(_))
        ));
        let err = "local".parse::<ProxLearn>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "prox-learning mode 'local' is not implemented; recognized modes: none, global, per-layer"
        );
    }

    #[test]
    fn builder_defaults() {
        let cfg = NetworkConfig::new(4);
        assert_eq!(cfg.n_layers, 4);
        assert_eq!(cfg.learn_th, None);
        assert_eq!(cfg.n_inner_layers, 500);
        assert_eq!(cfg.max_iter, 100);
        assert_eq!(cfg.net_solver_type, NetSolverType::Recursive);
        assert_eq!(cfg.device, Device::Cpu);

        let cfg = cfg.with_learn_th(false).with_max_iter(30).with_name("demo");
        assert_eq!(cfg.learn_th, Some(false));
        assert_eq!(cfg.max_iter, 30);
        assert_eq!(cfg.name.as_deref(), Some("demo"));
    }
}
