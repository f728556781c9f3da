pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod float;
pub mod init;
pub mod linalg;
pub mod loss;
mod network;
pub mod params;
pub mod prox;
pub mod reference;
pub mod reverse;
pub mod scalar;
pub mod synthesis;
pub mod tape;
pub mod train;
mod traits;

pub use analysis::{AnalysisNetwork, LayerState};
pub use api::{grad, grad_with_value, vjp};
pub use config::{Device, NetSolverType, NetworkConfig, ProxLearn};
pub use error::LpgdError;
pub use float::Float;
pub use init::TvOperators;
pub use linalg::Mat;
pub use params::{ParameterGroup, ParameterStore};
pub use reverse::Reverse;
pub use scalar::Scalar;
pub use synthesis::ListaLASSO;
pub use train::FitResult;

/// Type alias for reverse-mode variables over `f64`.
pub type Reverse64 = Reverse<f64>;
/// Type alias for reverse-mode variables over `f32`.
pub type Reverse32 = Reverse<f32>;
