use thiserror::Error;

/// Errors surfaced by network construction, initialization, and forward
/// evaluation.
///
/// Construction failures leave no usable network behind; forward-time
/// failures are raised before any layer runs.
#[derive(Debug, Error)]
pub enum LpgdError {
    /// `learn_prox` was set to a mode outside the recognized set.
    #[error("prox-learning mode '{got}' is not implemented; recognized modes: none, global, per-layer")]
    UnimplementedProxMode { got: String },

    /// `output_layer` exceeded the constructed depth of the network.
    #[error("output_layer={requested} is out of range for a network with {n_layers} layers")]
    InvalidOutputLayer { requested: usize, n_layers: usize },

    /// The primal initializer was given neither precomputed `(inv_a, psi)`
    /// operators nor raw `(a, d)` matrices to derive them from.
    #[error("if inv_a and psi are not given, a and d must be supplied")]
    MissingOperators,

    /// A device string that is neither `cpu` nor `cuda`.
    #[error("unknown device '{0}'; expected 'cpu' or 'cuda'")]
    UnknownDevice(String),

    /// A net-solver policy string outside the recognized set.
    #[error("unknown net solver '{0}'; recognized policies: recursive, independent, progressive")]
    UnknownNetSolver(String),

    /// Pseudo-inverse of a rank-deficient mixing operator.
    #[error("matrix of shape {rows}x{cols} is rank deficient, pseudo-inverse is unavailable")]
    RankDeficient { rows: usize, cols: usize },

    /// An initial-parameter override whose shape disagrees with the layer
    /// parameter it replaces.
    #[error("parameter '{name}' has shape {got_rows}x{got_cols}, expected {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        name: String,
        expected_rows: usize,
        expected_cols: usize,
        got_rows: usize,
        got_cols: usize,
    },

    /// An initial-parameter override naming a parameter the layer does not
    /// define, or missing one it does.
    #[error("initial parameters for group '{group}' must define exactly the layer's parameters; offending entry: '{name}'")]
    UnknownParameter { group: String, name: String },

    /// Observation batch whose feature dimension disagrees with `A`.
    #[error("observations have {got} features but the mixing operator maps to {expected}")]
    FeatureMismatch { expected: usize, got: usize },
}
