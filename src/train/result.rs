//! Outcomes of optimization runs.

/// Result of a single optimizer run on one flat parameter vector.
#[derive(Clone, Debug)]
pub struct OptimResult {
    /// Final iterate.
    pub theta: Vec<f64>,
    /// Loss at the final iterate.
    pub loss: f64,
    /// Loss before the run and after every accepted step.
    pub loss_history: Vec<f64>,
    /// Accepted steps.
    pub iterations: usize,
    /// Whether a stopping criterion fired before the iteration budget ran
    /// out.
    pub converged: bool,
}

/// Aggregate trace of a [`fit`](crate::analysis::AnalysisNetwork::fit) call,
/// spanning every training stage.
#[derive(Clone, Debug, Default)]
pub struct FitResult {
    pub loss: f64,
    pub loss_history: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl FitResult {
    /// Fold a finished run into the trace.
    pub fn absorb(&mut self, run: &OptimResult) {
        self.loss = run.loss;
        self.loss_history.extend_from_slice(&run.loss_history);
        self.iterations += run.iterations;
        self.converged = run.converged;
    }
}
