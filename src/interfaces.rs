//! Seams for the external collaborators the training loop drives: the
//! network (opaque), its parameter storage, and the optimizer.

use crate::scale::Resolution;
use std::path::Path;

/// Ordered per-batch metrics as reported by the model.
pub type MetricRecord = Vec<(String, f64)>;

/// The detection network, treated as an opaque collaborator.
///
/// `forward_and_loss` runs the forward pass at the given input size and the
/// backward pass for its loss, leaving gradients *accumulated* in the model
/// (they are only cleared by `Optimizer::zero_grad`). Errors are never
/// retried by the loop; a malformed batch or NaN loss aborts the run.
pub trait Model {
    type Batch;

    fn forward_and_loss(
        &mut self,
        batch: &Self::Batch,
        input_size: Resolution,
    ) -> anyhow::Result<(f64, MetricRecord)>;

    /// Sparsity-regularization gradient correction, applied between backward
    /// and the optimizer step when enabled. No-op by default.
    fn correct_sparsity_gradients(&mut self, _lambda: f64) {}

    /// Snapshot the weights to `path`. Format is owned by the model.
    fn save_weights(&self, path: &Path) -> anyhow::Result<()>;

    fn load_weights(&mut self, path: &Path) -> anyhow::Result<()>;
}

/// Flat views over a model's parameters and their accumulated gradients,
/// the seam the concrete optimizers update through.
pub trait ParamAccess {
    /// Returns `(params, grads)`; both slices have the same length.
    fn params_and_grads(&mut self) -> (&mut [f64], &mut [f64]);
}

/// Applies accumulated gradients to a model and owns the persisted
/// optimizer state. Object safe so the CLI can pick one at runtime.
pub trait Optimizer<M> {
    fn set_learning_rate(&mut self, lr: f64);

    fn learning_rate(&self) -> f64;

    /// Apply the gradients accumulated since the last `zero_grad`.
    fn step(&mut self, model: &mut M) -> anyhow::Result<()>;

    fn zero_grad(&mut self, model: &mut M);

    fn state_dict(&self) -> serde_json::Value;

    fn load_state_dict(&mut self, state: serde_json::Value) -> anyhow::Result<()>;
}
