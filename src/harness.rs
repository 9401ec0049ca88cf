//! Reference collaborators: a deliberately tiny linear model and a
//! deterministic synthetic batch source, enough to drive the full loop
//! without a tensor framework. Not part of the controller contract.

use crate::interfaces::{MetricRecord, Model, ParamAccess};
use crate::loader::BatchBuilder;
use crate::scale::Resolution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const REFERENCE_SIZE: f64 = 608.0;

pub struct SyntheticBatch {
    /// Per-sample features: a random scalar plus the normalized input size.
    pub inputs: Vec<[f64; 3]>,
    pub targets: Vec<f64>,
    pub input_size: Resolution,
}

/// Deterministic regression batches keyed by `(seed, batch_index)`. The
/// normalized resolution is part of the features, so the published size
/// genuinely flows into every batch a worker prepares.
pub struct SyntheticSource {
    batches: usize,
    batch_size: usize,
    seed: u64,
    preallocate: bool,
}

impl SyntheticSource {
    pub fn new(batches: usize, batch_size: usize, seed: u64, preallocate: bool) -> Self {
        Self {
            batches,
            batch_size,
            seed,
            preallocate,
        }
    }
}

impl BatchBuilder for SyntheticSource {
    type Batch = SyntheticBatch;

    fn batches_per_epoch(&self) -> usize {
        self.batches
    }

    fn build(&self, batch_index: usize, input_size: Resolution) -> anyhow::Result<SyntheticBatch> {
        let mut rng =
            StdRng::seed_from_u64(self.seed ^ (batch_index as u64).wrapping_mul(0x9e3779b97f4a7c15));
        let capacity = if self.preallocate { self.batch_size } else { 0 };
        let mut inputs = Vec::with_capacity(capacity);
        let mut targets = Vec::with_capacity(capacity);
        let wn = f64::from(input_size.width) / REFERENCE_SIZE;
        let hn = f64::from(input_size.height) / REFERENCE_SIZE;
        for _ in 0..self.batch_size {
            let x = [rng.random_range(-1.0..1.0), wn, hn];
            let y = 0.7 * x[0] - 0.2 * wn + 0.1 * hn + 0.05;
            inputs.push(x);
            targets.push(y);
        }
        Ok(SyntheticBatch {
            inputs,
            targets,
            input_size,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WeightsFile {
    params: Vec<f64>,
}

/// Linear regressor with analytic MSE gradients over a flat parameter
/// vector `[w0, w1, w2, bias]`. Gradients accumulate across calls until the
/// optimizer clears them, matching the accumulation-window protocol.
pub struct LinearModel {
    params: Vec<f64>,
    grads: Vec<f64>,
}

impl LinearModel {
    pub fn new() -> Self {
        Self {
            params: vec![0.0; 4],
            grads: vec![0.0; 4],
        }
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamAccess for LinearModel {
    fn params_and_grads(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.params, &mut self.grads)
    }
}

impl Model for LinearModel {
    type Batch = SyntheticBatch;

    fn forward_and_loss(
        &mut self,
        batch: &SyntheticBatch,
        _input_size: Resolution,
    ) -> anyhow::Result<(f64, MetricRecord)> {
        anyhow::ensure!(!batch.inputs.is_empty(), "empty batch");
        let n = batch.inputs.len() as f64;
        let mut loss = 0.0;
        let mut abs_err = 0.0;
        for (x, &y) in batch.inputs.iter().zip(&batch.targets) {
            let pred =
                self.params[0] * x[0] + self.params[1] * x[1] + self.params[2] * x[2] + self.params[3];
            let err = pred - y;
            loss += err * err;
            abs_err += err.abs();
            let scale = 2.0 * err / n;
            self.grads[0] += scale * x[0];
            self.grads[1] += scale * x[1];
            self.grads[2] += scale * x[2];
            self.grads[3] += scale;
        }
        loss /= n;
        abs_err /= n;
        Ok((
            loss,
            vec![("loss".to_string(), loss), ("mae".to_string(), abs_err)],
        ))
    }

    fn save_weights(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(&WeightsFile {
            params: self.params.clone(),
        })?;
        fs::write(path, json)?;
        Ok(())
    }

    fn load_weights(&mut self, path: &Path) -> anyhow::Result<()> {
        let file: WeightsFile = serde_json::from_slice(&fs::read(path)?)?;
        anyhow::ensure!(
            file.params.len() == self.params.len(),
            "weights file holds {} parameters, model has {}",
            file.params.len(),
            self.params.len()
        );
        self.params = file.params;
        self.grads.fill(0.0);
        Ok(())
    }
}
