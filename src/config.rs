//! CLI surface and the validated, immutable run configuration.

use crate::scale::{Resolution, ScaleConfig, ScalePolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use thiserror::Error;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "train", about = "Multi-scale detector training loop")]
pub struct TrainArgs {
    /// Network input size (width height).
    #[arg(long = "in-size", num_args = 2, value_names = ["WIDTH", "HEIGHT"], default_values_t = [416, 416])]
    pub in_size: Vec<u32>,
    /// Number of classes.
    #[arg(long, default_value_t = 1)]
    pub num_classes: usize,
    /// Resume training from the persisted trainer state.
    #[arg(long)]
    pub resume: bool,
    /// Checkpoint model weights file to load before training.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    /// Dataset path.
    #[arg(long, default_value = "dataset")]
    pub dataset: PathBuf,
    /// Training batch size.
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,
    /// Update weights every this many accumulated batches.
    #[arg(long, default_value_t = 1)]
    pub accumulated_batches: usize,
    /// Scale step for multi-scale training (min max granularity).
    #[arg(long = "scale-step", num_args = 3, value_names = ["MIN", "MAX", "GRANULARITY"], default_values_t = [320, 608, 32])]
    pub scale_step: Vec<u32>,
    /// Optimizer steps between image rescaling events (0 disables).
    #[arg(long, default_value_t = 80)]
    pub rescale_freq: u64,
    /// Draw width and height independently instead of square inputs.
    #[arg(long)]
    pub independent_axes: bool,
    /// Number of total epochs to run.
    #[arg(long, default_value_t = 50)]
    pub epochs: usize,
    /// Warmup iterations.
    #[arg(long, default_value_t = 1000)]
    pub warmup: u64,
    /// Number of data loading workers.
    #[arg(long, default_value_t = 4)]
    pub workers: usize,
    /// Bounded read-ahead per data loading worker.
    #[arg(long, default_value_t = 2)]
    pub prefetch: usize,
    /// Optimization algorithm.
    #[arg(long, value_enum, default_value_t = OptimizerKind::Sgd)]
    pub optim: OptimizerKind,
    /// Initial learning rate.
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,
    /// Milestone epoch indices, strictly increasing (-1 -1 auto-derives).
    #[arg(long, num_args = 1.., allow_negative_numbers = true, default_values_t = [-1, -1])]
    pub milestones: Vec<i64>,
    /// Factor of decrease for the learning rate.
    #[arg(long, default_value_t = 0.1)]
    pub lr_gamma: f64,
    /// SGD momentum.
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,
    /// Weight decay.
    #[arg(long, default_value_t = 5e-4)]
    pub weight_decay: f64,
    /// Filename stem of the trained model.
    #[arg(long, default_value = "yolov3")]
    pub savename: String,
    /// Epoch at which evaluation begins.
    #[arg(long, default_value_t = 10)]
    pub eval_epoch: usize,
    /// Enable sparsity training.
    #[arg(long)]
    pub sparsity: bool,
    /// Sparsity factor.
    #[arg(long, default_value_t = 0.01)]
    pub lamb: f64,
    /// Ask batch builders to preallocate their staging buffers.
    #[arg(long)]
    pub pin: bool,
    /// Workspace path.
    #[arg(long, default_value = "workspace")]
    pub workspace: PathBuf,
    /// Log printing interval in batches.
    #[arg(long, default_value_t = 40)]
    pub print_interval: usize,
    /// Batches per epoch for the synthetic harness dataset.
    #[arg(long, default_value_t = 64)]
    pub batches_per_epoch: usize,
    /// RNG seed for scale sampling and synthetic data.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("in-size must be two positive values, got {0:?}")]
    InvalidInputSize(Vec<u32>),
    #[error("scale-step must be min max granularity with 0 < min <= max and granularity > 0, got {0:?}")]
    InvalidScaleStep(Vec<u32>),
    #[error("milestones must be non-negative and strictly increasing, got {0:?}")]
    InvalidMilestones(Vec<i64>),
    #[error("epochs must be positive")]
    ZeroEpochs,
    #[error("batch size must be positive")]
    ZeroBatchSize,
    #[error("accumulated-batches must be at least 1")]
    ZeroAccumulation,
    #[error("batches-per-epoch must be positive")]
    ZeroBatchesPerEpoch,
    #[error("print-interval must be positive")]
    ZeroPrintInterval,
    #[error("learning rate must be positive, got {0}")]
    InvalidLearningRate(f64),
    #[error("lr-gamma must be in (0, 1], got {0}")]
    InvalidGamma(f64),
}

/// Milestone epoch indices, either supplied explicitly or auto-derived at
/// startup. The `-1` CLI sentinel becomes the `AutoDerived` variant here so
/// nothing downstream ever re-checks for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Milestones {
    Explicit(Vec<usize>),
    AutoDerived,
}

impl Milestones {
    /// Concrete milestone epoch indices for this run.
    ///
    /// Auto-derivation places them at 50% and 75% of the planned optimizer
    /// steps (`epochs * batches_per_epoch`), floored to epoch boundaries;
    /// coincident indices collapse so a decay never applies twice at once.
    pub fn resolve(&self, epochs: usize, batches_per_epoch: usize) -> Vec<usize> {
        match self {
            Self::Explicit(indices) => indices.clone(),
            Self::AutoDerived => {
                let bpe = batches_per_epoch.max(1);
                let total = epochs * bpe;
                let mut derived = vec![(total / 2) / bpe, (total * 3 / 4) / bpe];
                derived.dedup();
                derived
            }
        }
    }
}

/// Immutable snapshot of the hyperparameters for one run. Built from
/// `TrainArgs` with fail-fast validation, before any training state exists.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub input_size: Resolution,
    /// Consumed by the external model collaborator; the harness model has a
    /// fixed shape and ignores it.
    pub num_classes: usize,
    pub resume: bool,
    pub checkpoint: Option<PathBuf>,
    /// Consumed by the external dataset collaborator; the synthetic source
    /// generates its batches instead of reading this path.
    pub dataset: PathBuf,
    pub batch_size: usize,
    pub accumulated_batches: usize,
    pub min_size: u32,
    pub max_size: u32,
    pub granularity: u32,
    pub rescale_freq: u64,
    pub scale_policy: ScalePolicy,
    pub epochs: usize,
    pub warmup: u64,
    pub workers: usize,
    pub prefetch: usize,
    pub optim: OptimizerKind,
    pub lr: f64,
    pub milestones: Milestones,
    pub lr_gamma: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub savename: String,
    pub eval_epoch: usize,
    pub sparsity: bool,
    pub lamb: f64,
    pub pin: bool,
    pub workspace: PathBuf,
    pub print_interval: usize,
    pub batches_per_epoch: usize,
    pub seed: Option<u64>,
}

impl TrainConfig {
    /// Sampler parameters for this run.
    pub fn scale_config(&self) -> ScaleConfig {
        ScaleConfig {
            initial: self.input_size,
            min_size: self.min_size,
            max_size: self.max_size,
            granularity: self.granularity,
            rescale_freq: self.rescale_freq,
            policy: self.scale_policy,
            seed: self.seed,
        }
    }

    pub fn from_args(args: &TrainArgs) -> Result<Self, ConfigError> {
        if args.in_size.len() != 2 || args.in_size.iter().any(|&v| v == 0) {
            return Err(ConfigError::InvalidInputSize(args.in_size.clone()));
        }
        if args.scale_step.len() != 3 {
            return Err(ConfigError::InvalidScaleStep(args.scale_step.clone()));
        }
        let (min_size, max_size, granularity) =
            (args.scale_step[0], args.scale_step[1], args.scale_step[2]);
        if min_size == 0 || min_size > max_size || granularity == 0 {
            return Err(ConfigError::InvalidScaleStep(args.scale_step.clone()));
        }
        if args.epochs == 0 {
            return Err(ConfigError::ZeroEpochs);
        }
        if args.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if args.accumulated_batches == 0 {
            return Err(ConfigError::ZeroAccumulation);
        }
        if args.batches_per_epoch == 0 {
            return Err(ConfigError::ZeroBatchesPerEpoch);
        }
        if args.print_interval == 0 {
            return Err(ConfigError::ZeroPrintInterval);
        }
        if !(args.lr > 0.0) {
            return Err(ConfigError::InvalidLearningRate(args.lr));
        }
        if !(args.lr_gamma > 0.0 && args.lr_gamma <= 1.0) {
            return Err(ConfigError::InvalidGamma(args.lr_gamma));
        }
        let milestones = if args.milestones.contains(&-1) {
            Milestones::AutoDerived
        } else {
            let increasing = args.milestones.windows(2).all(|w| w[0] < w[1]);
            if !increasing || args.milestones.iter().any(|&m| m < 0) {
                return Err(ConfigError::InvalidMilestones(args.milestones.clone()));
            }
            Milestones::Explicit(args.milestones.iter().map(|&m| m as usize).collect())
        };
        Ok(Self {
            input_size: Resolution::new(args.in_size[0], args.in_size[1]),
            num_classes: args.num_classes,
            resume: args.resume,
            checkpoint: args.checkpoint.clone(),
            dataset: args.dataset.clone(),
            batch_size: args.batch_size,
            accumulated_batches: args.accumulated_batches,
            min_size,
            max_size,
            granularity,
            rescale_freq: args.rescale_freq,
            scale_policy: if args.independent_axes {
                ScalePolicy::Independent
            } else {
                ScalePolicy::Square
            },
            epochs: args.epochs,
            warmup: args.warmup,
            workers: args.workers,
            prefetch: args.prefetch,
            optim: args.optim,
            lr: args.lr,
            milestones,
            lr_gamma: args.lr_gamma,
            momentum: args.momentum,
            weight_decay: args.weight_decay,
            savename: args.savename.clone(),
            eval_epoch: args.eval_epoch,
            sparsity: args.sparsity,
            lamb: args.lamb,
            pin: args.pin,
            workspace: args.workspace.clone(),
            print_interval: args.print_interval,
            batches_per_epoch: args.batches_per_epoch,
            seed: args.seed,
        })
    }
}
