//! Training-loop controller for an object-detection model: multi-scale
//! resolution sampling, quartic warmup plus milestone learning-rate decay,
//! gradient accumulation, running metrics, and checkpoint/resume.
//!
//! The network, dataset decoding, and evaluation are external collaborators
//! behind the traits in [`interfaces`] and [`loader`]; this crate only
//! schedules and drives them.

pub mod checkpoint;
pub mod config;
pub mod harness;
pub mod interfaces;
pub mod loader;
pub mod metrics;
pub mod optim;
pub mod scale;
pub mod schedule;
pub mod trainer;

pub use checkpoint::{CheckpointError, CheckpointManager, TrainerState};
pub use config::{ConfigError, Milestones, OptimizerKind, TrainArgs, TrainConfig};
pub use interfaces::{MetricRecord, Model, Optimizer, ParamAccess};
pub use loader::{BatchBuilder, DataSource, PrefetchLoader};
pub use metrics::{MetricAggregator, MetricError};
pub use optim::{build_optimizer, Adam, Sgd};
pub use scale::{Resolution, ScaleConfig, ScalePolicy, ScaleSampler, SharedResolution};
pub use schedule::{warmup_multiplier, MilestoneSchedule, ScheduleState};
pub use trainer::{run_train, TrainSummary, Trainer};
