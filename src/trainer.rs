//! The training-loop controller: warmup, accumulation windows, metric
//! folding, multi-scale publishing, checkpointing, and resume.

use crate::checkpoint::{CheckpointManager, TrainerState};
use crate::config::{TrainArgs, TrainConfig};
use crate::harness::{LinearModel, SyntheticSource};
use crate::interfaces::{Model, Optimizer};
use crate::loader::{DataSource, PrefetchLoader};
use crate::metrics::MetricAggregator;
use crate::optim::build_optimizer;
use crate::scale::{Resolution, ScaleSampler, SharedResolution};
use crate::schedule::{warmup_multiplier, MilestoneSchedule};
use anyhow::Context;
use tracing::info;

type EvalHook = Box<dyn FnMut(usize) -> anyhow::Result<()>>;

/// Counters reported after a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainSummary {
    pub epochs_run: usize,
    pub optimizer_steps: u64,
    pub global_steps: u64,
    pub resample_events: u64,
}

/// Drives the epoch/batch loop over the external model, optimizer, and data
/// source collaborators. All mutable training state except the shared
/// resolution cell is owned by the calling thread.
pub struct Trainer {
    cfg: TrainConfig,
    sampler: ScaleSampler,
    shared: SharedResolution,
    metrics: MetricAggregator,
    checkpoints: CheckpointManager,
    eval_hook: Option<EvalHook>,
}

impl Trainer {
    pub fn new(cfg: TrainConfig) -> anyhow::Result<Self> {
        let checkpoints = CheckpointManager::new(&cfg.workspace, &cfg.savename)?;
        let shared = SharedResolution::new(cfg.input_size);
        let sampler = ScaleSampler::new(cfg.scale_config());
        Ok(Self {
            cfg,
            sampler,
            shared,
            metrics: MetricAggregator::new(),
            checkpoints,
            eval_hook: None,
        })
    }

    /// Handle to the resolution cell, for wiring the batch loader.
    pub fn shared_resolution(&self) -> SharedResolution {
        self.shared.clone()
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// External evaluation hook, invoked at the end of every epoch once
    /// `epoch >= eval_epoch`. Its contract is owned by the caller.
    pub fn set_eval_hook(&mut self, hook: impl FnMut(usize) -> anyhow::Result<()> + 'static) {
        self.eval_hook = Some(Box::new(hook));
    }

    /// Run the configured number of epochs. Errors from the model or the
    /// data source are not caught here: a corrupted batch or NaN loss is a
    /// configuration defect and aborts the run.
    pub fn run<M, O, D>(
        &mut self,
        model: &mut M,
        optimizer: &mut O,
        source: &D,
    ) -> anyhow::Result<TrainSummary>
    where
        M: Model,
        O: Optimizer<M> + ?Sized,
        D: DataSource<Batch = M::Batch>,
    {
        let batches = source.batches_per_epoch();
        anyhow::ensure!(batches > 0, "data source yields no batches");
        let milestones = self.cfg.milestones.resolve(self.cfg.epochs, batches);

        let (mut schedule, start_epoch) = if self.cfg.resume {
            let state = self
                .checkpoints
                .load_state()
                .context("cannot resume: trainer state unavailable")?;
            optimizer
                .load_state_dict(state.optimizer)
                .context("restore optimizer state")?;
            let schedule =
                MilestoneSchedule::restore(milestones, self.cfg.lr_gamma, state.lr_scheduler)?;
            (schedule, state.epoch + 1)
        } else {
            (MilestoneSchedule::new(milestones, self.cfg.lr_gamma), 0)
        };
        optimizer.set_learning_rate(self.cfg.lr * schedule.factor());

        info!(start_epoch, batches_per_epoch = batches, "start training");

        let mut optimizer_steps = 0u64;
        let mut global_step = (start_epoch * batches) as u64;
        let mut size = self.shared.current();
        // The warmup window never exceeds one epoch.
        let warmup = self.cfg.warmup.min(batches as u64);

        for epoch in start_epoch..self.cfg.epochs {
            self.metrics.reset();
            let mut header_logged = self.metrics.is_bound();
            if header_logged {
                self.log_header();
            }
            optimizer.zero_grad(model);
            let mut iter = source.epoch_iter();
            for batch_index in 0..batches {
                let batch = match iter.next() {
                    Some(item) => item?,
                    None => anyhow::bail!(
                        "data source ended at batch {batch_index} of {batches}"
                    ),
                };

                if epoch == 0 && (batch_index as u64) <= warmup {
                    let lr = self.cfg.lr * warmup_multiplier(batch_index as u64, warmup);
                    optimizer.set_learning_rate(lr);
                }

                let (_loss, record) = model.forward_and_loss(&batch, size)?;
                if self.cfg.sparsity {
                    model.correct_sparsity_gradients(self.cfg.lamb);
                }

                global_step = (epoch * batches + batch_index + 1) as u64;
                let window_full = (batch_index + 1) % self.cfg.accumulated_batches == 0;
                if window_full || batch_index == batches - 1 {
                    optimizer.step(model)?;
                    optimizer.zero_grad(model);
                    optimizer_steps += 1;
                }

                self.metrics.fold(batch_index, &record)?;
                if !header_logged {
                    self.log_header();
                    header_logged = true;
                }
                if batch_index % self.cfg.print_interval == 0 {
                    self.log_progress(epoch, batch_index, batches, size, optimizer.learning_rate());
                }

                // Advances even when no optimizer step fired, so the
                // resolution can change inside a wide accumulation window.
                size = self.sampler.next_resolution(global_step);
                self.shared.publish(size);
            }

            let weights = self.checkpoints.weights_path(epoch);
            model
                .save_weights(&weights)
                .with_context(|| format!("save weights for epoch {epoch}"))?;
            self.checkpoints.save_state(&TrainerState {
                epoch,
                optimizer: optimizer.state_dict(),
                lr_scheduler: schedule.state(),
            })?;
            info!(epoch, weights = %weights.display(), "checkpoint saved");

            if epoch >= self.cfg.eval_epoch {
                if let Some(hook) = self.eval_hook.as_mut() {
                    hook(epoch)?;
                }
            }

            schedule.step();
            optimizer.set_learning_rate(self.cfg.lr * schedule.factor());
        }

        Ok(TrainSummary {
            epochs_run: self.cfg.epochs.saturating_sub(start_epoch),
            optimizer_steps,
            global_steps: global_step,
            resample_events: self.sampler.resample_events(),
        })
    }

    fn log_header(&self) {
        let mut line = format!("{:>8}{:>10}{:>10}", "Epoch", "Batch", "Size");
        for name in self.metrics.names() {
            line.push_str(&format!("{name:>10}"));
        }
        line.push_str(&format!("{:>10}", "LR"));
        info!("{line}");
    }

    fn log_progress(
        &self,
        epoch: usize,
        batch_index: usize,
        batches: usize,
        size: Resolution,
        lr: f64,
    ) {
        let mut line = format!(
            "{:>8}{:>10}{:>10}",
            format!("{}/{}", epoch, self.cfg.epochs),
            format!("{}/{}", batch_index, batches),
            size.to_string(),
        );
        for (_, value) in self.metrics.snapshot() {
            line.push_str(&format!("{value:>10.3}"));
        }
        line.push_str(&format!("{lr:>10.3e}"));
        info!("{line}");
    }
}

/// Wire the reference collaborators and run the configured training loop.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let cfg = TrainConfig::from_args(&args)?;
    info!(
        dataset = %cfg.dataset.display(),
        num_classes = cfg.num_classes,
        "run configuration (synthetic source stands in for the dataset)"
    );
    let mut model = LinearModel::new();
    if let Some(path) = &cfg.checkpoint {
        info!(path = %path.display(), "loading model weights");
        model
            .load_weights(path)
            .with_context(|| format!("load weights from {}", path.display()))?;
    }
    let mut optimizer =
        build_optimizer::<LinearModel>(cfg.optim, cfg.lr, cfg.momentum, cfg.weight_decay);
    let mut trainer = Trainer::new(cfg.clone())?;
    let source = PrefetchLoader::new(
        SyntheticSource::new(
            cfg.batches_per_epoch,
            cfg.batch_size,
            cfg.seed.unwrap_or(0),
            cfg.pin,
        ),
        trainer.shared_resolution(),
        cfg.workers,
        cfg.prefetch,
    );
    let summary = trainer.run(&mut model, optimizer.as_mut(), &source)?;
    info!(
        epochs = summary.epochs_run,
        optimizer_steps = summary.optimizer_steps,
        resample_events = summary.resample_events,
        "training complete"
    );
    Ok(())
}
