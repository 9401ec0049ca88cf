//! Multi-scale input resolution: the sampler that varies it and the shared
//! cell that publishes it to batch-producing workers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Network input size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Single-slot publish cell for the current training resolution.
///
/// The main loop writes at most once per batch; loader workers read once per
/// batch they prepare. Width and height are packed into one `AtomicU64` so a
/// reader can never observe one coordinate updated and the other stale.
#[derive(Debug, Clone)]
pub struct SharedResolution(Arc<AtomicU64>);

impl SharedResolution {
    pub fn new(initial: Resolution) -> Self {
        Self(Arc::new(AtomicU64::new(pack(initial))))
    }

    pub fn publish(&self, size: Resolution) {
        self.0.store(pack(size), Ordering::Release);
    }

    pub fn current(&self) -> Resolution {
        unpack(self.0.load(Ordering::Acquire))
    }
}

fn pack(r: Resolution) -> u64 {
    (u64::from(r.width) << 32) | u64::from(r.height)
}

fn unpack(v: u64) -> Resolution {
    Resolution {
        width: (v >> 32) as u32,
        height: v as u32,
    }
}

/// Whether a resample draws one side length for both axes or each axis on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalePolicy {
    Square,
    Independent,
}

/// Sampler parameters, lifted from the validated run configuration.
#[derive(Debug, Clone, Copy)]
pub struct ScaleConfig {
    pub initial: Resolution,
    pub min_size: u32,
    pub max_size: u32,
    pub granularity: u32,
    pub rescale_freq: u64,
    pub policy: ScalePolicy,
    pub seed: Option<u64>,
}

/// Draws the training input resolution as a function of the global step.
///
/// Between change boundaries the last-sampled resolution is returned
/// unchanged; on an exact multiple of `rescale_freq` a new one is drawn
/// uniformly from `min_size..=max_size` stepped by `granularity`.
/// A `rescale_freq` of zero pins the resolution for the whole run.
#[derive(Debug)]
pub struct ScaleSampler {
    min_size: u32,
    max_size: u32,
    granularity: u32,
    rescale_freq: u64,
    policy: ScalePolicy,
    current: Resolution,
    resamples: u64,
    rng: StdRng,
}

impl ScaleSampler {
    pub fn new(cfg: ScaleConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            min_size: cfg.min_size,
            max_size: cfg.max_size,
            granularity: cfg.granularity,
            rescale_freq: cfg.rescale_freq,
            policy: cfg.policy,
            current: cfg.initial,
            resamples: 0,
            rng,
        }
    }

    pub fn current(&self) -> Resolution {
        self.current
    }

    /// Number of change-boundary resampling events so far.
    pub fn resample_events(&self) -> u64 {
        self.resamples
    }

    pub fn next_resolution(&mut self, global_step: u64) -> Resolution {
        if self.rescale_freq == 0 || global_step % self.rescale_freq != 0 {
            return self.current;
        }
        self.resamples += 1;
        let width = self.draw();
        let height = match self.policy {
            ScalePolicy::Square => width,
            ScalePolicy::Independent => self.draw(),
        };
        self.current = Resolution { width, height };
        self.current
    }

    fn draw(&mut self) -> u32 {
        let choices = (self.max_size - self.min_size) / self.granularity + 1;
        self.min_size + self.rng.random_range(0..choices) * self.granularity
    }
}
