//! Learning-rate policy: quartic warmup ramp plus milestone decay whose
//! state survives checkpoint/resume.

use serde::{Deserialize, Serialize};

/// Warmup multiplier on the base learning rate.
///
/// `(step / warmup)^4` below `warmup_steps`, exactly `1.0` at or beyond it.
/// The quartic ramp starts training very conservatively and accelerates
/// smoothly; it is intentionally not a linear ramp.
pub fn warmup_multiplier(global_step: u64, warmup_steps: u64) -> f64 {
    if warmup_steps == 0 || global_step >= warmup_steps {
        return 1.0;
    }
    (global_step as f64 / warmup_steps as f64).powi(4)
}

/// Persisted milestone-decay state. Restored on resume rather than
/// recomputed from the epoch index, so a decay is never applied twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub completed_epochs: usize,
    pub applied: usize,
}

/// Multiplies the base learning rate by `gamma` once for every milestone
/// epoch the run has completed. Ticked once per epoch at epoch end.
#[derive(Debug, Clone)]
pub struct MilestoneSchedule {
    milestones: Vec<usize>,
    gamma: f64,
    completed_epochs: usize,
    applied: usize,
}

impl MilestoneSchedule {
    pub fn new(milestones: Vec<usize>, gamma: f64) -> Self {
        Self {
            milestones,
            gamma,
            completed_epochs: 0,
            applied: 0,
        }
    }

    /// Rebuild from a persisted state bundle.
    pub fn restore(
        milestones: Vec<usize>,
        gamma: f64,
        state: ScheduleState,
    ) -> anyhow::Result<Self> {
        if state.applied > milestones.len() {
            anyhow::bail!(
                "scheduler state applied {} decays but only {} milestones exist",
                state.applied,
                milestones.len()
            );
        }
        Ok(Self {
            milestones,
            gamma,
            completed_epochs: state.completed_epochs,
            applied: state.applied,
        })
    }

    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }

    /// Current decay factor on the base learning rate.
    pub fn factor(&self) -> f64 {
        self.gamma.powi(self.applied as i32)
    }

    /// One epoch tick; applies any milestone the run has now reached.
    pub fn step(&mut self) {
        self.completed_epochs += 1;
        while self.applied < self.milestones.len()
            && self.milestones[self.applied] <= self.completed_epochs
        {
            self.applied += 1;
        }
    }

    pub fn state(&self) -> ScheduleState {
        ScheduleState {
            completed_epochs: self.completed_epochs,
            applied: self.applied,
        }
    }
}
