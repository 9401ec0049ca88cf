//! Running (online) averages of the per-batch metrics the model reports.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("metric schema mismatch: expected {expected:?}, got {got:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },
}

/// Cumulative per-epoch averages over a fixed metric schema.
///
/// The schema (ordered metric names) is bound from the first record folded
/// in the run; every later record must present the same names in the same
/// order. `reset()` clears the averages for a new epoch but keeps the
/// schema, so the log header stays stable across epochs.
#[derive(Debug, Default)]
pub struct MetricAggregator {
    names: Vec<String>,
    running: Vec<f64>,
    folded: usize,
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the schema has been bound yet.
    pub fn is_bound(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.running
    }

    /// Records folded since the last reset.
    pub fn folded(&self) -> usize {
        self.folded
    }

    /// Fold one batch's metrics into the running averages.
    ///
    /// `batch_index` is the zero-based count of batches already folded this
    /// epoch; the update `running = (running * i + v) / (i + 1)` makes the
    /// running value the exact arithmetic mean of everything folded so far.
    pub fn fold(&mut self, batch_index: usize, record: &[(String, f64)]) -> Result<(), MetricError> {
        if self.names.is_empty() {
            self.names = record.iter().map(|(name, _)| name.clone()).collect();
            self.running = vec![0.0; self.names.len()];
        } else {
            let matches = record.len() == self.names.len()
                && record
                    .iter()
                    .zip(&self.names)
                    .all(|((name, _), expected)| name == expected);
            if !matches {
                return Err(MetricError::SchemaMismatch {
                    expected: self.names.clone(),
                    got: record.iter().map(|(name, _)| name.clone()).collect(),
                });
            }
        }
        let i = batch_index as f64;
        for (slot, (_, value)) in self.running.iter_mut().zip(record) {
            *slot = (*slot * i + value) / (i + 1.0);
        }
        self.folded += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<(String, f64)> {
        self.names
            .iter()
            .cloned()
            .zip(self.running.iter().copied())
            .collect()
    }

    /// Clear the averages for a new epoch. Must run at every epoch start;
    /// skipping it blends metrics across epochs.
    pub fn reset(&mut self) {
        self.running.fill(0.0);
        self.folded = 0;
    }
}
