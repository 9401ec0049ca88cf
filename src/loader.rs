//! Producer/consumer batch pipeline: a fixed pool of worker threads prepares
//! batches ahead of the main loop, each sized at the resolution published in
//! the shared cell at build time.

use crate::scale::{Resolution, SharedResolution};
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;
use std::thread;

/// Builds one batch by index. Implementations are shared across the worker
/// pool, so they hold no per-epoch mutable state.
pub trait BatchBuilder: Send + Sync + 'static {
    type Batch: Send + 'static;

    fn batches_per_epoch(&self) -> usize;

    fn build(&self, batch_index: usize, input_size: Resolution) -> anyhow::Result<Self::Batch>;
}

/// An iterable source of a fixed, known number of batches per epoch,
/// yielded in strict batch order.
pub trait DataSource {
    type Batch;
    type Iter: Iterator<Item = anyhow::Result<Self::Batch>>;

    fn batches_per_epoch(&self) -> usize;

    fn epoch_iter(&self) -> Self::Iter;
}

/// Bounded read-ahead over a `BatchBuilder`.
///
/// Worker `w` of `workers` produces batch indices `w, w + workers, ...`,
/// reading the shared resolution once immediately before building each
/// batch. The consumer round-robins the per-worker channels, so batches
/// arrive in index order regardless of which worker finishes first. A build
/// error travels through the channel and aborts the consuming run; dropping
/// the iterator mid-epoch closes the channels and the workers exit on their
/// next send.
pub struct PrefetchLoader<F: BatchBuilder> {
    builder: Arc<F>,
    shared: SharedResolution,
    workers: usize,
    prefetch: usize,
}

impl<F: BatchBuilder> PrefetchLoader<F> {
    pub fn new(builder: F, shared: SharedResolution, workers: usize, prefetch: usize) -> Self {
        Self {
            builder: Arc::new(builder),
            shared,
            workers: workers.max(1),
            prefetch: prefetch.max(1),
        }
    }
}

pub struct PrefetchIter<B> {
    channels: Vec<Receiver<anyhow::Result<B>>>,
    next_index: usize,
    remaining: usize,
}

impl<F: BatchBuilder> DataSource for PrefetchLoader<F> {
    type Batch = F::Batch;
    type Iter = PrefetchIter<F::Batch>;

    fn batches_per_epoch(&self) -> usize {
        self.builder.batches_per_epoch()
    }

    fn epoch_iter(&self) -> PrefetchIter<F::Batch> {
        let total = self.builder.batches_per_epoch();
        let mut channels = Vec::with_capacity(self.workers);
        for w in 0..self.workers {
            let (tx, rx) = bounded(self.prefetch);
            let builder = self.builder.clone();
            let shared = self.shared.clone();
            let stride = self.workers;
            thread::spawn(move || {
                let mut index = w;
                while index < total {
                    let size = shared.current();
                    let item = builder.build(index, size);
                    if tx.send(item).is_err() {
                        break;
                    }
                    index += stride;
                }
            });
            channels.push(rx);
        }
        PrefetchIter {
            channels,
            next_index: 0,
            remaining: total,
        }
    }
}

impl<B> Iterator for PrefetchIter<B> {
    type Item = anyhow::Result<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let rx = &self.channels[self.next_index % self.channels.len()];
        self.next_index += 1;
        self.remaining -= 1;
        match rx.recv() {
            Ok(item) => Some(item),
            Err(_) => Some(Err(anyhow::anyhow!(
                "batch worker exited before the epoch completed"
            ))),
        }
    }
}
