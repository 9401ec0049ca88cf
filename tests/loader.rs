use std::thread;
use std::time::Duration;
use trainloop::harness::SyntheticSource;
use trainloop::loader::{BatchBuilder, DataSource, PrefetchLoader};
use trainloop::scale::{Resolution, SharedResolution};

struct IndexBuilder {
    total: usize,
    fail_at: Option<usize>,
}

impl BatchBuilder for IndexBuilder {
    type Batch = usize;

    fn batches_per_epoch(&self) -> usize {
        self.total
    }

    fn build(&self, batch_index: usize, _input_size: Resolution) -> anyhow::Result<usize> {
        // Stagger completion so later indices often finish first.
        thread::sleep(Duration::from_millis((batch_index % 3) as u64));
        match self.fail_at {
            Some(fail) if fail == batch_index => anyhow::bail!("decode failed at {batch_index}"),
            _ => Ok(batch_index),
        }
    }
}

fn shared() -> SharedResolution {
    SharedResolution::new(Resolution::square(416))
}

#[test]
fn batches_arrive_in_index_order_across_workers() {
    let loader = PrefetchLoader::new(
        IndexBuilder {
            total: 24,
            fail_at: None,
        },
        shared(),
        4,
        2,
    );
    for _ in 0..3 {
        let got: Vec<usize> = loader
            .epoch_iter()
            .collect::<anyhow::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(got, (0..24).collect::<Vec<_>>());
    }
}

#[test]
fn build_errors_surface_at_their_batch_position() {
    let loader = PrefetchLoader::new(
        IndexBuilder {
            total: 10,
            fail_at: Some(6),
        },
        shared(),
        3,
        1,
    );
    let mut iter = loader.epoch_iter();
    for expected in 0..6 {
        assert_eq!(iter.next().unwrap().unwrap(), expected);
    }
    let err = iter.next().unwrap().unwrap_err();
    assert!(err.to_string().contains("decode failed at 6"));
}

#[test]
fn dropping_the_iterator_midway_is_clean() {
    let loader = PrefetchLoader::new(
        IndexBuilder {
            total: 100,
            fail_at: None,
        },
        shared(),
        4,
        2,
    );
    let mut iter = loader.epoch_iter();
    assert_eq!(iter.next().unwrap().unwrap(), 0);
    drop(iter);
    // A fresh epoch still yields the full ordered sequence.
    let got: Vec<usize> = loader
        .epoch_iter()
        .collect::<anyhow::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(got.len(), 100);
    assert_eq!(got[99], 99);
}

#[test]
fn workers_pick_up_the_published_resolution() {
    let cell = shared();
    let loader = PrefetchLoader::new(SyntheticSource::new(4, 2, 7, false), cell.clone(), 1, 1);

    // Published before the epoch starts, so every worker build sees it.
    cell.publish(Resolution::square(320));
    let batches: Vec<_> = loader
        .epoch_iter()
        .collect::<anyhow::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(batches.last().unwrap().input_size, Resolution::square(320));
}

#[test]
fn mid_epoch_publish_reaches_later_batches() {
    let cell = shared();
    let loader = PrefetchLoader::new(SyntheticSource::new(10, 2, 7, false), cell.clone(), 1, 1);

    let mut iter = loader.epoch_iter();
    for _ in 0..3 {
        iter.next().unwrap().unwrap();
    }
    cell.publish(Resolution::square(608));
    let rest: Vec<_> = iter.collect::<anyhow::Result<Vec<_>>>().unwrap();

    // Single worker, read-ahead 1: at most two batches were already built
    // when the publish landed, so everything after them sees the new size.
    assert_eq!(rest.len(), 7);
    for batch in &rest[2..] {
        assert_eq!(batch.input_size, Resolution::square(608));
    }
}

#[test]
fn synthetic_batches_are_deterministic_per_index() {
    let source = SyntheticSource::new(4, 8, 42, true);
    let a = source.build(2, Resolution::square(416)).unwrap();
    let b = source.build(2, Resolution::square(416)).unwrap();
    assert_eq!(a.inputs, b.inputs);
    assert_eq!(a.targets, b.targets);

    let other = source.build(3, Resolution::square(416)).unwrap();
    assert_ne!(a.inputs, other.inputs);

    // The published size flows into the feature vector.
    let scaled = source.build(2, Resolution::square(608)).unwrap();
    assert_eq!(scaled.inputs[0][1], 1.0);
    assert_ne!(a.inputs[0][1], scaled.inputs[0][1]);
}
