use trainloop::metrics::{MetricAggregator, MetricError};

fn record(values: &[(&str, f64)]) -> Vec<(String, f64)> {
    values
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}

#[test]
fn running_average_equals_plain_mean() {
    let mut agg = MetricAggregator::new();
    let expected = [2.0, 3.0, 4.0];
    for (i, value) in [2.0, 4.0, 6.0].into_iter().enumerate() {
        agg.fold(i, &record(&[("loss", value)])).unwrap();
        assert!((agg.values()[0] - expected[i]).abs() < 1e-12);
    }
    assert_eq!(agg.folded(), 3);
}

#[test]
fn reset_clears_history_but_keeps_schema() {
    let mut agg = MetricAggregator::new();
    for (i, value) in [10.0, 30.0, 50.0].into_iter().enumerate() {
        agg.fold(i, &record(&[("loss", value)])).unwrap();
    }
    agg.reset();
    assert!(agg.is_bound());
    assert_eq!(agg.folded(), 0);

    // The second epoch reproduces the reference sequence exactly,
    // regardless of the prior epoch's values.
    let expected = [2.0, 3.0, 4.0];
    for (i, value) in [2.0, 4.0, 6.0].into_iter().enumerate() {
        agg.fold(i, &record(&[("loss", value)])).unwrap();
        assert!((agg.values()[0] - expected[i]).abs() < 1e-12);
    }
}

#[test]
fn schema_binds_from_first_record() {
    let mut agg = MetricAggregator::new();
    assert!(!agg.is_bound());
    agg.fold(0, &record(&[("lbox", 1.0), ("lcls", 2.0), ("loss", 3.0)]))
        .unwrap();
    assert_eq!(agg.names(), ["lbox", "lcls", "loss"]);
    assert_eq!(
        agg.snapshot(),
        vec![
            ("lbox".to_string(), 1.0),
            ("lcls".to_string(), 2.0),
            ("loss".to_string(), 3.0)
        ]
    );
}

#[test]
fn diverging_schema_is_rejected() {
    let mut agg = MetricAggregator::new();
    agg.fold(0, &record(&[("lbox", 1.0), ("loss", 2.0)])).unwrap();

    let err = agg
        .fold(1, &record(&[("loss", 2.0), ("lbox", 1.0)]))
        .unwrap_err();
    assert!(matches!(err, MetricError::SchemaMismatch { .. }));

    let err = agg.fold(1, &record(&[("lbox", 1.0)])).unwrap_err();
    assert!(matches!(err, MetricError::SchemaMismatch { .. }));

    // The failed folds did not disturb the running values.
    assert_eq!(agg.folded(), 1);
    assert_eq!(agg.values(), [1.0, 2.0]);
}

#[test]
fn averages_track_multiple_metrics_independently() {
    let mut agg = MetricAggregator::new();
    agg.fold(0, &record(&[("a", 1.0), ("b", 10.0)])).unwrap();
    agg.fold(1, &record(&[("a", 3.0), ("b", 30.0)])).unwrap();
    assert!((agg.values()[0] - 2.0).abs() < 1e-12);
    assert!((agg.values()[1] - 20.0).abs() < 1e-12);
}
