use serde_json::json;
use std::fs;
use trainloop::checkpoint::{CheckpointError, CheckpointManager, TrainerState};
use trainloop::harness::LinearModel;
use trainloop::interfaces::Optimizer;
use trainloop::optim::{Adam, Sgd};
use trainloop::schedule::ScheduleState;

fn manager(dir: &tempfile::TempDir) -> CheckpointManager {
    CheckpointManager::new(dir.path(), "yolov3").unwrap()
}

#[test]
fn state_bundle_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = manager(&dir);
    let state = TrainerState {
        epoch: 7,
        optimizer: json!({"kind": "sgd", "lr": 1e-4, "momentum": 0.9, "weight_decay": 5e-4, "velocity": [0.1, -0.2]}),
        lr_scheduler: ScheduleState {
            completed_epochs: 8,
            applied: 1,
        },
    };
    ckpt.save_state(&state).unwrap();

    let loaded = ckpt.load_state().unwrap();
    assert_eq!(loaded.epoch, 7);
    assert_eq!(loaded.optimizer, state.optimizer);
    assert_eq!(loaded.lr_scheduler, state.lr_scheduler);
    // Resume policy: the saved epoch is the last fully completed one.
    assert_eq!(loaded.epoch + 1, 8);
}

#[test]
fn missing_state_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = manager(&dir);
    assert!(matches!(
        ckpt.load_state(),
        Err(CheckpointError::NotFound { .. })
    ));
}

#[test]
fn malformed_state_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = manager(&dir);
    fs::write(ckpt.trainer_state_path(), b"{ not json").unwrap();
    assert!(matches!(
        ckpt.load_state(),
        Err(CheckpointError::Corrupt { .. })
    ));
}

#[test]
fn state_missing_required_keys_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = manager(&dir);
    fs::write(ckpt.trainer_state_path(), br#"{"epoch": 3}"#).unwrap();
    assert!(matches!(
        ckpt.load_state(),
        Err(CheckpointError::Corrupt { .. })
    ));
}

#[test]
fn save_supersedes_atomically_and_leaves_no_temp() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = manager(&dir);
    for epoch in 0..3 {
        ckpt.save_state(&TrainerState {
            epoch,
            optimizer: json!({}),
            lr_scheduler: ScheduleState {
                completed_epochs: epoch + 1,
                applied: 0,
            },
        })
        .unwrap();
    }
    assert_eq!(ckpt.load_state().unwrap().epoch, 2);

    let leftovers: Vec<_> = fs::read_dir(dir.path().join("checkpoint"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[test]
fn weights_path_uses_epoch_suffix_template() {
    let dir = tempfile::tempdir().unwrap();
    let ckpt = manager(&dir);
    let path = ckpt.weights_path(7);
    assert!(path.ends_with("checkpoint/yolov3-ckpt-007.json"));
    assert_ne!(ckpt.weights_path(8), path);
}

#[test]
fn sgd_state_survives_round_trip() {
    let mut model = LinearModel::new();
    let mut optim = Sgd::new(1e-3, 0.9, 5e-4);
    // Build up a momentum buffer.
    {
        use trainloop::interfaces::ParamAccess;
        let (_, grads) = model.params_and_grads();
        grads.copy_from_slice(&[1.0, -1.0, 0.5, 0.25]);
    }
    Optimizer::<LinearModel>::step(&mut optim, &mut model).unwrap();
    let state = Optimizer::<LinearModel>::state_dict(&optim);

    let mut restored = Sgd::new(0.0, 0.0, 0.0);
    Optimizer::<LinearModel>::load_state_dict(&mut restored, state.clone()).unwrap();
    assert_eq!(Optimizer::<LinearModel>::state_dict(&restored), state);
}

#[test]
fn adam_state_survives_round_trip() {
    let mut model = LinearModel::new();
    let mut optim = Adam::new(1e-3, 5e-4);
    {
        use trainloop::interfaces::ParamAccess;
        let (_, grads) = model.params_and_grads();
        grads.copy_from_slice(&[0.3, 0.1, -0.7, 0.9]);
    }
    Optimizer::<LinearModel>::step(&mut optim, &mut model).unwrap();
    Optimizer::<LinearModel>::step(&mut optim, &mut model).unwrap();
    let state = Optimizer::<LinearModel>::state_dict(&optim);

    let mut restored = Adam::new(0.0, 0.0);
    Optimizer::<LinearModel>::load_state_dict(&mut restored, state.clone()).unwrap();
    assert_eq!(Optimizer::<LinearModel>::state_dict(&restored), state);
}
