//! SGD and Adam over the flat parameter seam, with serde-backed state for
//! checkpoint/resume.

use crate::config::OptimizerKind;
use crate::interfaces::{Optimizer, ParamAccess};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Stochastic gradient descent with momentum and L2 weight decay.
pub struct Sgd {
    lr: f64,
    momentum: f64,
    weight_decay: f64,
    velocity: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct SgdState {
    lr: f64,
    momentum: f64,
    weight_decay: f64,
    velocity: Vec<f64>,
}

impl Sgd {
    pub fn new(lr: f64, momentum: f64, weight_decay: f64) -> Self {
        Self {
            lr,
            momentum,
            weight_decay,
            velocity: Vec::new(),
        }
    }
}

impl<M: ParamAccess> Optimizer<M> for Sgd {
    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn step(&mut self, model: &mut M) -> anyhow::Result<()> {
        let (params, grads) = model.params_and_grads();
        if self.velocity.len() != params.len() {
            self.velocity = vec![0.0; params.len()];
        }
        for i in 0..params.len() {
            let g = grads[i] + self.weight_decay * params[i];
            self.velocity[i] = self.momentum * self.velocity[i] + g;
            params[i] -= self.lr * self.velocity[i];
        }
        Ok(())
    }

    fn zero_grad(&mut self, model: &mut M) {
        let (_, grads) = model.params_and_grads();
        grads.fill(0.0);
    }

    fn state_dict(&self) -> serde_json::Value {
        json!({
            "kind": "sgd",
            "lr": self.lr,
            "momentum": self.momentum,
            "weight_decay": self.weight_decay,
            "velocity": self.velocity,
        })
    }

    fn load_state_dict(&mut self, state: serde_json::Value) -> anyhow::Result<()> {
        let state: SgdState = serde_json::from_value(state)?;
        self.lr = state.lr;
        self.momentum = state.momentum;
        self.weight_decay = state.weight_decay;
        self.velocity = state.velocity;
        Ok(())
    }
}

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

/// Adam with bias-corrected moment estimates. Bias corrections are computed
/// once per step, not per parameter.
pub struct Adam {
    lr: f64,
    weight_decay: f64,
    t: u64,
    m: Vec<f64>,
    v: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct AdamState {
    lr: f64,
    weight_decay: f64,
    t: u64,
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Adam {
    pub fn new(lr: f64, weight_decay: f64) -> Self {
        Self {
            lr,
            weight_decay,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }
}

impl<M: ParamAccess> Optimizer<M> for Adam {
    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn step(&mut self, model: &mut M) -> anyhow::Result<()> {
        let (params, grads) = model.params_and_grads();
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
        }
        self.t += 1;
        let bc1 = 1.0 - ADAM_BETA1.powi(self.t as i32);
        let bc2 = 1.0 - ADAM_BETA2.powi(self.t as i32);
        for i in 0..params.len() {
            let g = grads[i] + self.weight_decay * params[i];
            self.m[i] = ADAM_BETA1 * self.m[i] + (1.0 - ADAM_BETA1) * g;
            self.v[i] = ADAM_BETA2 * self.v[i] + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = self.m[i] / bc1;
            let v_hat = self.v[i] / bc2;
            params[i] -= self.lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
        }
        Ok(())
    }

    fn zero_grad(&mut self, model: &mut M) {
        let (_, grads) = model.params_and_grads();
        grads.fill(0.0);
    }

    fn state_dict(&self) -> serde_json::Value {
        json!({
            "kind": "adam",
            "lr": self.lr,
            "weight_decay": self.weight_decay,
            "t": self.t,
            "m": self.m,
            "v": self.v,
        })
    }

    fn load_state_dict(&mut self, state: serde_json::Value) -> anyhow::Result<()> {
        let state: AdamState = serde_json::from_value(state)?;
        self.lr = state.lr;
        self.weight_decay = state.weight_decay;
        self.t = state.t;
        self.m = state.m;
        self.v = state.v;
        Ok(())
    }
}

/// Build the optimizer picked on the CLI. Momentum only applies to SGD.
pub fn build_optimizer<M: ParamAccess + 'static>(
    kind: OptimizerKind,
    lr: f64,
    momentum: f64,
    weight_decay: f64,
) -> Box<dyn Optimizer<M>> {
    match kind {
        OptimizerKind::Sgd => Box::new(Sgd::new(lr, momentum, weight_decay)),
        OptimizerKind::Adam => Box::new(Adam::new(lr, weight_decay)),
    }
}
