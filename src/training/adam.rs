//! Adam optimizer

use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpareError};
use crate::network::{Gradients, SpareNet};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-8;

/// Adaptive moment estimation over the network's parameter set.
///
/// Moment buffers share the `Gradients` layout so the optimizer state can be
/// checkpointed alongside the network weights.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    t: u64,
    m: Gradients,
    v: Gradients,
}

/// Serializable optimizer state for checkpoint and resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub step: u64,
    pub m: Gradients,
    pub v: Gradients,
}

impl Adam {
    /// Create an optimizer with zeroed moments shaped for the given network
    pub fn new(learning_rate: f64, net: &SpareNet) -> Self {
        Self {
            lr: learning_rate as f32,
            t: 0,
            m: net.zero_gradients(),
            v: net.zero_gradients(),
        }
    }

    /// Apply one update step to the network's parameters
    pub fn step(&mut self, net: &mut SpareNet, grads: &Gradients) {
        self.t += 1;
        // Fold both bias corrections into the step size.
        let lr_t = self.lr * (1.0 - BETA2.powi(self.t as i32)).sqrt()
            / (1.0 - BETA1.powi(self.t as i32));

        let params = net.parameters_mut();
        for ((param, grad), (m, v)) in params
            .weights
            .into_iter()
            .zip(&grads.weights)
            .zip(self.m.weights.iter_mut().zip(self.v.weights.iter_mut()))
        {
            update_tensor(param, grad, m, v, lr_t);
        }
        for ((param, grad), (m, v)) in params
            .biases
            .into_iter()
            .zip(&grads.biases)
            .zip(self.m.biases.iter_mut().zip(self.v.biases.iter_mut()))
        {
            update_tensor(param, grad, m, v, lr_t);
        }
        for (((gamma, beta), (dgamma, dbeta)), ((m_g, m_b), (v_g, v_b))) in params
            .norm_params
            .into_iter()
            .zip(&grads.norm_params)
            .zip(self.m.norm_params.iter_mut().zip(self.v.norm_params.iter_mut()))
        {
            update_tensor(gamma, dgamma, m_g, v_g, lr_t);
            update_tensor(beta, dbeta, m_b, v_b, lr_t);
        }
    }

    /// Snapshot the optimizer state
    pub fn state(&self) -> AdamState {
        AdamState { step: self.t, m: self.m.clone(), v: self.v.clone() }
    }

    /// Restore optimizer state from a snapshot
    pub fn load_state(&mut self, state: &AdamState) -> Result<()> {
        if state.m.weights.len() != self.m.weights.len()
            || state.m.norm_params.len() != self.m.norm_params.len()
        {
            return Err(SpareError::ShapeError {
                expected: format!(
                    "{} weight moments, {} norm moments",
                    self.m.weights.len(),
                    self.m.norm_params.len()
                ),
                actual: format!(
                    "{} weight moments, {} norm moments",
                    state.m.weights.len(),
                    state.m.norm_params.len()
                ),
            });
        }
        self.t = state.step;
        self.m = state.m.clone();
        self.v = state.v.clone();
        Ok(())
    }

    /// Number of update steps taken
    pub fn step_count(&self) -> u64 {
        self.t
    }
}

fn update_tensor<D: Dimension>(
    param: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    m: &mut Array<f32, D>,
    v: &mut Array<f32, D>,
    lr_t: f32,
) {
    ndarray::Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + EPSILON);
        });
}
