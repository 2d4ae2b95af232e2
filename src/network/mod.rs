//! Predictor network
//!
//! A fixed 3-layer fully-connected network over f32 tensors:
//! linear -> optional norm -> ReLU -> dropout, twice, then a scalar head with
//! sigmoid (classification) or ReLU (regression). Forward and backward passes
//! are written out explicitly; the network holds no state beyond its
//! trainable parameters and the batch-norm running statistics.

mod norm;

pub use norm::{NormKind, NormLayer};

use ndarray::{Array1, Array2, Axis, concatenate};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::TaskType;
use crate::error::{Result, SpareError};

use norm::NormCache;

/// One trial's model configuration: the five searched hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Width of the first hidden layer; the second is half of it
    pub hidden_size: usize,
    /// Dropout probability applied after each hidden activation
    pub dropout: f32,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Whether normalization layers are active
    pub use_norm: bool,
    /// Normalization statistics kind
    pub norm_kind: NormKind,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_size: 256,
            dropout: 0.2,
            learning_rate: 1e-3,
            use_norm: false,
            norm_kind: NormKind::Batch,
        }
    }
}

/// Serializable snapshot of the network's tensors.
///
/// Weight and bias vectors are ordered by layer; normalization entries are
/// present only when the configuration enables normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub weights: Vec<Array2<f32>>,
    pub biases: Vec<Array1<f32>>,
    pub norm_scales: Vec<Array1<f32>>,
    pub norm_shifts: Vec<Array1<f32>>,
    pub running_means: Vec<Array1<f32>>,
    pub running_vars: Vec<Array1<f32>>,
}

/// Gradients of the trainable parameters, in the same layout as the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradients {
    pub weights: Vec<Array2<f32>>,
    pub biases: Vec<Array1<f32>>,
    /// (scale, shift) gradients per active normalization layer
    pub norm_params: Vec<(Array1<f32>, Array1<f32>)>,
}

/// Values cached by the training forward pass for backprop
pub struct ForwardCache {
    r1: Array2<f32>,
    norm1: Option<NormCache>,
    mask1: Option<Array2<f32>>,
    d1: Array2<f32>,
    r2: Array2<f32>,
    norm2: Option<NormCache>,
    mask2: Option<Array2<f32>>,
    d2: Array2<f32>,
    /// Final activations, one scalar per sample
    pub out: Array1<f32>,
}

/// The predictor network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpareNet {
    config: NetworkConfig,
    task: TaskType,
    num_features: usize,
    w1: Array2<f32>,
    b1: Array1<f32>,
    norm1: Option<NormLayer>,
    w2: Array2<f32>,
    b2: Array1<f32>,
    norm2: Option<NormLayer>,
    w3: Array2<f32>,
    b3: Array1<f32>,
}

impl SpareNet {
    /// Build a freshly initialized network for a trial configuration
    pub fn new(num_features: usize, config: NetworkConfig, task: TaskType, seed: u64) -> Self {
        let h1 = config.hidden_size;
        let h2 = (config.hidden_size / 2).max(1);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let w1 = Self::xavier(num_features, h1, &mut rng);
        let w2 = Self::xavier(h1, h2, &mut rng);
        let w3 = Self::xavier(h2, 1, &mut rng);

        let (norm1, norm2) = if config.use_norm {
            (
                Some(NormLayer::new(config.norm_kind, h1)),
                Some(NormLayer::new(config.norm_kind, h2)),
            )
        } else {
            (None, None)
        };

        Self {
            config,
            task,
            num_features,
            w1,
            b1: Array1::zeros(h1),
            norm1,
            w2,
            b2: Array1::zeros(h2),
            norm2,
            w3,
            b3: Array1::zeros(1),
        }
    }

    fn xavier(n_in: usize, n_out: usize, rng: &mut Xoshiro256PlusPlus) -> Array2<f32> {
        let scale = (2.0 / (n_in + n_out) as f32).sqrt();
        Array2::from_shape_fn((n_in, n_out), |_| rng.gen::<f32>() * 2.0 * scale - scale)
    }

    /// Trial configuration this network was built from
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Expected input width
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Training forward pass: dropout active, batch-norm statistics updated
    pub fn forward_train(&mut self, x: &Array2<f32>, rng: &mut Xoshiro256PlusPlus) -> ForwardCache {
        let p = self.config.dropout;

        let z1 = x.dot(&self.w1) + &self.b1;
        let (n1, norm1) = match self.norm1.as_mut() {
            Some(layer) => {
                let (out, cache) = layer.forward_train(&z1);
                (out, Some(cache))
            }
            None => (z1, None),
        };
        let r1 = n1.mapv(|v| v.max(0.0));
        let mask1 = Self::dropout_mask(r1.dim(), p, rng);
        let d1 = match &mask1 {
            Some(mask) => &r1 * mask,
            None => r1.clone(),
        };

        let z2 = d1.dot(&self.w2) + &self.b2;
        let (n2, norm2) = match self.norm2.as_mut() {
            Some(layer) => {
                let (out, cache) = layer.forward_train(&z2);
                (out, Some(cache))
            }
            None => (z2, None),
        };
        let r2 = n2.mapv(|v| v.max(0.0));
        let mask2 = Self::dropout_mask(r2.dim(), p, rng);
        let d2 = match &mask2 {
            Some(mask) => &r2 * mask,
            None => r2.clone(),
        };

        let z3 = d2.dot(&self.w3) + &self.b3;
        let out = self.head(z3);

        ForwardCache { r1, norm1, mask1, d1, r2, norm2, mask2, d2, out }
    }

    /// Eval forward pass: no dropout, running statistics for batch norm
    pub fn forward_eval(&self, x: &Array2<f32>) -> Array1<f32> {
        let z1 = x.dot(&self.w1) + &self.b1;
        let n1 = match &self.norm1 {
            Some(layer) => layer.forward_eval(&z1),
            None => z1,
        };
        let r1 = n1.mapv(|v| v.max(0.0));

        let z2 = r1.dot(&self.w2) + &self.b2;
        let n2 = match &self.norm2 {
            Some(layer) => layer.forward_eval(&z2),
            None => z2,
        };
        let r2 = n2.mapv(|v| v.max(0.0));

        let z3 = r2.dot(&self.w3) + &self.b3;
        self.head(z3)
    }

    /// Eval forward over a large input, split into row chunks across the
    /// granted data-parallel lanes
    pub fn predict_chunked(&self, x: &Array2<f32>, lanes: usize) -> Array1<f32> {
        if lanes <= 1 || x.nrows() < 2 * lanes {
            return self.forward_eval(x);
        }

        let chunk = x.nrows().div_ceil(lanes);
        let parts: Vec<Array1<f32>> = x
            .axis_chunks_iter(Axis(0), chunk)
            .into_par_iter()
            .map(|rows| self.forward_eval(&rows.to_owned()))
            .collect();

        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        concatenate(Axis(0), &views).expect("chunk outputs share one axis")
    }

    /// Backward pass.
    ///
    /// `delta` is the loss gradient with respect to the final pre-activation,
    /// one value per sample (the loss and terminal activation are fused by the
    /// caller, as in sigmoid + BCE).
    pub fn backward(&self, x: &Array2<f32>, cache: &ForwardCache, delta: &Array1<f32>) -> Gradients {
        let delta3 = delta.clone().insert_axis(Axis(1));

        let grad_w3 = cache.d2.t().dot(&delta3);
        let grad_b3 = delta3.sum_axis(Axis(0));

        let mut grad = delta3.dot(&self.w3.t());
        if let Some(mask) = &cache.mask2 {
            grad = grad * mask;
        }
        grad = grad * cache.r2.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        let mut norm_params = Vec::new();
        let dz2 = match (&self.norm2, &cache.norm2) {
            (Some(layer), Some(norm_cache)) => {
                let (dx, dgamma, dbeta) = layer.backward(norm_cache, &grad);
                norm_params.push((dgamma, dbeta));
                dx
            }
            _ => grad,
        };

        let grad_w2 = cache.d1.t().dot(&dz2);
        let grad_b2 = dz2.sum_axis(Axis(0));

        let mut grad = dz2.dot(&self.w2.t());
        if let Some(mask) = &cache.mask1 {
            grad = grad * mask;
        }
        grad = grad * cache.r1.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        let dz1 = match (&self.norm1, &cache.norm1) {
            (Some(layer), Some(norm_cache)) => {
                let (dx, dgamma, dbeta) = layer.backward(norm_cache, &grad);
                norm_params.insert(0, (dgamma, dbeta));
                dx
            }
            _ => grad,
        };

        let grad_w1 = x.t().dot(&dz1);
        let grad_b1 = dz1.sum_axis(Axis(0));

        Gradients {
            weights: vec![grad_w1, grad_w2, grad_w3],
            biases: vec![grad_b1, grad_b2, grad_b3],
            norm_params,
        }
    }

    /// Zero-valued gradients in this network's parameter layout
    pub fn zero_gradients(&self) -> Gradients {
        Gradients {
            weights: vec![
                Array2::zeros(self.w1.raw_dim()),
                Array2::zeros(self.w2.raw_dim()),
                Array2::zeros(self.w3.raw_dim()),
            ],
            biases: vec![
                Array1::zeros(self.b1.len()),
                Array1::zeros(self.b2.len()),
                Array1::zeros(self.b3.len()),
            ],
            norm_params: [self.norm1.as_ref(), self.norm2.as_ref()]
                .into_iter()
                .flatten()
                .map(|layer| (Array1::zeros(layer.width()), Array1::zeros(layer.width())))
                .collect(),
        }
    }

    /// Mutable references to trainable parameters, in gradient layout
    pub(crate) fn parameters_mut(&mut self) -> ParamRefs<'_> {
        ParamRefs {
            weights: vec![&mut self.w1, &mut self.w2, &mut self.w3],
            biases: vec![&mut self.b1, &mut self.b2, &mut self.b3],
            norm_params: [self.norm1.as_mut(), self.norm2.as_mut()]
                .into_iter()
                .flatten()
                .map(|layer| (&mut layer.gamma, &mut layer.beta))
                .collect(),
        }
    }

    /// Snapshot all tensors into a checkpointable state
    pub fn state(&self) -> NetworkState {
        let norm_layers: Vec<&NormLayer> =
            [self.norm1.as_ref(), self.norm2.as_ref()].into_iter().flatten().collect();
        NetworkState {
            weights: vec![self.w1.clone(), self.w2.clone(), self.w3.clone()],
            biases: vec![self.b1.clone(), self.b2.clone(), self.b3.clone()],
            norm_scales: norm_layers.iter().map(|l| l.gamma.clone()).collect(),
            norm_shifts: norm_layers.iter().map(|l| l.beta.clone()).collect(),
            running_means: norm_layers.iter().map(|l| l.running_mean.clone()).collect(),
            running_vars: norm_layers.iter().map(|l| l.running_var.clone()).collect(),
        }
    }

    /// Restore all tensors from a state snapshot
    pub fn load_state(&mut self, state: &NetworkState) -> Result<()> {
        let expected_norms = if self.config.use_norm { 2 } else { 0 };
        if state.weights.len() != 3
            || state.biases.len() != 3
            || state.norm_scales.len() != expected_norms
        {
            return Err(SpareError::ShapeError {
                expected: format!("3 weight tensors, {expected_norms} norm layers"),
                actual: format!(
                    "{} weight tensors, {} norm layers",
                    state.weights.len(),
                    state.norm_scales.len()
                ),
            });
        }
        for (current, stored) in [&self.w1, &self.w2, &self.w3].iter().zip(&state.weights) {
            if current.raw_dim() != stored.raw_dim() {
                return Err(SpareError::ShapeError {
                    expected: format!("{:?}", current.raw_dim()),
                    actual: format!("{:?}", stored.raw_dim()),
                });
            }
        }

        self.w1 = state.weights[0].clone();
        self.w2 = state.weights[1].clone();
        self.w3 = state.weights[2].clone();
        self.b1 = state.biases[0].clone();
        self.b2 = state.biases[1].clone();
        self.b3 = state.biases[2].clone();

        let layers = [self.norm1.as_mut(), self.norm2.as_mut()];
        for (i, layer) in layers.into_iter().flatten().enumerate() {
            layer.gamma = state.norm_scales[i].clone();
            layer.beta = state.norm_shifts[i].clone();
            layer.running_mean = state.running_means[i].clone();
            layer.running_var = state.running_vars[i].clone();
        }
        Ok(())
    }

    fn head(&self, z3: Array2<f32>) -> Array1<f32> {
        let squeezed = z3.index_axis(Axis(1), 0).to_owned();
        match self.task {
            TaskType::Classification => squeezed.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            TaskType::Regression => squeezed.mapv(|v| v.max(0.0)),
        }
    }

    fn dropout_mask(
        dim: (usize, usize),
        p: f32,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Option<Array2<f32>> {
        if p <= 0.0 {
            return None;
        }
        let keep = 1.0 / (1.0 - p);
        Some(Array2::from_shape_fn(dim, |_| {
            if rng.gen::<f32>() < p { 0.0 } else { keep }
        }))
    }
}

/// Mutable parameter references handed to the optimizer
pub(crate) struct ParamRefs<'a> {
    pub weights: Vec<&'a mut Array2<f32>>,
    pub biases: Vec<&'a mut Array1<f32>>,
    pub norm_params: Vec<(&'a mut Array1<f32>, &'a mut Array1<f32>)>,
}
