//! Normalization layers for the predictor network

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Numerical floor under the variance, as in the reference layers
pub(crate) const NORM_EPS: f32 = 1e-15;

const RUNNING_MOMENTUM: f32 = 0.1;

/// Which statistics a normalization layer uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormKind {
    /// Per-sample statistics across the feature axis; no running state
    Instance,
    /// Per-feature statistics across the batch; running state used in eval
    Batch,
}

/// Learnable normalization over a hidden layer of fixed width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormLayer {
    kind: NormKind,
    pub(crate) gamma: Array1<f32>,
    pub(crate) beta: Array1<f32>,
    pub(crate) running_mean: Array1<f32>,
    pub(crate) running_var: Array1<f32>,
}

/// Values saved by the training forward pass for backprop
#[derive(Debug, Clone)]
pub struct NormCache {
    /// Normalized input before scale/shift
    xhat: Array2<f32>,
    /// 1/sqrt(var + eps): per feature (Batch) or per sample (Instance)
    inv_std: Array1<f32>,
}

impl NormLayer {
    /// Create a layer for a hidden width, with identity scale and zero shift
    pub fn new(kind: NormKind, width: usize) -> Self {
        Self {
            kind,
            gamma: Array1::ones(width),
            beta: Array1::zeros(width),
            running_mean: Array1::zeros(width),
            running_var: Array1::ones(width),
        }
    }

    /// The layer's kind
    pub fn kind(&self) -> NormKind {
        self.kind
    }

    /// Hidden width this layer normalizes
    pub fn width(&self) -> usize {
        self.gamma.len()
    }

    /// Training-mode forward pass; batch kind updates running statistics
    pub fn forward_train(&mut self, x: &Array2<f32>) -> (Array2<f32>, NormCache) {
        match self.kind {
            NormKind::Batch => {
                let n = x.nrows() as f32;
                let mean = x.mean_axis(Axis(0)).expect("non-empty batch");
                let var = x.map_axis(Axis(0), |col| {
                    let m = col.sum() / n;
                    col.iter().map(|&v| (v - m) * (v - m)).sum::<f32>() / n
                });
                let inv_std = var.mapv(|v| 1.0 / (v + NORM_EPS).sqrt());

                self.running_mean = &self.running_mean * (1.0 - RUNNING_MOMENTUM) + &mean * RUNNING_MOMENTUM;
                self.running_var = &self.running_var * (1.0 - RUNNING_MOMENTUM) + &var * RUNNING_MOMENTUM;

                let xhat = (x - &mean) * &inv_std;
                let out = &xhat * &self.gamma + &self.beta;
                (out, NormCache { xhat, inv_std })
            }
            NormKind::Instance => {
                let c = x.ncols() as f32;
                let mean = x.mean_axis(Axis(1)).expect("non-empty rows");
                let var = x.map_axis(Axis(1), |row| {
                    let m = row.sum() / c;
                    row.iter().map(|&v| (v - m) * (v - m)).sum::<f32>() / c
                });
                let inv_std = var.mapv(|v| 1.0 / (v + NORM_EPS).sqrt());

                let mean_col = mean.insert_axis(Axis(1));
                let inv_col = inv_std.clone().insert_axis(Axis(1));
                let xhat = (x - &mean_col) * &inv_col;
                let out = &xhat * &self.gamma + &self.beta;
                (out, NormCache { xhat, inv_std })
            }
        }
    }

    /// Eval-mode forward pass; deterministic, no state mutation
    pub fn forward_eval(&self, x: &Array2<f32>) -> Array2<f32> {
        match self.kind {
            NormKind::Batch => {
                let inv_std = self.running_var.mapv(|v| 1.0 / (v + NORM_EPS).sqrt());
                let xhat = (x - &self.running_mean) * &inv_std;
                &xhat * &self.gamma + &self.beta
            }
            NormKind::Instance => {
                let c = x.ncols() as f32;
                let mean = x.mean_axis(Axis(1)).expect("non-empty rows");
                let var = x.map_axis(Axis(1), |row| {
                    let m = row.sum() / c;
                    row.iter().map(|&v| (v - m) * (v - m)).sum::<f32>() / c
                });
                let inv_std = var.mapv(|v| 1.0 / (v + NORM_EPS).sqrt());
                let xhat = (x - &mean.insert_axis(Axis(1))) * &inv_std.insert_axis(Axis(1));
                &xhat * &self.gamma + &self.beta
            }
        }
    }

    /// Backward pass. Returns (dx, dgamma, dbeta).
    pub fn backward(&self, cache: &NormCache, grad_out: &Array2<f32>) -> (Array2<f32>, Array1<f32>, Array1<f32>) {
        let dgamma = (grad_out * &cache.xhat).sum_axis(Axis(0));
        let dbeta = grad_out.sum_axis(Axis(0));
        let dxhat = grad_out * &self.gamma;

        let dx = match self.kind {
            NormKind::Batch => {
                let n = grad_out.nrows() as f32;
                let sum_dxhat = dxhat.sum_axis(Axis(0));
                let sum_dxhat_xhat = (&dxhat * &cache.xhat).sum_axis(Axis(0));
                let centered = &dxhat * n - &sum_dxhat - &cache.xhat * &sum_dxhat_xhat;
                centered * &cache.inv_std / n
            }
            NormKind::Instance => {
                let c = grad_out.ncols() as f32;
                let sum_dxhat = dxhat.sum_axis(Axis(1)).insert_axis(Axis(1));
                let sum_dxhat_xhat = (&dxhat * &cache.xhat).sum_axis(Axis(1)).insert_axis(Axis(1));
                let centered = &dxhat * c - &sum_dxhat - &cache.xhat * &sum_dxhat_xhat;
                centered * &cache.inv_std.clone().insert_axis(Axis(1)) / c
            }
        };

        (dx, dgamma, dbeta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_input() -> Array2<f32> {
        array![[1.0, -2.0, 0.5], [3.0, 0.0, -1.5], [-1.0, 2.0, 2.5], [0.5, 1.0, -0.5]]
    }

    #[test]
    fn test_batch_norm_normalizes_columns() {
        let mut layer = NormLayer::new(NormKind::Batch, 3);
        let (out, _) = layer.forward_train(&sample_input());

        for j in 0..3 {
            let col = out.column(j);
            let mean: f32 = col.sum() / col.len() as f32;
            let var: f32 = col.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / col.len() as f32;
            assert!(mean.abs() < 1e-4, "column {j} mean {mean}");
            assert!((var - 1.0).abs() < 1e-3, "column {j} var {var}");
        }
    }

    #[test]
    fn test_instance_norm_normalizes_rows() {
        let mut layer = NormLayer::new(NormKind::Instance, 3);
        let (out, _) = layer.forward_train(&sample_input());

        for i in 0..out.nrows() {
            let row = out.row(i);
            let mean: f32 = row.sum() / row.len() as f32;
            assert!(mean.abs() < 1e-4, "row {i} mean {mean}");
        }
    }

    #[test]
    fn test_batch_norm_running_stats_feed_eval() {
        let mut layer = NormLayer::new(NormKind::Batch, 3);
        let x = sample_input();
        for _ in 0..200 {
            layer.forward_train(&x);
        }

        // After many identical batches the running stats converge to the batch
        // stats, so eval output matches train output.
        let (train_out, _) = layer.clone().forward_train(&x);
        let eval_out = layer.forward_eval(&x);
        for (a, b) in train_out.iter().zip(eval_out.iter()) {
            assert!((a - b).abs() < 1e-2, "{a} vs {b}");
        }
    }

    #[test]
    fn test_instance_norm_eval_matches_train() {
        let mut layer = NormLayer::new(NormKind::Instance, 3);
        let x = sample_input();
        let (train_out, _) = layer.forward_train(&x);
        let eval_out = layer.forward_eval(&x);
        assert_eq!(train_out, eval_out);
    }

    #[test]
    fn test_backward_shapes_and_dbeta() {
        let mut layer = NormLayer::new(NormKind::Batch, 3);
        let x = sample_input();
        let (_, cache) = layer.forward_train(&x);

        let grad_out = Array2::ones((4, 3));
        let (dx, dgamma, dbeta) = layer.backward(&cache, &grad_out);
        assert_eq!(dx.shape(), x.shape());
        assert_eq!(dgamma.len(), 3);
        assert_eq!(dbeta.to_vec(), vec![4.0, 4.0, 4.0]);
    }

    // Central-difference check of dx for both kinds, using a scalar objective
    // sum(out * w) so the analytic gradient is backward(w).
    fn gradcheck(kind: NormKind) {
        let x = sample_input();
        let weight = array![[0.3, -0.7, 0.2], [0.9, 0.1, -0.4], [-0.5, 0.6, 0.8], [0.2, -0.2, 0.1]];

        let objective = |input: &Array2<f32>| -> f32 {
            let mut layer = NormLayer::new(kind, 3);
            let (out, _) = layer.forward_train(input);
            (&out * &weight).sum()
        };

        let mut layer = NormLayer::new(kind, 3);
        let (_, cache) = layer.forward_train(&x);
        let (dx, _, _) = layer.backward(&cache, &weight);

        let eps = 1e-2_f32;
        for i in 0..x.nrows() {
            for j in 0..x.ncols() {
                let mut plus = x.clone();
                plus[[i, j]] += eps;
                let mut minus = x.clone();
                minus[[i, j]] -= eps;
                let numeric = (objective(&plus) - objective(&minus)) / (2.0 * eps);
                assert!(
                    (numeric - dx[[i, j]]).abs() < 5e-2,
                    "{kind:?} dx[{i},{j}]: numeric {numeric} vs analytic {}",
                    dx[[i, j]]
                );
            }
        }
    }

    #[test]
    fn test_batch_norm_gradcheck() {
        gradcheck(NormKind::Batch);
    }

    #[test]
    fn test_instance_norm_gradcheck() {
        gradcheck(NormKind::Instance);
    }
}
