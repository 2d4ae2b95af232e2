//! Standard scaling of predictor columns

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpareError};

/// Parameters for one fitted column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScalerParams {
    center: f64,
    scale: f64,
}

/// Standard (z-score) scaler over named predictor columns.
///
/// Fit computes per-column mean and population standard deviation; transform
/// applies `(x - mean) / std` to a matrix whose columns are in the same order
/// as the fitted predictor list. A zero-variance column scales by 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScaler {
    columns: Vec<String>,
    params: Vec<ScalerParams>,
    is_fitted: bool,
}

impl ColumnScaler {
    /// Create an unfitted scaler
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            params: Vec::new(),
            is_fitted: false,
        }
    }

    /// Fit per-column parameters from a training matrix
    pub fn fit(&mut self, x: &Array2<f32>, columns: &[String]) -> Result<&mut Self> {
        if x.ncols() != columns.len() {
            return Err(SpareError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        if x.nrows() == 0 {
            return Err(SpareError::DataError("cannot fit scaler on empty data".to_string()));
        }

        self.columns = columns.to_vec();
        self.params = (0..x.ncols())
            .map(|j| {
                let col = x.column(j);
                let n = col.len() as f64;
                let mean = col.iter().map(|&v| v as f64).sum::<f64>() / n;
                let var = col.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                ScalerParams {
                    center: mean,
                    scale: if std == 0.0 { 1.0 } else { std },
                }
            })
            .collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Apply stored parameters to a matrix
    pub fn transform(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        if !self.is_fitted {
            return Err(SpareError::ModelNotFitted);
        }
        if x.ncols() != self.params.len() {
            return Err(SpareError::ShapeError {
                expected: format!("{} columns", self.params.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.clone();
        for (j, params) in self.params.iter().enumerate() {
            let mut col = out.column_mut(j);
            col.mapv_inplace(|v| ((v as f64 - params.center) / params.scale) as f32);
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f32>, columns: &[String]) -> Result<Array2<f32>> {
        self.fit(x, columns)?;
        self.transform(x)
    }

    /// Whether the scaler has been fitted
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fitted column names, in matrix order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Default for ColumnScaler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_standard_scaling_centers_and_scales() {
        let x = array![[1.0_f32], [2.0], [3.0], [4.0], [5.0]];
        let mut scaler = ColumnScaler::new();
        let scaled = scaler.fit_transform(&x, &names(&["a"])).unwrap();

        let mean: f32 = scaled.column(0).iter().sum::<f32>() / 5.0;
        assert!(mean.abs() < 1e-6);

        let var: f32 = scaled.column(0).iter().map(|v| v * v).sum::<f32>() / 5.0;
        assert!((var - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let scaler = ColumnScaler::new();
        let x = array![[1.0_f32]];
        assert!(matches!(scaler.transform(&x), Err(SpareError::ModelNotFitted)));
    }

    #[test]
    fn test_zero_variance_column_scales_by_one() {
        let x = array![[2.0_f32], [2.0], [2.0]];
        let mut scaler = ColumnScaler::new();
        let scaled = scaler.fit_transform(&x, &names(&["flat"])).unwrap();
        assert!(scaled.column(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transform_uses_training_parameters() {
        let train = array![[0.0_f32], [2.0], [4.0]];
        let mut scaler = ColumnScaler::new();
        scaler.fit(&train, &names(&["a"])).unwrap();

        // New data is scaled with train mean/std, not its own.
        let fresh = array![[2.0_f32], [6.0]];
        let scaled = scaler.transform(&fresh).unwrap();
        assert!((scaled[[0, 0]] - 0.0).abs() < 1e-6);
        assert!((scaled[[1, 0]] - 2.4494898).abs() < 1e-5);
    }

    #[test]
    fn test_column_count_mismatch() {
        let mut scaler = ColumnScaler::new();
        assert!(scaler.fit(&array![[1.0_f32, 2.0]], &names(&["a"])).is_err());

        let mut scaler = ColumnScaler::new();
        scaler
            .fit(&array![[1.0_f32, 2.0], [3.0, 4.0]], &names(&["a", "b"]))
            .unwrap();
        let wrong = array![[1.0_f32], [2.0]];
        assert!(scaler.transform(&wrong).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut scaler = ColumnScaler::new();
        scaler
            .fit(&array![[1.0_f32, 5.0], [3.0, 9.0]], &names(&["a", "b"]))
            .unwrap();

        let json = serde_json::to_string(&scaler).unwrap();
        let restored: ColumnScaler = serde_json::from_str(&json).unwrap();
        assert_eq!(scaler, restored);
    }
}
