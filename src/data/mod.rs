//! Tabular dataset adapter and batching
//!
//! Wraps a feature matrix and label vector as fixed-size indexable samples,
//! with a shuffling mini-batch iterator for training and helpers to extract
//! predictor columns from a DataFrame.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{Result, SpareError};

/// Fixed-size collection of (feature vector, label) samples, coerced to f32
#[derive(Debug, Clone)]
pub struct TabularDataset {
    features: Array2<f32>,
    labels: Array1<f32>,
}

impl TabularDataset {
    /// Wrap a feature matrix and label vector; lengths must match
    pub fn new(features: Array2<f32>, labels: Array1<f32>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(SpareError::ShapeError {
                expected: format!("{} labels", features.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        Ok(Self { features, labels })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Width of each feature vector
    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    /// Random access by index
    pub fn sample(&self, idx: usize) -> (ArrayView1<'_, f32>, f32) {
        (self.features.row(idx), self.labels[idx])
    }

    /// The full feature matrix
    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    /// The full label vector
    pub fn labels(&self) -> &Array1<f32> {
        &self.labels
    }
}

/// Yields fixed-size mini-batches over a dataset, reshuffling sample order
/// each epoch when shuffling is enabled. The final batch is partial when the
/// sample count is not a multiple of the batch size.
#[derive(Debug)]
pub struct BatchIterator {
    batch_size: usize,
    shuffle: bool,
    rng: Xoshiro256PlusPlus,
}

impl BatchIterator {
    /// Create a batching iterator
    pub fn new(batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            batch_size: batch_size.max(1),
            shuffle,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// Produce the batches for one epoch
    pub fn epoch<'a>(&mut self, dataset: &'a TabularDataset) -> Batches<'a> {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        Batches {
            dataset,
            order,
            batch_size: self.batch_size,
            cursor: 0,
        }
    }
}

/// One epoch's worth of mini-batches
pub struct Batches<'a> {
    dataset: &'a TabularDataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = (Array2<f32>, Array1<f32>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let x = take_rows(self.dataset.features(), indices);
        let y = Array1::from_iter(indices.iter().map(|&i| self.dataset.labels()[i]));
        Some((x, y))
    }
}

/// Extract named columns from a DataFrame into an f32 matrix (rows = samples)
pub fn extract_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f32>> {
    let n_rows = df.height();
    let n_cols = columns.len();
    let mut data = Vec::with_capacity(n_rows * n_cols);

    for col_name in columns {
        let column = df
            .column(col_name)
            .map_err(|_| SpareError::FeatureNotFound(col_name.clone()))?;
        let values = column
            .as_materialized_series()
            .cast(&DataType::Float32)
            .map_err(|e| SpareError::DataError(e.to_string()))?;
        let ca = values.f32().map_err(|e| SpareError::DataError(e.to_string()))?;
        data.extend(ca.into_iter().map(|v| v.unwrap_or(0.0)));
    }

    // Columns were appended contiguously; transpose into row-major samples.
    let x = Array2::from_shape_vec((n_cols, n_rows), data)?;
    Ok(x.t().to_owned())
}

/// Extract a named column from a DataFrame into an f32 vector
pub fn extract_labels(df: &DataFrame, column: &str) -> Result<Array1<f32>> {
    let series = df
        .column(column)
        .map_err(|_| SpareError::FeatureNotFound(column.to_string()))?;
    let values = series
        .as_materialized_series()
        .cast(&DataType::Float32)
        .map_err(|e| SpareError::DataError(e.to_string()))?;
    let ca = values.f32().map_err(|e| SpareError::DataError(e.to_string()))?;
    Ok(Array1::from_iter(ca.into_iter().map(|v| v.unwrap_or(0.0))))
}

/// Shuffled train/validation index split with a fixed seed
pub fn train_val_split(n_samples: usize, val_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let val_size = (n_samples as f64 * val_fraction) as usize;
    let val = indices.split_off(n_samples - val_size);
    (indices, val)
}

/// Gather rows of a matrix by index
pub fn take_rows(x: &Array2<f32>, indices: &[usize]) -> Array2<f32> {
    let mut out = Array2::zeros((indices.len(), x.ncols()));
    for (row, &i) in indices.iter().enumerate() {
        out.index_axis_mut(Axis(0), row).assign(&x.row(i));
    }
    out
}

/// Gather entries of a vector by index
pub fn take_values(y: &Array1<f32>, indices: &[usize]) -> Array1<f32> {
    Array1::from_iter(indices.iter().map(|&i| y[i]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_dataset() -> TabularDataset {
        let x = Array2::from_shape_vec((5, 2), (0..10).map(|v| v as f32).collect()).unwrap();
        let y = array![0.0_f32, 1.0, 0.0, 1.0, 0.0];
        TabularDataset::new(x, y).unwrap()
    }

    #[test]
    fn test_dataset_shape() {
        let ds = small_dataset();
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.num_features(), 2);
        let (features, label) = ds.sample(1);
        assert_eq!(features.to_vec(), vec![2.0, 3.0]);
        assert_eq!(label, 1.0);
    }

    #[test]
    fn test_dataset_length_mismatch() {
        let x = Array2::<f32>::zeros((4, 2));
        let y = Array1::<f32>::zeros(3);
        assert!(TabularDataset::new(x, y).is_err());
    }

    #[test]
    fn test_batches_cover_all_samples_with_partial_tail() {
        let ds = small_dataset();
        let mut iter = BatchIterator::new(2, true, 7);

        let batches: Vec<_> = iter.epoch(&ds).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].0.nrows(), 2);
        assert_eq!(batches[2].0.nrows(), 1);

        let total: usize = batches.iter().map(|(x, _)| x.nrows()).sum();
        assert_eq!(total, ds.len());
    }

    #[test]
    fn test_unshuffled_batches_preserve_order() {
        let ds = small_dataset();
        let mut iter = BatchIterator::new(3, false, 0);
        let batches: Vec<_> = iter.epoch(&ds).collect();
        assert_eq!(batches[0].1.to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(batches[1].1.to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_shuffle_changes_between_epochs() {
        let x = Array2::from_shape_vec((64, 1), (0..64).map(|v| v as f32).collect()).unwrap();
        let y = Array1::from_iter((0..64).map(|v| v as f32));
        let ds = TabularDataset::new(x, y).unwrap();

        let mut iter = BatchIterator::new(64, true, 3);
        let first: Vec<f32> = iter.epoch(&ds).next().unwrap().1.to_vec();
        let second: Vec<f32> = iter.epoch(&ds).next().unwrap().1.to_vec();
        assert_ne!(first, second);
    }

    #[test]
    fn test_extract_matrix_and_labels() {
        let df = df!(
            "a" => &[1.0, 2.0, 3.0],
            "b" => &[4.0, 5.0, 6.0],
            "target" => &[0.0, 1.0, 0.0]
        )
        .unwrap();

        let x = extract_matrix(&df, &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(x.shape(), &[3, 2]);
        assert_eq!(x[[1, 0]], 2.0);
        assert_eq!(x[[1, 1]], 5.0);

        let y = extract_labels(&df, "target").unwrap();
        assert_eq!(y.to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_extract_missing_column() {
        let df = df!("a" => &[1.0]).unwrap();
        let err = extract_matrix(&df, &["missing".to_string()]).unwrap_err();
        assert!(matches!(err, SpareError::FeatureNotFound(_)));
    }

    #[test]
    fn test_train_val_split_sizes_and_reproducibility() {
        let (train, val) = train_val_split(100, 0.2, 42);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(), 20);

        let mut all: Vec<usize> = train.iter().chain(val.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());

        let (train2, val2) = train_val_split(100, 0.2, 42);
        assert_eq!(train, train2);
        assert_eq!(val, val2);
    }
}
