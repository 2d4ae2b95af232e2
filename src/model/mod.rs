//! Model manager
//!
//! Orchestrates the end-to-end fit: split and scale the table, drive the
//! hyperparameter search, materialize the winning network, compute final
//! evaluation stats, and serve later predictions with the stored scaler and
//! weights.

use std::collections::HashMap;
use std::time::Instant;

use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ModelOptions, TaskType};
use crate::data::{self, TabularDataset};
use crate::device::{ComputeResources, ResourcePlan};
use crate::error::{Result, SpareError};
use crate::network::{NetworkConfig, NetworkState, SpareNet};
use crate::preprocessing::ColumnScaler;
use crate::search::{SearchConfig, SearchCoordinator};
use crate::training::evaluate;

const VALIDATION_FRACTION: f64 = 0.2;

/// Everything `fit` returns to the caller
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Predictions over the entire input table
    pub predicted: Array1<f32>,
    /// The materialized winning network
    pub network: SpareNet,
    /// Final evaluation stats, including `training_time` in seconds
    pub stats: HashMap<String, f64>,
    /// The winning trial configuration
    pub best_config: NetworkConfig,
    /// The winning network weights
    pub weights: NetworkState,
    /// Scaler fitted on the training split
    pub scaler: ColumnScaler,
}

/// Complete deployable output of a fit, as round-tripped by the external
/// persistence layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub predictors: Vec<String>,
    pub to_predict: String,
    pub key_var: String,
    pub task: TaskType,
    pub scaler: ColumnScaler,
    pub config: NetworkConfig,
    pub weights: NetworkState,
    pub stats: HashMap<String, f64>,
}

/// Parameter override accepted by `set_parameters`
#[derive(Debug, Clone)]
pub enum ParameterUpdate {
    /// Replace the stored network weights only
    Weights(NetworkState),
    /// Restore a previously persisted model artifact
    Artifact(ModelArtifact),
}

/// Manages MLP models for a fixed predictor set and target
#[derive(Debug)]
pub struct MlpModel {
    predictors: Vec<String>,
    to_predict: String,
    key_var: String,
    options: ModelOptions,
    search: SearchConfig,
    scaler: Option<ColumnScaler>,
    best_config: Option<NetworkConfig>,
    weights: Option<NetworkState>,
    stats: Option<HashMap<String, f64>>,
}

impl MlpModel {
    /// Create a model manager
    pub fn new(
        predictors: Vec<String>,
        to_predict: impl Into<String>,
        key_var: impl Into<String>,
        options: ModelOptions,
    ) -> Self {
        let search = SearchConfig { seed: options.seed, ..Default::default() };
        Self {
            predictors,
            to_predict: to_predict.into(),
            key_var: key_var.into(),
            options,
            search,
            scaler: None,
            best_config: None,
            weights: None,
            stats: None,
        }
    }

    /// Create a model manager from string option pairs (see
    /// [`ModelOptions::from_pairs`] for the boundary semantics)
    pub fn from_pairs(
        predictors: Vec<String>,
        to_predict: impl Into<String>,
        key_var: impl Into<String>,
        pairs: &[(&str, &str)],
    ) -> Result<Self> {
        let options = ModelOptions::from_pairs(pairs)?;
        Ok(Self::new(predictors, to_predict, key_var, options))
    }

    /// Override the search configuration (trial count, rung policy)
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Predictor column names
    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    /// Target column name
    pub fn to_predict(&self) -> &str {
        &self.to_predict
    }

    /// Key/id column name
    pub fn key_var(&self) -> &str {
        &self.key_var
    }

    /// Stats from the last fit
    pub fn stats(&self) -> Option<&HashMap<String, f64>> {
        self.stats.as_ref()
    }

    /// Whether a fit has completed (or an artifact was restored)
    pub fn is_fitted(&self) -> bool {
        self.scaler.is_some() && self.weights.is_some() && self.best_config.is_some()
    }

    /// Train on the table: split, scale, search, materialize the winner, and
    /// compute final stats over the whole input.
    pub fn fit(&mut self, df: &DataFrame) -> Result<FitOutcome> {
        let start = Instant::now();
        info!("training the MLP model");

        let x = data::extract_matrix(df, &self.predictors)?;
        let y = data::extract_labels(df, &self.to_predict)?;
        if x.nrows() < 2 {
            return Err(SpareError::DataError(format!(
                "need at least 2 rows to fit, got {}",
                x.nrows()
            )));
        }

        let (train_idx, val_idx) =
            data::train_val_split(x.nrows(), VALIDATION_FRACTION, self.options.seed);
        let x_train = data::take_rows(&x, &train_idx);
        let y_train = data::take_values(&y, &train_idx);
        let x_val = data::take_rows(&x, &val_idx);
        let y_val = data::take_values(&y, &val_idx);

        // Scaler sees the training split only.
        let mut scaler = ColumnScaler::new();
        let x_train = scaler.fit_transform(&x_train, &self.predictors)?;
        let x_val = scaler.transform(&x_val)?;

        let train_ds = TabularDataset::new(x_train, y_train)?;
        let val_ds = TabularDataset::new(x_val, y_val)?;

        let resources = ComputeResources::detect();
        let plan = ResourcePlan::from_options(&self.options);
        let coordinator = SearchCoordinator::new(self.search.clone(), plan, resources);
        let best = coordinator.run(
            self.options.task,
            &train_ds,
            &val_ds,
            self.options.batch_size,
            self.options.num_epochs,
        )?;

        let mut net = SpareNet::new(
            self.predictors.len(),
            best.config.clone(),
            self.options.task,
            self.options.seed,
        );
        net.load_state(&best.network)?;

        let x_all = scaler.transform(&x)?;
        let predicted = net.predict_chunked(&x_all, plan.lanes_per_trial);

        let mut stats = evaluate(&predicted, &y, self.options.task);
        let training_time = (start.elapsed().as_secs_f64() * 1e4).round() / 1e4;
        stats.insert("training_time".to_string(), training_time);
        self.log_stats(&stats);

        self.scaler = Some(scaler.clone());
        self.best_config = Some(best.config.clone());
        self.weights = Some(best.network.clone());
        self.stats = Some(stats.clone());

        Ok(FitOutcome {
            predicted,
            network: net,
            stats,
            best_config: best.config,
            weights: best.network,
            scaler,
        })
    }

    /// Predict on a new table with the stored scaler and weights.
    ///
    /// Returns raw scores for regression, thresholded 0/1 labels for
    /// classification. Fails when no fit has stored a model.
    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f32>> {
        let (scaler, config, weights) = match (&self.scaler, &self.best_config, &self.weights) {
            (Some(scaler), Some(config), Some(weights)) => (scaler, config, weights),
            _ => return Err(SpareError::ModelNotFitted),
        };

        let x = data::extract_matrix(df, &self.predictors)?;
        let x = scaler.transform(&x)?;

        let mut net = SpareNet::new(
            self.predictors.len(),
            config.clone(),
            self.options.task,
            self.options.seed,
        );
        net.load_state(weights)?;

        let scores = net.forward_eval(&x);
        Ok(match self.options.task {
            TaskType::Regression => scores,
            TaskType::Classification => scores.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }),
        })
    }

    /// Override stored parameters: either the network weights alone, or a
    /// full persisted artifact.
    pub fn set_parameters(&mut self, update: ParameterUpdate) {
        match update {
            ParameterUpdate::Weights(weights) => {
                self.weights = Some(weights);
            }
            ParameterUpdate::Artifact(artifact) => {
                self.predictors = artifact.predictors;
                self.to_predict = artifact.to_predict;
                self.key_var = artifact.key_var;
                self.options.task = artifact.task;
                self.scaler = Some(artifact.scaler);
                self.best_config = Some(artifact.config);
                self.weights = Some(artifact.weights);
                self.stats = Some(artifact.stats);
            }
        }
    }

    /// Export the fitted model for persistence
    pub fn artifact(&self) -> Result<ModelArtifact> {
        match (&self.scaler, &self.best_config, &self.weights) {
            (Some(scaler), Some(config), Some(weights)) => Ok(ModelArtifact {
                predictors: self.predictors.clone(),
                to_predict: self.to_predict.clone(),
                key_var: self.key_var.clone(),
                task: self.options.task,
                scaler: scaler.clone(),
                config: config.clone(),
                weights: weights.clone(),
                stats: self.stats.clone().unwrap_or_default(),
            }),
            _ => Err(SpareError::ModelNotFitted),
        }
    }

    fn log_stats(&self, stats: &HashMap<String, f64>) {
        let keys: &[&str] = match self.options.task {
            TaskType::Regression => &["MAE", "RMSE", "R2"],
            TaskType::Classification => &[
                "AUC",
                "Accuracy",
                "Sensitivity",
                "Specificity",
                "Precision",
                "Recall",
                "F1",
            ],
        };
        for key in keys {
            if let Some(value) = stats.get(*key) {
                info!(">> {key} = {value:.4}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn predictor_names() -> Vec<String> {
        vec!["roi1".to_string(), "roi2".to_string()]
    }

    fn tiny_df() -> DataFrame {
        df!(
            "id" => &["a", "b", "c", "d", "e", "f", "g", "h"],
            "roi1" => &[0.1, 0.9, 0.2, 0.8, 0.15, 0.85, 0.25, 0.75],
            "roi2" => &[0.2, 0.8, 0.1, 0.9, 0.25, 0.75, 0.15, 0.85],
            "age" => &[1.0, 3.0, 1.2, 2.8, 1.1, 2.9, 1.3, 2.7]
        )
        .unwrap()
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = MlpModel::new(predictor_names(), "age", "id", ModelOptions::default());
        let err = model.predict(&tiny_df()).unwrap_err();
        assert!(matches!(err, SpareError::ModelNotFitted));
    }

    #[test]
    fn test_artifact_before_fit_fails() {
        let model = MlpModel::new(predictor_names(), "age", "id", ModelOptions::default());
        assert!(matches!(model.artifact(), Err(SpareError::ModelNotFitted)));
    }

    #[test]
    fn test_set_parameters_artifact_enables_predict() {
        let options = ModelOptions::default().with_num_epochs(2);
        let mut trained = MlpModel::new(predictor_names(), "age", "id", options.clone())
            .with_search(SearchConfig::default().with_num_trials(2));
        trained.fit(&tiny_df()).unwrap();
        let artifact = trained.artifact().unwrap();

        let mut fresh = MlpModel::new(predictor_names(), "age", "id", options);
        assert!(!fresh.is_fitted());
        fresh.set_parameters(ParameterUpdate::Artifact(artifact));
        assert!(fresh.is_fitted());

        let a = trained.predict(&tiny_df()).unwrap();
        let b = fresh.predict(&tiny_df()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_requires_known_columns() {
        let mut model = MlpModel::new(
            vec!["missing".to_string()],
            "age",
            "id",
            ModelOptions::default(),
        );
        assert!(matches!(
            model.fit(&tiny_df()),
            Err(SpareError::FeatureNotFound(_))
        ));
    }
}
