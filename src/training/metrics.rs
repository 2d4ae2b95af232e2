//! Metrics evaluator
//!
//! Pure functions from (predicted scores, ground truth) to a name -> value
//! scorecard. Degenerate denominators (e.g. no predicted positives) propagate
//! as NaN rather than being special-cased; callers must handle NaN entries.

use std::collections::HashMap;

use ndarray::Array1;

use crate::config::TaskType;

/// Compute the task's scorecard from unthresholded scores and ground truth.
///
/// Classification thresholds scores at 0.5 for the confusion matrix; AUC is
/// computed from the raw scores. Regression reports MAE, RMSE and R2.
pub fn evaluate(scores: &Array1<f32>, labels: &Array1<f32>, task: TaskType) -> HashMap<String, f64> {
    match task {
        TaskType::Classification => classification_stats(scores, labels),
        TaskType::Regression => regression_stats(scores, labels),
    }
}

fn classification_stats(scores: &Array1<f32>, labels: &Array1<f32>) -> HashMap<String, f64> {
    let auc = roc_auc(scores, labels);

    let mut tp = 0.0_f64;
    let mut tn = 0.0_f64;
    let mut fp = 0.0_f64;
    let mut fn_ = 0.0_f64;
    for (&score, &label) in scores.iter().zip(labels.iter()) {
        let predicted = score >= 0.5;
        let actual = label >= 0.5;
        match (actual, predicted) {
            (true, true) => tp += 1.0,
            (false, false) => tn += 1.0,
            (false, true) => fp += 1.0,
            (true, false) => fn_ += 1.0,
        }
    }

    let accuracy = (tp + tn) / (tp + tn + fp + fn_);
    let sensitivity = tp / (tp + fn_);
    let specificity = tn / (tn + fp);
    let precision = tp / (tp + fp);
    let recall = sensitivity;
    let f1 = 2.0 * (precision * recall) / (precision + recall);

    let mut stats = HashMap::new();
    stats.insert("Accuracy".to_string(), accuracy);
    stats.insert("AUC".to_string(), auc);
    stats.insert("Sensitivity".to_string(), sensitivity);
    stats.insert("Specificity".to_string(), specificity);
    stats.insert("Balanced Accuracy".to_string(), (sensitivity + specificity) / 2.0);
    stats.insert("Precision".to_string(), precision);
    stats.insert("Recall".to_string(), recall);
    stats.insert("F1".to_string(), f1);
    stats
}

fn regression_stats(scores: &Array1<f32>, labels: &Array1<f32>) -> HashMap<String, f64> {
    let n = labels.len() as f64;
    let mae = scores
        .iter()
        .zip(labels.iter())
        .map(|(&p, &t)| (p as f64 - t as f64).abs())
        .sum::<f64>()
        / n;
    let mse = scores
        .iter()
        .zip(labels.iter())
        .map(|(&p, &t)| (p as f64 - t as f64).powi(2))
        .sum::<f64>()
        / n;

    let mean = labels.iter().map(|&t| t as f64).sum::<f64>() / n;
    let ss_tot = labels.iter().map(|&t| (t as f64 - mean).powi(2)).sum::<f64>();
    let ss_res = mse * n;
    let r2 = 1.0 - ss_res / ss_tot;

    let mut stats = HashMap::new();
    stats.insert("MAE".to_string(), mae);
    stats.insert("RMSE".to_string(), mse.sqrt());
    stats.insert("R2".to_string(), r2);
    stats
}

/// Area under the ROC curve via the tie-aware rank statistic.
///
/// NaN when either class is absent.
fn roc_auc(scores: &Array1<f32>, labels: &Array1<f32>) -> f64 {
    let n = scores.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(std::cmp::Ordering::Equal));

    // Average ranks over tied scores (1-based).
    let mut ranks = vec![0.0_f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let n_pos = labels.iter().filter(|&&t| t >= 0.5).count() as f64;
    let n_neg = n as f64 - n_pos;
    let rank_sum: f64 = labels
        .iter()
        .enumerate()
        .filter(|(_, &t)| t >= 0.5)
        .map(|(i, _)| ranks[i])
        .sum();

    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Fraction of thresholded predictions matching the labels
pub fn batch_accuracy(scores: &Array1<f32>, labels: &Array1<f32>) -> f64 {
    let correct = scores
        .iter()
        .zip(labels.iter())
        .filter(|(&p, &t)| (p >= 0.5) == (t >= 0.5))
        .count();
    correct as f64 / labels.len() as f64
}

/// Mean absolute error of a batch
pub fn batch_mae(scores: &Array1<f32>, labels: &Array1<f32>) -> f64 {
    scores
        .iter()
        .zip(labels.iter())
        .map(|(&p, &t)| (p as f64 - t as f64).abs())
        .sum::<f64>()
        / labels.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_perfect_classifier_scores_one_everywhere() {
        let labels = array![1.0_f32, 0.0, 1.0, 0.0, 1.0, 0.0];
        let scores = array![0.9_f32, 0.1, 0.8, 0.2, 0.95, 0.05];

        let stats = evaluate(&scores, &labels, TaskType::Classification);
        for key in ["Accuracy", "AUC", "Sensitivity", "Specificity", "Precision", "Recall", "F1", "Balanced Accuracy"] {
            assert_relative_eq!(stats[key], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_perfect_regressor() {
        let labels = array![1.0_f32, 2.0, 3.0, 4.0];
        let stats = evaluate(&labels.clone(), &labels, TaskType::Regression);
        assert_relative_eq!(stats["MAE"], 0.0, epsilon = 1e-12);
        assert_relative_eq!(stats["RMSE"], 0.0, epsilon = 1e-12);
        assert_relative_eq!(stats["R2"], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_known_confusion_matrix() {
        // tp=2, tn=2, fp=1, fn=1
        let labels = array![1.0_f32, 1.0, 1.0, 0.0, 0.0, 0.0];
        let scores = array![0.9_f32, 0.8, 0.1, 0.7, 0.2, 0.3];

        let stats = evaluate(&scores, &labels, TaskType::Classification);
        assert_relative_eq!(stats["Accuracy"], 4.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(stats["Sensitivity"], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stats["Specificity"], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stats["Precision"], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stats["F1"], 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_auc_with_ties() {
        let labels = array![1.0_f32, 0.0, 1.0, 0.0];
        let scores = array![0.5_f32, 0.5, 0.5, 0.5];
        let stats = evaluate(&scores, &labels, TaskType::Classification);
        assert_relative_eq!(stats["AUC"], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_denominators_are_nan() {
        // No predicted positives: precision undefined; no actual negatives
        // would make specificity undefined.
        let labels = array![1.0_f32, 1.0, 0.0];
        let scores = array![0.1_f32, 0.2, 0.3];
        let stats = evaluate(&scores, &labels, TaskType::Classification);
        assert!(stats["Precision"].is_nan());
        assert!(stats["F1"].is_nan());
        assert_relative_eq!(stats["Sensitivity"], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_class_auc_is_nan() {
        let labels = array![1.0_f32, 1.0, 1.0];
        let scores = array![0.9_f32, 0.8, 0.7];
        let stats = evaluate(&scores, &labels, TaskType::Classification);
        assert!(stats["AUC"].is_nan());
    }

    #[test]
    fn test_regression_known_values() {
        let labels = array![1.0_f32, 2.0, 3.0];
        let scores = array![2.0_f32, 2.0, 2.0];
        let stats = evaluate(&scores, &labels, TaskType::Regression);
        assert_relative_eq!(stats["MAE"], 2.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(stats["RMSE"], (2.0_f64 / 3.0).sqrt(), epsilon = 1e-6);
        assert_relative_eq!(stats["R2"], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_headline_helpers() {
        let labels = array![1.0_f32, 0.0, 1.0, 0.0];
        let scores = array![0.9_f32, 0.4, 0.3, 0.2];
        assert_relative_eq!(batch_accuracy(&scores, &labels), 0.75, epsilon = 1e-12);

        let preds = array![1.5_f32, 2.0];
        let truth = array![1.0_f32, 3.0];
        assert_relative_eq!(batch_mae(&preds, &truth), 0.75, epsilon = 1e-6);
    }
}
