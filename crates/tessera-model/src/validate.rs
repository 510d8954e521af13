//! Scalar quality measures over a confusion matrix.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use tessera_data::DataSet;
use tracing::{info, instrument};

use crate::classifier::Classifier;
use crate::confusion::{BinaryCounts, ConfusionMatrix, ratio};
use crate::ModelError;

/// A scalar measure of classification quality.
///
/// All measures except [`Metric::Accuracy`] are one-vs-rest against the
/// validator's positive class. A zero denominator yields 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Correct predictions over all predictions.
    Accuracy,
    /// TP / (TP + FP).
    Precision,
    /// TP / (TP + FN), also called recall.
    Sensitivity,
    /// TN / (TN + FP).
    Specificity,
    /// Mean of sensitivity and specificity.
    BalancedAccuracy,
    /// Harmonic mean of precision and sensitivity.
    F1,
    /// Positive predictive value, TP / (TP + FP).
    Ppv,
    /// Negative predictive value, TN / (TN + FN).
    Npv,
    /// FP / (FP + TN).
    FalsePositiveRate,
    /// FP / (FP + TP).
    FalseDiscoveryRate,
}

impl Metric {
    /// Every metric, in display order.
    pub const ALL: [Metric; 10] = [
        Metric::Accuracy,
        Metric::Precision,
        Metric::Sensitivity,
        Metric::Specificity,
        Metric::BalancedAccuracy,
        Metric::F1,
        Metric::Ppv,
        Metric::Npv,
        Metric::FalsePositiveRate,
        Metric::FalseDiscoveryRate,
    ];

    /// Return the canonical short name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::Precision => "precision",
            Metric::Sensitivity => "sensitivity",
            Metric::Specificity => "specificity",
            Metric::BalancedAccuracy => "balanced_accuracy",
            Metric::F1 => "f1",
            Metric::Ppv => "ppv",
            Metric::Npv => "npv",
            Metric::FalsePositiveRate => "fpr",
            Metric::FalseDiscoveryRate => "fdr",
        }
    }

    fn from_counts(self, c: BinaryCounts) -> f64 {
        let BinaryCounts { tp, tn, fp, fn_ } = c;
        match self {
            Metric::Accuracy => ratio(tp + tn, tp + tn + fp + fn_),
            Metric::Precision | Metric::Ppv => ratio(tp, tp + fp),
            Metric::Sensitivity => ratio(tp, tp + fn_),
            Metric::Specificity => ratio(tn, tn + fp),
            Metric::BalancedAccuracy => {
                (Metric::Sensitivity.from_counts(c) + Metric::Specificity.from_counts(c)) / 2.0
            }
            Metric::F1 => ratio(2 * tp, 2 * tp + fn_ + fp),
            Metric::Npv => ratio(tn, tn + fn_),
            Metric::FalsePositiveRate => ratio(fp, fp + tn),
            Metric::FalseDiscoveryRate => ratio(fp, fp + tp),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown metric name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric {0:?}")]
pub struct ParseMetricError(pub String);

impl FromStr for Metric {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acc" | "accuracy" => Ok(Metric::Accuracy),
            "prec" | "precision" => Ok(Metric::Precision),
            "sens" | "sensitivity" | "recall" | "tpr" => Ok(Metric::Sensitivity),
            "spec" | "specificity" | "tnr" => Ok(Metric::Specificity),
            "balacc" | "balanced_accuracy" => Ok(Metric::BalancedAccuracy),
            "f1" => Ok(Metric::F1),
            "ppv" => Ok(Metric::Ppv),
            "npv" => Ok(Metric::Npv),
            "fpr" => Ok(Metric::FalsePositiveRate),
            "fdr" => Ok(Metric::FalseDiscoveryRate),
            _ => Err(ParseMetricError(s.to_string())),
        }
    }
}

/// Scores a confusion matrix with one [`Metric`].
///
/// # Defaults
///
/// | Parameter        | Default |
/// |------------------|---------|
/// | `positive_class` | 1       |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    metric: Metric,
    positive_class: usize,
}

impl Validator {
    /// Create a validator for `metric` with class 1 as the positive class.
    #[must_use]
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            positive_class: 1,
        }
    }

    /// Set the class treated as positive by one-vs-rest measures.
    #[must_use]
    pub fn with_positive_class(mut self, positive_class: usize) -> Self {
        self.positive_class = positive_class;
        self
    }

    /// Return the metric.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Return the positive class.
    #[must_use]
    pub fn positive_class(&self) -> usize {
        self.positive_class
    }

    /// Score a confusion matrix.
    #[must_use]
    pub fn score(&self, confusion: &ConfusionMatrix) -> f64 {
        match self.metric {
            Metric::Accuracy => confusion.accuracy(),
            m => m.from_counts(confusion.binary(self.positive_class)),
        }
    }
}

/// Outcome of scoring a classifier on a dataset.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The metric that produced `score`.
    pub metric: Metric,
    /// The scalar score.
    pub score: f64,
    /// Counts of true against predicted classes.
    pub confusion: ConfusionMatrix,
}

/// Predict every sample of `data` in parallel.
///
/// # Errors
///
/// Returns the first classification error encountered.
pub fn predict_all(model: &dyn Classifier, data: &DataSet) -> Result<Vec<usize>, ModelError> {
    data.samples()
        .par_iter()
        .map(|s| model.predict(s.values()))
        .collect()
}

/// Classify every sample of `data` and score the predictions.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ModelError::Data`] | `data` is empty |
/// | Other model errors | From classification |
#[instrument(skip_all, fields(tag = model.tag(), metric = %validator.metric(), n_samples = data.len()))]
pub fn evaluate(
    model: &dyn Classifier,
    data: &DataSet,
    validator: &Validator,
) -> Result<Evaluation, ModelError> {
    let predicted = predict_all(model, data)?;
    score_predictions(&data.labels(), &predicted, data.n_classes(), validator)
}

pub(crate) fn score_predictions(
    labels: &[usize],
    predicted: &[usize],
    n_classes: usize,
    validator: &Validator,
) -> Result<Evaluation, ModelError> {
    let confusion = ConfusionMatrix::from_labels(labels, predicted, n_classes)?;
    let score = validator.score(&confusion);
    info!(score, accuracy = confusion.accuracy(), "evaluation complete");
    Ok(Evaluation {
        metric: validator.metric(),
        score,
        confusion,
    })
}
