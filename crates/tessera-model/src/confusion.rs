//! Confusion matrix and per-class classification metrics.

use std::fmt;

use tessera_data::DataError;

use crate::ModelError;

/// A confusion matrix for multi-class classification.
///
/// Entry `matrix[true_class][predicted_class]` counts how many samples
/// with true label `true_class` were predicted as `predicted_class`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone)]
pub struct ClassMetrics {
    /// The class index.
    pub class: usize,
    /// Precision: TP / (TP + FP). 0.0 if no predictions for this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no true samples for this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of true samples in this class.
    pub support: usize,
}

/// One-vs-rest counts of a single positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryCounts {
    /// Positive samples predicted positive.
    pub tp: usize,
    /// Negative samples predicted negative.
    pub tn: usize,
    /// Negative samples predicted positive.
    pub fp: usize,
    /// Positive samples predicted negative.
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from paired true and predicted labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::Data`] | Zero labels provided |
    /// | [`ModelError::ClassOutOfRange`] | A label is `>= n_classes` |
    pub fn from_labels(
        true_labels: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, ModelError> {
        if true_labels.is_empty() {
            return Err(DataError::EmptyDataset.into());
        }
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (&t, &p) in true_labels.iter().zip(predicted) {
            let class = t.max(p);
            if class >= n_classes {
                return Err(ModelError::ClassOutOfRange { class, n_classes });
            }
            matrix[t][p] += 1;
        }
        Ok(Self { matrix, n_classes })
    }

    /// Overall accuracy: proportion of correct predictions.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes).map(|i| self.matrix[i][i]).sum();
        ratio(correct, self.total())
    }

    /// Return the number of counted samples.
    #[must_use]
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Collapse to one-vs-rest counts for `positive`.
    #[must_use]
    pub fn binary(&self, positive: usize) -> BinaryCounts {
        let mut counts = BinaryCounts {
            tp: 0,
            tn: 0,
            fp: 0,
            fn_: 0,
        };
        for (t, row) in self.matrix.iter().enumerate() {
            for (p, &n) in row.iter().enumerate() {
                match (t == positive, p == positive) {
                    (true, true) => counts.tp += n,
                    (false, false) => counts.tn += n,
                    (false, true) => counts.fp += n,
                    (true, false) => counts.fn_ += n,
                }
            }
        }
        counts
    }

    /// Per-class precision, recall, F1, and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        (0..self.n_classes)
            .map(|c| {
                let BinaryCounts { tp, fp, fn_, .. } = self.binary(c);
                let precision = ratio(tp, tp + fp);
                let recall = ratio(tp, tp + fn_);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    class: c,
                    precision,
                    recall,
                    f1,
                    support: tp + fn_,
                }
            })
            .collect()
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

/// `num / den`, or 0.0 when `den` is zero.
pub(crate) fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.n_classes {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f)?;

        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "true_{i:>3}")?;
            for val in row {
                write!(f, " {val:>7}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
