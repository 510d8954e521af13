//! The classifier contract shared by every model kind.

use std::fmt;

use tessera_data::{DataSet, ModelReader, ModelWriter, SampleMask};

use crate::{ModelError, ModelSpec};

/// A trainable, persistable classifier.
///
/// Persisted state always starts with [`Classifier::tag`] on its own line,
/// followed by the [`ModelHeader`] and the kind's own fields. `open` expects
/// to re-read that tag line itself.
pub trait Classifier: fmt::Debug + Send + Sync {
    /// Return the globally unique type tag.
    fn tag(&self) -> &'static str;

    /// Return a descriptor that rebuilds an untrained copy with the same hyperparameters.
    fn spec(&self) -> ModelSpec;

    /// Return the class, feature and preprocessing names learned at training time.
    fn header(&self) -> &ModelHeader;

    /// Return `true` once the classifier can classify.
    fn is_trained(&self) -> bool;

    /// Train on the samples of `data` admitted by `mask` (all when `None`).
    ///
    /// # Errors
    ///
    /// Kind-specific; see each implementation.
    fn train(&mut self, data: &DataSet, mask: Option<&SampleMask>) -> Result<(), ModelError>;

    /// Return the class distribution of one feature vector.
    ///
    /// # Errors
    ///
    /// Kind-specific; see each implementation.
    fn classify(&self, sample: &[f64]) -> Result<ClassDistribution, ModelError>;

    /// Write the full state, starting with the tag line.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotTrained`] for untrained models, or stream errors.
    fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError>;

    /// Replace the state with one read from `reader`.
    ///
    /// The state is only replaced once every field has been read successfully.
    ///
    /// # Errors
    ///
    /// Returns stream, version or tag errors for malformed input.
    fn open(&mut self, reader: &mut ModelReader<'_>) -> Result<(), ModelError>;

    /// Return the predicted class index of one feature vector.
    ///
    /// # Errors
    ///
    /// Same as [`Classifier::classify`].
    fn predict(&self, sample: &[f64]) -> Result<usize, ModelError> {
        Ok(self.classify(sample)?.predicted_class())
    }
}

/// Class, feature and preprocessing names carried by every model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelHeader {
    class_names: Vec<String>,
    feature_names: Vec<String>,
    preprocessing: Vec<String>,
}

impl ModelHeader {
    /// Create a header from explicit name tables.
    #[must_use]
    pub fn new(class_names: Vec<String>, feature_names: Vec<String>) -> Self {
        Self {
            class_names,
            feature_names,
            preprocessing: Vec::new(),
        }
    }

    /// Copy the name tables of a dataset.
    #[must_use]
    pub fn from_dataset(data: &DataSet) -> Self {
        Self {
            class_names: data.class_names().to_vec(),
            feature_names: data.feature_names().to_vec(),
            preprocessing: data.preprocessing().to_vec(),
        }
    }

    /// Return the class names.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the preprocessing provenance.
    #[must_use]
    pub fn preprocessing(&self) -> &[String] {
        &self.preprocessing
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Return the number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Fail unless `sample` has exactly one value per feature.
    pub(crate) fn check_dimension(&self, sample: &[f64]) -> Result<(), ModelError> {
        if sample.len() != self.feature_names.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.feature_names.len(),
                got: sample.len(),
            });
        }
        Ok(())
    }

    /// Write the three name tables.
    pub fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError> {
        writer.names(&self.class_names)?;
        writer.names(&self.feature_names)?;
        writer.names(&self.preprocessing)?;
        Ok(())
    }

    /// Read the three name tables.
    pub fn open(reader: &mut ModelReader<'_>) -> Result<Self, ModelError> {
        Ok(Self {
            class_names: reader.names("class names")?,
            feature_names: reader.names("feature names")?,
            preprocessing: reader.names("preprocessing names")?,
        })
    }
}

/// Class probability distribution from a classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDistribution {
    probs: Vec<f64>,
}

impl ClassDistribution {
    /// Wrap a distribution.
    #[must_use]
    pub fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Normalize non-negative scores to sum to one.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DegenerateScores`] when the scores sum to zero or
    /// are not finite.
    pub fn from_scores(mut scores: Vec<f64>) -> Result<Self, ModelError> {
        let total: f64 = scores.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(ModelError::DegenerateScores);
        }
        scores.iter_mut().for_each(|s| *s /= total);
        Ok(Self { probs: scores })
    }

    /// Normalize natural-log scores: shift by the maximum, exponentiate, then
    /// normalize. A score of `-inf` becomes probability 0.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DegenerateScores`] when every score is `-inf`
    /// or any score is NaN.
    pub fn from_log_scores(log_scores: Vec<f64>) -> Result<Self, ModelError> {
        if log_scores.iter().any(|l| l.is_nan()) {
            return Err(ModelError::DegenerateScores);
        }
        let max = log_scores
            .iter()
            .copied()
            .filter(|l| l.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(ModelError::DegenerateScores);
        }
        Self::from_scores(log_scores.iter().map(|&l| (l - max).exp()).collect())
    }

    /// Turn one predicted label per voter into vote fractions.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ClassOutOfRange`] for a label outside `n_classes`,
    /// or [`ModelError::NoMembers`] when there are no votes.
    pub fn from_votes(votes: &[usize], n_classes: usize) -> Result<Self, ModelError> {
        if votes.is_empty() {
            return Err(ModelError::NoMembers);
        }
        let mut counts = vec![0.0f64; n_classes];
        for &v in votes {
            let slot = counts.get_mut(v).ok_or(ModelError::ClassOutOfRange {
                class: v,
                n_classes,
            })?;
            *slot += 1.0;
        }
        let n = votes.len() as f64;
        counts.iter_mut().for_each(|c| *c /= n);
        Ok(Self { probs: counts })
    }

    /// Return the predicted class: the arg max, lowest index on ties.
    #[must_use]
    pub fn predicted_class(&self) -> usize {
        let mut best = 0;
        for (i, &p) in self.probs.iter().enumerate() {
            if p > self.probs[best] {
                best = i;
            }
        }
        best
    }

    /// Return the probability of the predicted class.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.probs.get(self.predicted_class()).copied().unwrap_or(0.0)
    }

    /// Return the top-k classes sorted by descending probability.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<(usize, f64)> {
        let mut indexed: Vec<(usize, f64)> = self.probs.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        indexed.truncate(k);
        indexed
    }

    /// Return the probability distribution as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_go_to_the_lowest_index() {
        let d = ClassDistribution::new(vec![0.2, 0.4, 0.4]);
        assert_eq!(d.predicted_class(), 1);
        assert_eq!(d.top_k(2), vec![(1, 0.4), (2, 0.4)]);
    }

    #[test]
    fn unanimous_votes_have_full_confidence() {
        let d = ClassDistribution::from_votes(&[1, 1, 1, 1, 1], 3).unwrap();
        assert_eq!(d.predicted_class(), 1);
        assert_eq!(d.confidence(), 1.0);
    }

    #[test]
    fn split_vote_fractions() {
        let d = ClassDistribution::from_votes(&[0, 1, 0, 1, 0], 2).unwrap();
        assert_eq!(d.predicted_class(), 0);
        assert!((d.confidence() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn vote_outside_class_table_is_range_error() {
        let err = ClassDistribution::from_votes(&[0, 4], 2).unwrap_err();
        assert!(matches!(err, ModelError::ClassOutOfRange { class: 4, n_classes: 2 }));
    }

    #[test]
    fn zero_scores_are_degenerate() {
        let err = ClassDistribution::from_scores(vec![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, ModelError::DegenerateScores));
        let d = ClassDistribution::from_scores(vec![1.0, 3.0]).unwrap();
        assert_eq!(d.as_slice(), &[0.25, 0.75]);
    }

    #[test]
    fn log_scores_far_below_underflow_still_normalize() {
        // exp(-2000) underflows; the shifted form does not.
        let d = ClassDistribution::from_log_scores(vec![-2000.0, -2000.0 + 3.0_f64.ln()]).unwrap();
        assert_eq!(d.predicted_class(), 1);
        assert!((d.as_slice()[0] - 0.25).abs() < 1e-12);
        assert!((d.as_slice()[1] - 0.75).abs() < 1e-12);

        let d = ClassDistribution::from_log_scores(vec![f64::NEG_INFINITY, -5.0]).unwrap();
        assert_eq!(d.as_slice(), &[0.0, 1.0]);

        let err = ClassDistribution::from_log_scores(vec![f64::NEG_INFINITY; 2]).unwrap_err();
        assert!(matches!(err, ModelError::DegenerateScores));
    }

    #[test]
    fn header_round_trip() {
        let header = ModelHeader::new(
            vec!["neg".to_string(), "pos".to_string()],
            vec!["x".to_string()],
        );
        let mut buf = Vec::new();
        header.save(&mut ModelWriter::new(&mut buf)).unwrap();
        let mut src = buf.as_slice();
        assert_eq!(ModelHeader::open(&mut ModelReader::new(&mut src)).unwrap(), header);
    }
}
