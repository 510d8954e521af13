//! Correlation-based feature subset selection.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tessera_data::{DataSet, DiscretizedDataSet};
use tracing::{info, instrument};

use crate::correlation::symmetric_uncertainty;
use crate::error::SelectError;
use crate::search::{SearchOperator, SearchState, greedy_search};

/// Pairwise correlations of a discretized dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlations {
    class: Vec<f64>,
    features: Vec<Vec<f64>>,
}

impl Correlations {
    /// Compute feature-class and feature-feature symmetric uncertainties.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::EmptyDataset`] when `data` has no samples.
    #[instrument(skip_all, fields(n_samples = data.len(), n_features = data.n_features()))]
    pub fn compute(data: &DiscretizedDataSet) -> Result<Self, SelectError> {
        if data.is_empty() {
            return Err(SelectError::EmptyDataset);
        }
        let n = data.n_features();
        let layout = data.layout();
        let columns: Vec<Vec<Option<usize>>> = (0..n).map(|f| data.column(f)).collect();
        let labels: Vec<Option<usize>> = data.labels().into_iter().map(Some).collect();
        let n_classes = data.n_classes();

        let class: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|f| symmetric_uncertainty(&columns[f], layout.cardinality(f), &labels, n_classes))
            .collect();

        let upper: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (i..n)
                    .map(|j| {
                        symmetric_uncertainty(
                            &columns[i],
                            layout.cardinality(i),
                            &columns[j],
                            layout.cardinality(j),
                        )
                    })
                    .collect()
            })
            .collect();
        let mut features = vec![vec![0.0f64; n]; n];
        for (i, row) in upper.iter().enumerate() {
            for (offset, &v) in row.iter().enumerate() {
                features[i][i + offset] = v;
                features[i + offset][i] = v;
            }
        }

        Ok(Self { class, features })
    }

    /// Build from precomputed values; `features` must be square and symmetric.
    #[must_use]
    pub fn from_values(class: Vec<f64>, features: Vec<Vec<f64>>) -> Self {
        Self { class, features }
    }

    /// Return the number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.class.len()
    }

    /// Return the correlation of every feature with the class.
    #[must_use]
    pub fn class_correlations(&self) -> &[f64] {
        &self.class
    }

    /// Return the correlation between features `i` and `j`.
    #[must_use]
    pub fn feature_correlation(&self, i: usize, j: usize) -> f64 {
        self.features[i][j]
    }

    /// Merit of the subset selected by `mask`.
    ///
    /// `k·a / sqrt(k + k(k−1)·b)` with `a` the mean feature-class correlation
    /// and `b` the mean over all ordered pairs of selected features, the
    /// diagonal included. Zero for the empty subset or a negative radicand.
    #[must_use]
    pub fn merit(&self, mask: &[bool]) -> f64 {
        let selected: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
            .collect();
        let k = selected.len();
        if k == 0 {
            return 0.0;
        }
        let kf = k as f64;
        let a = selected.iter().map(|&i| self.class[i]).sum::<f64>() / kf;
        let b = selected
            .iter()
            .flat_map(|&i| selected.iter().map(move |&j| (i, j)))
            .map(|(i, j)| self.features[i][j])
            .sum::<f64>()
            / (kf * kf);
        let radicand = kf + kf * (kf - 1.0) * b;
        if radicand <= 0.0 {
            return 0.0;
        }
        kf * a / radicand.sqrt()
    }
}

/// A feature-inclusion bitmask with its cached merit.
#[derive(Debug, Clone)]
pub struct SelectionState<'a> {
    mask: Vec<bool>,
    merit: f64,
    correlations: &'a Correlations,
}

impl<'a> SelectionState<'a> {
    /// The empty selection.
    #[must_use]
    pub fn empty(correlations: &'a Correlations) -> Self {
        Self::with_mask(vec![false; correlations.n_features()], correlations)
    }

    /// A selection with an explicit mask.
    #[must_use]
    pub fn with_mask(mask: Vec<bool>, correlations: &'a Correlations) -> Self {
        let merit = correlations.merit(&mask);
        Self {
            mask,
            merit,
            correlations,
        }
    }

    /// Return the inclusion mask.
    #[must_use]
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }
}

impl SearchState for SelectionState<'_> {
    fn merit(&self) -> f64 {
        self.merit
    }
}

/// Operator flipping the inclusion bit of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleFeature(pub usize);

impl<'a> SearchOperator<SelectionState<'a>> for ToggleFeature {
    fn apply(&self, state: &SelectionState<'a>) -> SelectionState<'a> {
        let mut mask = state.mask.clone();
        mask[self.0] = !mask[self.0];
        SelectionState::with_mask(mask, state.correlations)
    }
}

/// Outcome of a feature selection run.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSelection {
    mask: Vec<bool>,
    feature_names: Vec<String>,
    merit: f64,
    trace: Vec<f64>,
}

impl FeatureSelection {
    /// Return the zero-based indices of the selected features.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
            .collect()
    }

    /// Return the names of the selected features.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        tessera_data::select(&self.feature_names, &self.mask)
    }

    /// Return the inclusion mask over all features.
    #[must_use]
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Return the merit of the final subset.
    #[must_use]
    pub fn merit(&self) -> f64 {
        self.merit
    }

    /// Return the merit after each accepted search round.
    #[must_use]
    pub fn trace(&self) -> &[f64] {
        &self.trace
    }

    /// Project a dataset with the same feature order onto the selection.
    ///
    /// # Errors
    ///
    /// Propagates [`DataSet::project`] errors.
    pub fn apply(&self, data: &DataSet) -> Result<DataSet, SelectError> {
        Ok(data.project(&self.mask)?)
    }
}

/// Selects the feature subset of maximal correlation merit by greedy search.
#[derive(Debug, Clone, Default)]
pub struct CorrelationFeatureSelector;

impl CorrelationFeatureSelector {
    /// Create a selector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run the selection on a discretized dataset.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`SelectError::EmptyDataset`] | no samples |
    /// | [`SelectError::NoSignal`] | no single feature has positive merit |
    #[instrument(skip_all, fields(n_features = data.n_features()))]
    pub fn select(&self, data: &DiscretizedDataSet) -> Result<FeatureSelection, SelectError> {
        let correlations = Correlations::compute(data)?;
        let mut selection = self.select_with(&correlations)?;
        selection.feature_names = data.feature_names().to_vec();
        info!(
            n_selected = selection.indices().len(),
            merit = selection.merit,
            rounds = selection.trace.len(),
            "feature selection complete"
        );
        Ok(selection)
    }

    /// Run the search over precomputed correlations.
    ///
    /// Feature names default to `f0`, `f1`, ...
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::NoSignal`] when the search cannot leave the empty selection.
    pub fn select_with(&self, correlations: &Correlations) -> Result<FeatureSelection, SelectError> {
        let n = correlations.n_features();
        let operators: Vec<ToggleFeature> = (0..n).map(ToggleFeature).collect();
        let outcome = greedy_search(SelectionState::empty(correlations), &operators);
        if outcome.rounds() == 0 {
            return Err(SelectError::NoSignal { n_features: n });
        }
        Ok(FeatureSelection {
            mask: outcome.best.mask.clone(),
            feature_names: (0..n).map(|f| format!("f{f}")).collect(),
            merit: outcome.best.merit,
            trace: outcome.trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlations() -> Correlations {
        // f0 strongly predictive, f1 a near copy of f0, f2 weak but independent.
        Correlations::from_values(
            vec![0.8, 0.75, 0.3],
            vec![
                vec![1.0, 0.95, 0.0],
                vec![0.95, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        )
    }

    #[test]
    fn empty_subset_has_zero_merit() {
        assert_eq!(correlations().merit(&[false, false, false]), 0.0);
    }

    #[test]
    fn single_feature_merit_is_its_class_correlation() {
        // k = 1: 1·a / sqrt(1 + 0) = a
        assert!((correlations().merit(&[true, false, false]) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn redundant_feature_is_not_added() {
        let sel = CorrelationFeatureSelector::new()
            .select_with(&correlations())
            .unwrap();
        assert!(sel.mask()[0]);
        assert!(!sel.mask()[1]);
        assert!(sel.trace().windows(2).all(|w| w[1] >= w[0]));
        assert!((sel.merit() - *sel.trace().last().unwrap()).abs() < 1e-12);
    }

    #[test]
    fn zero_signal_is_a_configuration_error() {
        let flat = Correlations::from_values(vec![0.0, 0.0], vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let err = CorrelationFeatureSelector::new().select_with(&flat).unwrap_err();
        assert!(matches!(err, SelectError::NoSignal { n_features: 2 }));
    }

    #[test]
    fn toggle_flips_one_bit() {
        let c = correlations();
        let s = SelectionState::empty(&c);
        let t = ToggleFeature(2).apply(&s);
        assert_eq!(t.mask(), &[false, false, true]);
        let back = ToggleFeature(2).apply(&t);
        assert_eq!(back.mask(), &[false, false, false]);
        assert_eq!(back.merit(), 0.0);
    }
}
