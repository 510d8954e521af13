//! Integer-coded datasets with a flattened (feature, code) index.

use crate::discretize::Discretize;
use crate::{DataError, DataSet};

/// One discretized sample.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteVector {
    codes: Vec<Option<usize>>,
    class_index: usize,
    weight: Option<f64>,
}

impl DiscreteVector {
    /// Create a sample from codes (`None` = unknown) and a class index.
    #[must_use]
    pub fn new(codes: Vec<Option<usize>>, class_index: usize) -> Self {
        Self {
            codes,
            class_index,
            weight: None,
        }
    }

    /// Attach a counting weight.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Return the per-feature codes.
    #[must_use]
    pub fn codes(&self) -> &[Option<usize>] {
        &self.codes
    }

    /// Return the class index.
    #[must_use]
    pub fn class_index(&self) -> usize {
        self.class_index
    }

    /// Return the counting weight: the explicit weight or 1.
    #[must_use]
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

/// Cumulative offsets that flatten `(feature, code)` into one column index.
///
/// Feature `f` owns the columns `offset(f) ..= offset(f) + range(f)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLayout {
    ranges: Vec<usize>,
    offsets: Vec<usize>,
    width: usize,
}

impl CodeLayout {
    /// Build the layout from inclusive per-feature ranges.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::LayoutOverflow`] when a range or the total
    /// width does not fit in `usize`.
    pub fn new(ranges: Vec<usize>) -> Result<Self, DataError> {
        let mut offsets = Vec::with_capacity(ranges.len());
        let mut next = 0usize;
        for (feature, &r) in ranges.iter().enumerate() {
            offsets.push(next);
            next = r
                .checked_add(1)
                .and_then(|k| next.checked_add(k))
                .ok_or(DataError::LayoutOverflow { feature })?;
        }
        Ok(Self {
            ranges,
            offsets,
            width: next,
        })
    }

    /// Return the inclusive range of every feature.
    #[must_use]
    pub fn ranges(&self) -> &[usize] {
        &self.ranges
    }

    /// Return the first flat column of every feature.
    #[must_use]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Return the number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.ranges.len()
    }

    /// Return the total number of flat columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Return the number of distinct codes of feature `f`.
    #[must_use]
    pub fn cardinality(&self, feature: usize) -> usize {
        self.ranges[feature] + 1
    }

    /// Map `(feature, code)` to its flat column.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::CodeOutOfRange`] when `code > range(feature)`.
    pub fn flat_index(&self, feature: usize, code: usize) -> Result<usize, DataError> {
        let range = self.ranges[feature];
        if code > range {
            return Err(DataError::CodeOutOfRange {
                feature,
                code,
                range,
            });
        }
        Ok(self.offsets[feature] + code)
    }
}

/// A dataset after discretization.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscretizedDataSet {
    samples: Vec<DiscreteVector>,
    layout: CodeLayout,
    n_classes: usize,
    feature_names: Vec<String>,
}

impl DiscretizedDataSet {
    /// Discretize every sample of `data`.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`Discretize::discretize`] and
    /// [`CodeLayout::new`].
    pub fn from_dataset(data: &DataSet, discretizer: &impl Discretize) -> Result<Self, DataError> {
        let samples = data
            .samples()
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let codes = discretizer.discretize(s.values()).map_err(|e| match e {
                    DataError::NonFiniteValue { feature_index, .. } => DataError::NonFiniteValue {
                        sample_index: i,
                        feature_index,
                    },
                    other => other,
                })?;
                Ok(DiscreteVector {
                    codes,
                    class_index: s.class_index(),
                    weight: s.weight(),
                })
            })
            .collect::<Result<Vec<_>, DataError>>()?;
        Ok(Self {
            samples,
            layout: CodeLayout::new(discretizer.ranges())?,
            n_classes: data.n_classes(),
            feature_names: data.feature_names().to_vec(),
        })
    }

    /// Build from pre-coded samples and inclusive ranges.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::NoClasses`] | `n_classes` is zero |
    /// | [`DataError::FeatureCountMismatch`] | a sample has the wrong number of codes |
    /// | [`DataError::ClassOutOfRange`] | a class index is not below `n_classes` |
    /// | [`DataError::CodeOutOfRange`] | a code exceeds its feature's range |
    /// | [`DataError::LayoutOverflow`] | the ranges overflow the flattened width |
    pub fn from_codes(
        samples: Vec<DiscreteVector>,
        ranges: Vec<usize>,
        n_classes: usize,
    ) -> Result<Self, DataError> {
        if n_classes == 0 {
            return Err(DataError::NoClasses);
        }
        let layout = CodeLayout::new(ranges)?;
        for (sample_index, s) in samples.iter().enumerate() {
            if s.codes.len() != layout.n_features() {
                return Err(DataError::FeatureCountMismatch {
                    expected: layout.n_features(),
                    got: s.codes.len(),
                    sample_index,
                });
            }
            if s.class_index >= n_classes {
                return Err(DataError::ClassOutOfRange {
                    class_index: s.class_index,
                    n_classes,
                    sample_index,
                });
            }
            for (feature, code) in s.codes.iter().enumerate() {
                if let Some(code) = *code {
                    layout.flat_index(feature, code)?;
                }
            }
        }
        let feature_names = (0..layout.n_features()).map(|f| format!("f{f}")).collect();
        Ok(Self {
            samples,
            layout,
            n_classes,
            feature_names,
        })
    }

    /// Return the samples.
    #[must_use]
    pub fn samples(&self) -> &[DiscreteVector] {
        &self.samples
    }

    /// Return the flattening layout.
    #[must_use]
    pub fn layout(&self) -> &CodeLayout {
        &self.layout
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.layout.n_features()
    }

    /// Return the feature names carried over from the source dataset.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Return `true` when there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Return one column of codes.
    #[must_use]
    pub fn column(&self, feature: usize) -> Vec<Option<usize>> {
        self.samples.iter().map(|s| s.codes[feature]).collect()
    }

    /// Return the class column.
    #[must_use]
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.class_index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretize::{Binning, Discretizer};

    #[test]
    fn offsets_are_cumulative() {
        let layout = CodeLayout::new(vec![1, 3, 0]).unwrap();
        assert_eq!(layout.offsets(), &[0, 2, 6]);
        assert_eq!(layout.width(), 7);
        assert_eq!(layout.flat_index(1, 3).unwrap(), 5);
        assert_eq!(layout.cardinality(2), 1);
    }

    #[test]
    fn flat_index_rejects_out_of_range() {
        let layout = CodeLayout::new(vec![1]).unwrap();
        assert!(matches!(
            layout.flat_index(0, 2),
            Err(DataError::CodeOutOfRange {
                feature: 0,
                code: 2,
                range: 1
            })
        ));
    }

    #[test]
    fn overflowing_ranges_are_rejected() {
        assert!(matches!(
            CodeLayout::new(vec![usize::MAX]),
            Err(DataError::LayoutOverflow { feature: 0 })
        ));
        assert!(matches!(
            CodeLayout::new(vec![3, usize::MAX / 2, usize::MAX / 2]),
            Err(DataError::LayoutOverflow { feature: 2 })
        ));
    }

    #[test]
    fn from_dataset_carries_labels_and_ranges() {
        let data = DataSet::from_rows(&[vec![0.0, 5.0], vec![1.0, 7.0]], &[0, 1]).unwrap();
        let mut d = Discretizer::new(Binning::EqualWidth, 3).unwrap();
        d.fit(&data).unwrap();
        let coded = DiscretizedDataSet::from_dataset(&data, &d).unwrap();
        assert_eq!(coded.layout().ranges(), &[2, 2]);
        assert_eq!(coded.labels(), vec![0, 1]);
        assert_eq!(coded.column(0), vec![Some(0), Some(2)]);
    }

    #[test]
    fn from_codes_validates() {
        let err = DiscretizedDataSet::from_codes(
            vec![DiscreteVector::new(vec![Some(4)], 0)],
            vec![3],
            2,
        )
        .unwrap_err();
        assert!(matches!(err, DataError::CodeOutOfRange { code: 4, .. }));
    }
}
