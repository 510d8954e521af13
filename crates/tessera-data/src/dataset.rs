//! Labelled feature vectors with class and feature name tables.

use crate::DataError;

/// One labelled sample: ordered feature values, a class index and an optional weight.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
    class_index: usize,
    weight: Option<f64>,
}

impl FeatureVector {
    /// Create an unweighted sample.
    #[must_use]
    pub fn new(values: Vec<f64>, class_index: usize) -> Self {
        Self {
            values,
            class_index,
            weight: None,
        }
    }

    /// Attach a sample weight used in place of 1 when counting.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Return the feature values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Return the zero-based class index.
    #[must_use]
    pub fn class_index(&self) -> usize {
        self.class_index
    }

    /// Return the explicit weight, if any.
    #[must_use]
    pub fn weight(&self) -> Option<f64> {
        self.weight
    }

    /// Return the counting weight: the explicit weight or 1.
    #[must_use]
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

/// An ordered collection of [`FeatureVector`]s sharing class and feature name tables.
///
/// Every vector is validated on insertion: its length matches the feature
/// table, its class index is below the class count, its values are finite
/// (or equal to the caller's unknown sentinel, which is just a finite number)
/// and its weight, if present, is finite and non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    class_names: Vec<String>,
    feature_names: Vec<String>,
    preprocessing: Vec<String>,
    samples: Vec<FeatureVector>,
}

impl DataSet {
    /// Create an empty dataset.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::NoClasses`] | `class_names` is empty |
    /// | [`DataError::ZeroFeatures`] | `feature_names` is empty |
    pub fn new(class_names: Vec<String>, feature_names: Vec<String>) -> Result<Self, DataError> {
        if class_names.is_empty() {
            return Err(DataError::NoClasses);
        }
        if feature_names.is_empty() {
            return Err(DataError::ZeroFeatures);
        }
        Ok(Self {
            class_names,
            feature_names,
            preprocessing: Vec::new(),
            samples: Vec::new(),
        })
    }

    /// Build a dataset from row-major values and zero-based labels.
    ///
    /// Class names are the label numbers (`"0"`, `"1"`, ...) up to the largest
    /// label; feature names are `f0`, `f1`, ...
    ///
    /// # Errors
    ///
    /// Same as [`DataSet::new`] and [`DataSet::push`].
    pub fn from_rows(rows: &[Vec<f64>], labels: &[usize]) -> Result<Self, DataError> {
        let n_features = rows.first().map_or(0, Vec::len);
        let n_classes = labels.iter().max().map_or(0, |&m| m + 1);
        let class_names = (0..n_classes).map(|c| c.to_string()).collect();
        let feature_names = (0..n_features).map(|f| format!("f{f}")).collect();
        let mut data = Self::new(class_names, feature_names)?;
        for (row, &label) in rows.iter().zip(labels) {
            data.push(FeatureVector::new(row.clone(), label))?;
        }
        Ok(data)
    }

    /// Append a sample after validating it against the name tables.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::FeatureCountMismatch`] | vector length differs from the feature count |
    /// | [`DataError::ClassOutOfRange`] | class index is not below the class count |
    /// | [`DataError::NonFiniteValue`] | a value is NaN or infinite |
    /// | [`DataError::InvalidWeight`] | weight is negative or not finite |
    pub fn push(&mut self, vector: FeatureVector) -> Result<(), DataError> {
        let sample_index = self.samples.len();
        if vector.values.len() != self.feature_names.len() {
            return Err(DataError::FeatureCountMismatch {
                expected: self.feature_names.len(),
                got: vector.values.len(),
                sample_index,
            });
        }
        if vector.class_index >= self.class_names.len() {
            return Err(DataError::ClassOutOfRange {
                class_index: vector.class_index,
                n_classes: self.class_names.len(),
                sample_index,
            });
        }
        if let Some(feature_index) = vector.values.iter().position(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
        if let Some(weight) = vector.weight
            && !(weight.is_finite() && weight >= 0.0)
        {
            return Err(DataError::InvalidWeight {
                sample_index,
                weight,
            });
        }
        self.samples.push(vector);
        Ok(())
    }

    /// Record a preprocessing step applied to the values.
    #[must_use]
    pub fn with_preprocessing(mut self, step: impl Into<String>) -> Self {
        self.preprocessing.push(step.into());
        self
    }

    /// Return the samples in insertion order.
    #[must_use]
    pub fn samples(&self) -> &[FeatureVector] {
        &self.samples
    }

    /// Return the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Return `true` when the dataset holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Return the number of declared classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Return the class name table.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Return the feature name table.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the preprocessing provenance list.
    #[must_use]
    pub fn preprocessing(&self) -> &[String] {
        &self.preprocessing
    }

    /// Return the class index of every sample.
    #[must_use]
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(FeatureVector::class_index).collect()
    }

    /// Return one column of values.
    #[must_use]
    pub fn column(&self, feature: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s.values[feature]).collect()
    }

    /// Build a membership mask over this dataset's features for `names`.
    ///
    /// Entry `i` is `true` when feature `i` is named exactly in `names`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnknownFeature`] for the first name not present here.
    pub fn membership_mask(&self, names: &[String]) -> Result<Vec<bool>, DataError> {
        membership_mask(&self.feature_names, names)
    }

    /// Keep only the features whose mask entry is `true`, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::MaskLengthMismatch`] if the mask length differs from
    /// the feature count, or [`DataError::ZeroFeatures`] if it selects nothing.
    pub fn project(&self, mask: &[bool]) -> Result<Self, DataError> {
        if mask.len() != self.feature_names.len() {
            return Err(DataError::MaskLengthMismatch {
                expected: self.feature_names.len(),
                got: mask.len(),
            });
        }
        let feature_names: Vec<String> = select(&self.feature_names, mask);
        if feature_names.is_empty() {
            return Err(DataError::ZeroFeatures);
        }
        let samples = self
            .samples
            .iter()
            .map(|s| FeatureVector {
                values: select(&s.values, mask),
                class_index: s.class_index,
                weight: s.weight,
            })
            .collect();
        Ok(Self {
            class_names: self.class_names.clone(),
            feature_names,
            preprocessing: self.preprocessing.clone(),
            samples,
        })
    }
}

/// Build a membership mask over `available` for the exact names in `wanted`.
///
/// # Errors
///
/// Returns [`DataError::UnknownFeature`] for the first wanted name not in `available`.
pub fn membership_mask(available: &[String], wanted: &[String]) -> Result<Vec<bool>, DataError> {
    if let Some(missing) = wanted.iter().find(|w| !available.contains(w)) {
        return Err(DataError::UnknownFeature {
            name: missing.clone(),
        });
    }
    Ok(available.iter().map(|a| wanted.contains(a)).collect())
}

/// Copy the elements of `values` whose mask entry is `true`.
#[must_use]
pub fn select<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter(|&(_, &keep)| keep)
        .map(|(v, _)| v.clone())
        .collect()
}

/// Admission mask over the samples of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleMask(Vec<bool>);

impl SampleMask {
    /// Admit every one of `n` samples.
    #[must_use]
    pub fn all(n: usize) -> Self {
        Self(vec![true; n])
    }

    /// Admit exactly the listed sample indices out of `n`. Out-of-range indices are ignored.
    #[must_use]
    pub fn from_indices(n: usize, indices: &[usize]) -> Self {
        let mut mask = vec![false; n];
        for &i in indices {
            if let Some(slot) = mask.get_mut(i) {
                *slot = true;
            }
        }
        Self(mask)
    }

    /// Wrap a raw admission vector.
    #[must_use]
    pub fn from_vec(mask: Vec<bool>) -> Self {
        Self(mask)
    }

    /// Check the mask covers a dataset of `n` samples.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::MaskLengthMismatch`] when lengths differ.
    pub fn check_len(&self, n: usize) -> Result<(), DataError> {
        if self.0.len() != n {
            return Err(DataError::MaskLengthMismatch {
                expected: n,
                got: self.0.len(),
            });
        }
        Ok(())
    }

    /// Return `true` when sample `i` is admitted.
    #[must_use]
    pub fn admits(&self, i: usize) -> bool {
        self.0.get(i).copied().unwrap_or(false)
    }

    /// Return the number of admitted samples.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    /// Return the admitted sample indices in ascending order.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect()
    }

    /// Return the mask length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return `true` when the mask covers no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve an optional mask into admitted indices, validating its length.
///
/// # Errors
///
/// Returns [`DataError::MaskLengthMismatch`] when the mask does not cover `n` samples.
pub fn admitted_indices(mask: Option<&SampleMask>, n: usize) -> Result<Vec<usize>, DataError> {
    match mask {
        Some(m) => {
            m.check_len(n)?;
            Ok(m.indices())
        }
        None => Ok((0..n).collect()),
    }
}
