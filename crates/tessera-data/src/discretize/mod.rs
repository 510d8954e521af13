//! Continuous-to-discrete feature coding.
//!
//! A fitted [`Discretizer`] holds `bins - 1` non-decreasing cut points per
//! feature. The code of a value is the number of cut points less than or
//! equal to it, so every code lies in `[0, bins - 1]`. Values equal to the
//! unknown sentinel map to `None`. Entropy binning may leave `+inf` cuts,
//! so some of its codes are never produced.

mod cuts;
mod entropy;
mod kmeans;

use std::fmt;
use std::str::FromStr;

use tracing::{debug, instrument};

use crate::stream::{ModelReader, ModelWriter, StreamError};
use crate::{DataError, DataSet};

/// Maps a feature vector to per-feature integer codes.
pub trait Discretize {
    /// Return one code per feature; `None` marks an unknown value.
    ///
    /// # Errors
    ///
    /// Implementations fail when unfitted or when the vector has the wrong length.
    fn discretize(&self, values: &[f64]) -> Result<Vec<Option<usize>>, DataError>;

    /// Return the inclusive maximum code of every feature.
    fn ranges(&self) -> Vec<usize>;
}

/// Strategy used to place cut points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binning {
    /// Equally spaced cuts between the column minimum and maximum.
    EqualWidth,
    /// Cuts at empirical quantiles so bins hold similar sample counts.
    EqualFrequency,
    /// Cuts halfway between the sorted centers of a 1-D k-means clustering.
    KMeans,
    /// Class-aware cuts from recursive minimum-entropy splits with an MDL stop.
    Entropy,
}

impl Binning {
    /// Return the persisted tag of this strategy.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Binning::EqualWidth => "EqualWidthDiscretizer",
            Binning::EqualFrequency => "EqualFrequencyDiscretizer",
            Binning::KMeans => "KMeansDiscretizer",
            Binning::Entropy => "EntropyDiscretizer",
        }
    }

    /// Return the short descriptor name (`ewd`, `efd`, `kmd`, `ebd`).
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Binning::EqualWidth => "ewd",
            Binning::EqualFrequency => "efd",
            Binning::KMeans => "kmd",
            Binning::Entropy => "ebd",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        [
            Binning::EqualWidth,
            Binning::EqualFrequency,
            Binning::KMeans,
            Binning::Entropy,
        ]
        .into_iter()
            .find(|b| b.tag() == tag)
    }

    fn cut_points(self, known: &[f64], labels: &[usize], n_classes: usize, bins: usize) -> Vec<f64> {
        match self {
            Binning::EqualWidth => cuts::equal_width(known, bins),
            Binning::EqualFrequency => cuts::equal_frequency(known, bins),
            Binning::KMeans => kmeans::kmeans_cuts(known, bins, kmeans::MAX_ITER),
            Binning::Entropy => entropy::entropy_cuts(known, labels, n_classes, bins),
        }
    }
}

impl fmt::Display for Binning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Error returned when parsing an unrecognised binning name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown binning {0:?} (expected ewd, efd, kmd or ebd)")]
pub struct ParseBinningError(String);

impl FromStr for Binning {
    type Err = ParseBinningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ewd" => Ok(Binning::EqualWidth),
            "efd" => Ok(Binning::EqualFrequency),
            "kmd" | "kmcd" => Ok(Binning::KMeans),
            "ebd" | "entropy" => Ok(Binning::Entropy),
            other => Err(ParseBinningError(other.to_string())),
        }
    }
}

/// Per-feature cut-point discretizer.
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `unknown` | `None` (no sentinel tracking) |
#[derive(Debug, Clone, PartialEq)]
pub struct Discretizer {
    binning: Binning,
    bins: usize,
    unknown: Option<f64>,
    cuts: Vec<Vec<f64>>,
}

impl Discretizer {
    /// Create an unfitted discretizer.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidBinCount`] if `bins < 2`.
    pub fn new(binning: Binning, bins: usize) -> Result<Self, DataError> {
        if bins < 2 {
            return Err(DataError::InvalidBinCount { bins });
        }
        Ok(Self {
            binning,
            bins,
            unknown: None,
            cuts: Vec::new(),
        })
    }

    /// Treat values equal to `unknown` as missing.
    #[must_use]
    pub fn with_unknown(mut self, unknown: Option<f64>) -> Self {
        self.unknown = unknown;
        self
    }

    /// Return the binning strategy.
    #[must_use]
    pub fn binning(&self) -> Binning {
        self.binning
    }

    /// Return the number of bins per feature.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Return the unknown sentinel, if tracked.
    #[must_use]
    pub fn unknown(&self) -> Option<f64> {
        self.unknown
    }

    /// Return the fitted cut points of every feature.
    #[must_use]
    pub fn cut_points(&self) -> &[Vec<f64>] {
        &self.cuts
    }

    /// Return `true` once [`Discretizer::fit`] has succeeded.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.cuts.is_empty()
    }

    /// Fit cut points on every column of `data`, using its class labels
    /// for entropy binning.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptyDataset`] when `data` has no samples.
    pub fn fit(&mut self, data: &DataSet) -> Result<(), DataError> {
        if data.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        let columns: Vec<Vec<f64>> = (0..data.n_features()).map(|f| data.column(f)).collect();
        self.fit_columns(&columns, &data.labels())
    }

    /// Fit cut points on column-major values (`columns[feature][sample]`)
    /// with one class label per sample.
    ///
    /// Unknown values are excluded before placing cuts. Only entropy binning
    /// reads the labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::ZeroFeatures`] | `columns` is empty |
    /// | [`DataError::EmptyDataset`] | the first column is empty |
    /// | [`DataError::LabelCountMismatch`] | a column and `labels` differ in length |
    #[instrument(skip_all, fields(binning = %self.binning, bins = self.bins, n_features = columns.len()))]
    pub fn fit_columns(&mut self, columns: &[Vec<f64>], labels: &[usize]) -> Result<(), DataError> {
        let first = columns.first().ok_or(DataError::ZeroFeatures)?;
        if first.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        if let Some(col) = columns.iter().find(|c| c.len() != labels.len()) {
            return Err(DataError::LabelCountMismatch {
                expected: col.len(),
                got: labels.len(),
            });
        }
        let n_classes = labels.iter().max().map_or(0, |&m| m + 1);
        self.cuts = columns
            .iter()
            .map(|col| {
                let (known, known_labels): (Vec<f64>, Vec<usize>) = col
                    .iter()
                    .copied()
                    .zip(labels.iter().copied())
                    .filter(|&(v, _)| !self.is_unknown(v))
                    .unzip();
                self.binning
                    .cut_points(&known, &known_labels, n_classes, self.bins)
            })
            .collect();
        debug!("discretizer fitted");
        Ok(())
    }

    fn is_unknown(&self, value: f64) -> bool {
        self.unknown.is_some_and(|u| u == value)
    }

    /// Write the fitted state.
    pub fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), StreamError> {
        writer.tag(self.binning.tag())?;
        writer.value(self.bins)?;
        writer.optional(self.unknown)?;
        writer.value(self.cuts.len())?;
        for cuts in &self.cuts {
            writer.row(cuts)?;
        }
        Ok(())
    }

    /// Read a discretizer written by [`Discretizer::save`], dispatching on its tag.
    pub fn open(reader: &mut ModelReader<'_>) -> Result<Self, DataError> {
        let tag = reader.peek_tag()?;
        let binning = Binning::from_tag(&tag).ok_or_else(|| StreamError::Malformed {
            line: reader.line_number() + 1,
            expected: "discretizer tag",
            found: tag.clone(),
        })?;
        reader.expect_tag(binning.tag())?;
        let bins: usize = reader.value("bin count")?;
        if bins < 2 {
            return Err(DataError::InvalidBinCount { bins });
        }
        let unknown = reader.optional("unknown sentinel")?;
        let n_features: usize = reader.value("feature count")?;
        let cuts = (0..n_features)
            .map(|_| reader.row(bins - 1, "cut points"))
            .collect::<Result<Vec<Vec<f64>>, _>>()?;
        Ok(Self {
            binning,
            bins,
            unknown,
            cuts,
        })
    }
}

impl Discretize for Discretizer {
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::NotFitted`] | called before fitting |
    /// | [`DataError::FeatureCountMismatch`] | wrong vector length |
    /// | [`DataError::NonFiniteValue`] | a non-sentinel value is NaN or infinite |
    fn discretize(&self, values: &[f64]) -> Result<Vec<Option<usize>>, DataError> {
        if !self.is_fitted() {
            return Err(DataError::NotFitted { what: "discretizer" });
        }
        if values.len() != self.cuts.len() {
            return Err(DataError::FeatureCountMismatch {
                expected: self.cuts.len(),
                got: values.len(),
                sample_index: 0,
            });
        }
        values
            .iter()
            .zip(&self.cuts)
            .enumerate()
            .map(|(feature_index, (&v, cuts))| {
                if self.is_unknown(v) {
                    Ok(None)
                } else if !v.is_finite() {
                    Err(DataError::NonFiniteValue {
                        sample_index: 0,
                        feature_index,
                    })
                } else {
                    Ok(Some(cuts.partition_point(|&c| c <= v)))
                }
            })
            .collect()
    }

    fn ranges(&self) -> Vec<usize> {
        self.cuts.iter().map(Vec::len).collect()
    }
}
