//! Smoothed class-conditional frequency tables over discretized features.

use tessera_data::{
    CodeLayout, DiscretizedDataSet, ModelReader, ModelWriter, SampleMask, StreamError,
    admitted_indices,
};
use tracing::debug;

use crate::ModelError;

const TAG: &str = "FrequencyTable";

/// Rows are classes, columns are flattened `(feature, code)` pairs.
///
/// After estimation, `frequency(c, f, ·)` sums to 1 over the codes of `f`
/// for every class `c` with a non-zero smoothed denominator.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    layout: CodeLayout,
    n_classes: usize,
    freqs: Vec<f64>,
    class_freqs: Vec<f64>,
}

fn flat_index(layout: &CodeLayout, feature: usize, code: usize) -> Result<usize, ModelError> {
    layout
        .flat_index(feature, code)
        .map_err(|_| ModelError::CodeOutOfRange {
            feature,
            code,
            range: layout.ranges()[feature],
        })
}

impl FrequencyTable {
    /// Count and smooth the admitted samples of `data`.
    ///
    /// Each admitted sample adds its weight (1 when unweighted) to its class
    /// count and to the cell of every known code. With `K_f` codes for
    /// feature `f` and smoothing `α`:
    ///
    /// - `track_unknown == false`: `(count + α) / (classCount + α·K_f)`
    /// - `track_unknown == true`: `(count + α) / (known(c, f) + α·K_f)`, where
    ///   `known(c, f)` is the weight of class-`c` samples whose `f` is known
    ///
    /// Class frequencies are class counts divided by the number of admitted samples.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::InvalidSmoothing`] | `smoothing` negative or not finite |
    /// | [`ModelError::EmptyTraining`] | the mask admits no samples |
    /// | [`ModelError::CodeOutOfRange`] | a code exceeds its feature range |
    /// | [`ModelError::ZeroDenominator`] | `α = 0` and a class has no mass for a feature |
    pub fn estimate(
        data: &DiscretizedDataSet,
        mask: Option<&SampleMask>,
        smoothing: f64,
        track_unknown: bool,
    ) -> Result<Self, ModelError> {
        if !(smoothing.is_finite() && smoothing >= 0.0) {
            return Err(ModelError::InvalidSmoothing { smoothing });
        }
        let admitted = admitted_indices(mask, data.len())?;
        if admitted.is_empty() {
            return Err(ModelError::EmptyTraining);
        }

        let layout = data.layout().clone();
        let n_classes = data.n_classes();
        let n_features = layout.n_features();
        let width = layout.width();

        let mut counts = vec![0.0f64; n_classes * width];
        let mut class_counts = vec![0.0f64; n_classes];
        let mut known = vec![0.0f64; n_classes * n_features];

        for &i in &admitted {
            let sample = &data.samples()[i];
            let c = sample.class_index();
            let w = sample.effective_weight();
            class_counts[c] += w;
            for (f, code) in sample.codes().iter().enumerate() {
                if let Some(code) = *code {
                    counts[c * width + flat_index(&layout, f, code)?] += w;
                    known[c * n_features + f] += w;
                }
            }
        }

        let mut freqs = vec![0.0f64; n_classes * width];
        for c in 0..n_classes {
            for f in 0..n_features {
                let k = layout.cardinality(f) as f64;
                let mass = if track_unknown {
                    known[c * n_features + f]
                } else {
                    class_counts[c]
                };
                let denom = mass + smoothing * k;
                if denom <= 0.0 {
                    return Err(ModelError::ZeroDenominator {
                        class: c,
                        feature: f,
                    });
                }
                let start = c * width + layout.offsets()[f];
                for cell in start..start + layout.cardinality(f) {
                    freqs[cell] = (counts[cell] + smoothing) / denom;
                }
            }
        }

        let n_admitted = admitted.len() as f64;
        let class_freqs = class_counts.iter().map(|&n| n / n_admitted).collect();

        debug!(
            n_admitted = admitted.len(),
            n_classes,
            width,
            track_unknown,
            "frequency table estimated"
        );

        Ok(Self {
            layout,
            n_classes,
            freqs,
            class_freqs,
        })
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

    /// Return the class frequencies.
    #[must_use]
    pub fn class_frequencies(&self) -> &[f64] {
        &self.class_freqs
    }

    /// Return the smoothed frequency of `code` for `feature` given `class`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ClassOutOfRange`] or [`ModelError::CodeOutOfRange`].
    pub fn frequency(&self, class: usize, feature: usize, code: usize) -> Result<f64, ModelError> {
        if class >= self.n_classes {
            return Err(ModelError::ClassOutOfRange {
                class,
                n_classes: self.n_classes,
            });
        }
        if feature >= self.layout.n_features() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.layout.n_features(),
                got: feature + 1,
            });
        }
        Ok(self.freqs[class * self.layout.width() + flat_index(&self.layout, feature, code)?])
    }

    /// Sum of per-feature log frequencies for every class, skipping unknown codes.
    ///
    /// This is the log of the per-class frequency product; a zero frequency
    /// (possible only with `α = 0`) gives `-inf`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::FeatureCountMismatch`] for a wrong code count or
    /// [`ModelError::CodeOutOfRange`] for a code outside its feature range.
    pub fn log_scores(&self, codes: &[Option<usize>]) -> Result<Vec<f64>, ModelError> {
        if codes.len() != self.layout.n_features() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.layout.n_features(),
                got: codes.len(),
            });
        }
        let cells: Vec<usize> = codes
            .iter()
            .enumerate()
            .filter_map(|(f, code)| code.map(|code| flat_index(&self.layout, f, code)))
            .collect::<Result<_, _>>()?;
        let width = self.layout.width();
        Ok((0..self.n_classes)
            .map(|c| cells.iter().map(|&cell| self.freqs[c * width + cell].ln()).sum())
            .collect())
    }

    /// Write the table.
    pub fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError> {
        writer.tag(TAG)?;
        writer.value(self.n_classes)?;
        writer.value(self.layout.n_features())?;
        writer.row(self.layout.ranges())?;
        let width = self.layout.width();
        for c in 0..self.n_classes {
            writer.row(&self.freqs[c * width..(c + 1) * width])?;
        }
        writer.row(&self.class_freqs)?;
        Ok(())
    }

    /// Read a table written by [`FrequencyTable::save`].
    pub fn open(reader: &mut ModelReader<'_>) -> Result<Self, ModelError> {
        reader.expect_tag(TAG)?;
        let n_classes: usize = reader.value("class count")?;
        let n_features: usize = reader.value("feature count")?;
        let ranges: Vec<usize> = reader.row(n_features, "feature ranges")?;
        let line = reader.line_number();
        let malformed = |found: String| StreamError::Malformed {
            line,
            expected: "table dimensions that fit in memory",
            found,
        };
        let layout = CodeLayout::new(ranges).map_err(|e| malformed(e.to_string()))?;
        let width = layout.width();
        n_classes
            .checked_mul(width)
            .ok_or_else(|| malformed(format!("{n_classes} classes x {width} cells")))?;
        let mut freqs = Vec::new();
        for _ in 0..n_classes {
            freqs.extend(reader.row::<f64>(width, "frequency row")?);
        }
        let class_freqs = reader.row(n_classes, "class frequencies")?;
        Ok(Self {
            layout,
            n_classes,
            freqs,
            class_freqs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_data::DiscreteVector;

    fn coded(rows: &[(&[Option<usize>], usize)], ranges: Vec<usize>, n_classes: usize) -> DiscretizedDataSet {
        let samples = rows
            .iter()
            .map(|(codes, c)| DiscreteVector::new(codes.to_vec(), *c))
            .collect();
        DiscretizedDataSet::from_codes(samples, ranges, n_classes).unwrap()
    }

    fn binary_two_class() -> DiscretizedDataSet {
        coded(
            &[
                (&[Some(0)], 0),
                (&[Some(0)], 0),
                (&[Some(1)], 1),
                (&[Some(1)], 1),
            ],
            vec![1],
            2,
        )
    }

    fn assert_rows_sum_to_one(table: &FrequencyTable) {
        for c in 0..table.n_classes() {
            for f in 0..table.layout().n_features() {
                let sum: f64 = (0..table.layout().cardinality(f))
                    .map(|v| table.frequency(c, f, v).unwrap())
                    .sum();
                assert!((sum - 1.0).abs() < 1e-12, "class {c} feature {f} sums to {sum}");
            }
        }
    }

    #[test]
    fn laplace_smoothing_on_binary_feature() {
        let table = FrequencyTable::estimate(&binary_two_class(), None, 1.0, false).unwrap();
        assert_eq!(table.frequency(0, 0, 0).unwrap(), 0.75);
        assert_eq!(table.frequency(0, 0, 1).unwrap(), 0.25);
        assert_eq!(table.frequency(1, 0, 1).unwrap(), 0.75);
        assert_eq!(table.class_frequencies(), &[0.5, 0.5]);
    }

    #[test]
    fn rows_sum_to_one_with_and_without_tracking() {
        let data = coded(
            &[
                (&[Some(0), Some(2)], 0),
                (&[None, Some(1)], 0),
                (&[Some(1), None], 1),
                (&[Some(1), Some(0)], 1),
                (&[Some(0), Some(2)], 2),
            ],
            vec![1, 2],
            3,
        );
        assert_rows_sum_to_one(&FrequencyTable::estimate(&data, None, 1.0, true).unwrap());
        let complete = coded(
            &[(&[Some(0), Some(2)], 0), (&[Some(1), Some(0)], 1)],
            vec![1, 2],
            2,
        );
        assert_rows_sum_to_one(&FrequencyTable::estimate(&complete, None, 0.5, false).unwrap());
    }

    #[test]
    fn weights_replace_unit_counts() {
        let samples = vec![
            DiscreteVector::new(vec![Some(0)], 0).with_weight(3.0),
            DiscreteVector::new(vec![Some(1)], 0),
        ];
        let data = DiscretizedDataSet::from_codes(samples, vec![1], 1).unwrap();
        let table = FrequencyTable::estimate(&data, None, 0.0, false).unwrap();
        assert_eq!(table.frequency(0, 0, 0).unwrap(), 0.75);
    }

    #[test]
    fn mask_restricts_counting() {
        let mask = SampleMask::from_indices(4, &[0, 2]);
        let table = FrequencyTable::estimate(&binary_two_class(), Some(&mask), 1.0, false).unwrap();
        // One sample per class: (1 + 1) / (1 + 2)
        assert!((table.frequency(0, 0, 0).unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_class_without_smoothing_is_an_estimation_error() {
        let data = coded(&[(&[Some(0)], 0)], vec![1], 2);
        let err = FrequencyTable::estimate(&data, None, 0.0, false).unwrap_err();
        assert!(matches!(err, ModelError::ZeroDenominator { class: 1, feature: 0 }));
    }

    #[test]
    fn mask_admitting_nothing_is_empty_training() {
        let mask = SampleMask::from_indices(4, &[]);
        let err = FrequencyTable::estimate(&binary_two_class(), Some(&mask), 1.0, false).unwrap_err();
        assert!(matches!(err, ModelError::EmptyTraining));
    }

    #[test]
    fn scores_reject_out_of_range_codes() {
        let table = FrequencyTable::estimate(&binary_two_class(), None, 1.0, false).unwrap();
        let err = table.log_scores(&[Some(2)]).unwrap_err();
        assert!(matches!(err, ModelError::CodeOutOfRange { code: 2, range: 1, .. }));
        assert_eq!(table.log_scores(&[None]).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn save_then_open_is_identical() {
        let table = FrequencyTable::estimate(&binary_two_class(), None, 0.3, true).unwrap();
        let mut buf = Vec::new();
        table.save(&mut ModelWriter::new(&mut buf)).unwrap();
        let mut src = buf.as_slice();
        let back = FrequencyTable::open(&mut ModelReader::new(&mut src)).unwrap();
        assert_eq!(back, table);
    }

    fn crafted_header(n_classes: usize, ranges: &[usize]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = ModelWriter::new(&mut buf);
        writer.tag(TAG).unwrap();
        writer.value(n_classes).unwrap();
        writer.value(ranges.len()).unwrap();
        writer.row(ranges).unwrap();
        writer.flush().unwrap();
        drop(writer);
        buf
    }

    #[test]
    fn overflowing_dimensions_are_malformed_not_a_panic() {
        for buf in [
            crafted_header(2, &[usize::MAX]),
            crafted_header(usize::MAX, &[1, 1]),
        ] {
            let mut src = buf.as_slice();
            let err = FrequencyTable::open(&mut ModelReader::new(&mut src)).unwrap_err();
            assert!(
                matches!(err, ModelError::Stream(StreamError::Malformed { line: 4, .. })),
                "{err:?}"
            );
        }
    }
}
