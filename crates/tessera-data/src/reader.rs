//! CSV dataset reader with full input validation.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::{DataError, DataSet, FeatureVector};

/// Reads a labelled dataset from a CSV file.
///
/// Expected CSV format:
/// - Header row required; every column except the label and weight columns is a feature
/// - The label column (default `class`) holds class names as text
/// - An optional weight column holds non-negative sample weights
///
/// Class names are indexed in order of first appearance unless a fixed table
/// is supplied with [`DataSetReader::with_class_names`].
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DataError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`DataError::CsvParse`] | Malformed CSV record |
/// | [`DataError::MissingColumn`] | Label or weight column absent from the header |
/// | [`DataError::ZeroFeatures`] | Header has no feature columns |
/// | [`DataError::EmptyDataset`] | Zero data rows after header |
/// | [`DataError::InconsistentRowLength`] | Row has different column count than header |
/// | [`DataError::InvalidCell`] | Cell is NaN, Inf, or unparseable float |
/// | [`DataError::UnknownClassLabel`] | Label outside a fixed class table |
#[derive(Debug, Clone)]
pub struct DataSetReader {
    path: PathBuf,
    label_column: String,
    weight_column: Option<String>,
    class_names: Option<Vec<String>>,
}

impl DataSetReader {
    /// Create a reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            label_column: "class".to_string(),
            weight_column: None,
            class_names: None,
        }
    }

    /// Set the name of the label column.
    #[must_use]
    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = column.into();
        self
    }

    /// Set the name of the weight column.
    #[must_use]
    pub fn with_weight_column(mut self, column: Option<String>) -> Self {
        self.weight_column = column;
        self
    }

    /// Map labels through a fixed class-name table instead of discovering it.
    #[must_use]
    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = Some(class_names);
        self
    }

    fn column_index(&self, header: &csv::StringRecord, column: &str) -> Result<usize, DataError> {
        header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DataError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            })
    }

    /// Read and validate the CSV file, returning a [`DataSet`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<DataSet, DataError> {
        let file = std::fs::File::open(&self.path).map_err(|e| DataError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that InconsistentRowLength fires instead of a CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr
            .headers()
            .map_err(|e| DataError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?
            .clone();
        let expected_cols = header.len();
        let label_idx = self.column_index(&header, &self.label_column)?;
        let weight_idx = self
            .weight_column
            .as_deref()
            .map(|w| self.column_index(&header, w))
            .transpose()?;
        let feature_cols: Vec<usize> = (0..expected_cols)
            .filter(|&c| c != label_idx && Some(c) != weight_idx)
            .collect();
        if feature_cols.is_empty() {
            return Err(DataError::ZeroFeatures);
        }
        let feature_names: Vec<String> =
            feature_cols.iter().map(|&c| header[c].to_string()).collect();
        debug!(expected_cols, n_features = feature_names.len(), "read CSV header");

        let fixed_classes = self.class_names.is_some();
        let mut class_names: Vec<String> = self.class_names.clone().unwrap_or_default();
        let mut rows: Vec<(Vec<f64>, usize, Option<f64>)> = Vec::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;

            if record.len() != expected_cols {
                return Err(DataError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let parse = |col: usize| -> Result<f64, DataError> {
                let raw = record.get(col).unwrap_or("").trim();
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| DataError::InvalidCell {
                        path: self.path.clone(),
                        row_index,
                        column: header[col].to_string(),
                        raw: raw.to_string(),
                    })
            };

            let values = feature_cols
                .iter()
                .map(|&c| parse(c))
                .collect::<Result<Vec<f64>, _>>()?;
            let weight = weight_idx.map(parse).transpose()?;

            let label = record.get(label_idx).unwrap_or("").trim();
            let class_index = match class_names.iter().position(|c| c == label) {
                Some(i) => i,
                None if fixed_classes => {
                    return Err(DataError::UnknownClassLabel {
                        path: self.path.clone(),
                        row_index,
                        label: label.to_string(),
                    });
                }
                None => {
                    class_names.push(label.to_string());
                    class_names.len() - 1
                }
            };
            rows.push((values, class_index, weight));
        }

        if rows.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let mut data = DataSet::new(class_names, feature_names)?;
        for (values, class_index, weight) in rows {
            let mut v = FeatureVector::new(values, class_index);
            if let Some(w) = weight {
                v = v.with_weight(w);
            }
            data.push(v)?;
        }

        info!(
            n_samples = data.len(),
            n_features = data.n_features(),
            n_classes = data.n_classes(),
            "dataset loaded"
        );
        Ok(data)
    }
}
