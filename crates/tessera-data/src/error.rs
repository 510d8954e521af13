use std::path::PathBuf;

/// Errors from dataset construction, CSV input, discretization and PCA.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Returned when a dataset is declared with zero classes.
    #[error("dataset must declare at least one class")]
    NoClasses,

    /// Returned when a dataset is declared with zero feature columns.
    #[error("dataset must declare at least one feature")]
    ZeroFeatures,

    /// Returned when an operation needs samples but the dataset has none.
    #[error("dataset has zero samples")]
    EmptyDataset,

    /// Returned when a feature vector has a different length than the feature table.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the vector.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a class index is outside the class-name table.
    #[error("sample {sample_index} has class index {class_index}, but only {n_classes} classes exist")]
    ClassOutOfRange {
        /// The offending class index.
        class_index: usize,
        /// The number of declared classes.
        n_classes: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a sample weight is negative or not finite.
    #[error("sample {sample_index} has invalid weight {weight}")]
    InvalidWeight {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The rejected weight.
        weight: f64,
    },

    /// Returned when a sample mask does not cover the dataset exactly.
    #[error("sample mask has {got} entries, dataset has {expected} samples")]
    MaskLengthMismatch {
        /// The number of samples in the dataset.
        expected: usize,
        /// The length of the mask.
        got: usize,
    },

    /// Returned when the class labels do not cover every value of a column.
    #[error("{expected} column values but {got} class labels")]
    LabelCountMismatch {
        /// The column length.
        expected: usize,
        /// The number of labels supplied.
        got: usize,
    },

    /// Returned when a discretizer is asked for fewer than two bins.
    #[error("bin count must be at least 2, got {bins}")]
    InvalidBinCount {
        /// The rejected bin count.
        bins: usize,
    },

    /// Returned when a discretizer or PCA transform is used before fitting.
    #[error("{what} used before fitting")]
    NotFitted {
        /// The component that was not fitted.
        what: &'static str,
    },

    /// Returned when a discrete code exceeds the inclusive range of its feature.
    #[error("code {code} for feature {feature} exceeds inclusive range {range}")]
    CodeOutOfRange {
        /// The zero-based feature index.
        feature: usize,
        /// The offending code.
        code: usize,
        /// The inclusive maximum code of the feature.
        range: usize,
    },

    /// Returned when the flattened code layout does not fit in `usize`.
    #[error("code layout overflows at feature {feature}")]
    LayoutOverflow {
        /// The feature whose range overflowed the running width.
        feature: usize,
    },

    /// Returned when the PCA component count is zero or exceeds the input dimension.
    #[error("PCA component count must be in [1, {n_features}], got {components}")]
    InvalidComponentCount {
        /// The requested component count.
        components: usize,
        /// The input dimension.
        n_features: usize,
    },

    /// Returned when PCA is fitted on fewer than two samples.
    #[error("PCA needs at least 2 samples, got {n_samples}")]
    TooFewSamples {
        /// The number of samples supplied.
        n_samples: usize,
    },

    /// Returned when a requested feature name is absent from the dataset.
    #[error("feature {name:?} not found in dataset")]
    UnknownFeature {
        /// The missing feature name.
        name: String,
    },

    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the CSV header lacks a required column.
    #[error("column {column:?} missing from header of {path}")]
    MissingColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The missing column name.
        column: String,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a cell cannot be parsed as a finite float.
    #[error("invalid value in {path}: row {row_index}, column {column:?}, raw value \"{raw}\"")]
    InvalidCell {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Header name of the offending column.
        column: String,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when a class label is not in a fixed class-name table.
    #[error("unknown class label {label:?} in {path}, row {row_index}")]
    UnknownClassLabel {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The unrecognised label.
        label: String,
    },

    /// Returned when a model stream section is malformed.
    #[error(transparent)]
    Stream(#[from] crate::stream::StreamError),
}
