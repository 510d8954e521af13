use std::path::PathBuf;

use tessera_data::{DataError, StreamError};

/// Broad failure category of a [`ModelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid hyperparameters, descriptors, tags or ensemble wiring.
    Configuration,
    /// A quantity could not be estimated (zero denominators, empty inputs).
    Estimation,
    /// A code, class index or vector length outside the fitted bounds.
    Range,
    /// Malformed or incompatible model streams and file I/O failures.
    Io,
}

/// Errors from classifier training, classification and persistence.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Returned when a model stream names a tag absent from the registry.
    #[error("unknown model tag {tag:?}")]
    UnknownModelTag {
        /// The unrecognised tag.
        tag: String,
    },

    /// Returned when a model descriptor cannot be interpreted.
    #[error("invalid descriptor for {tag}: {reason}")]
    InvalidSpec {
        /// The tag whose arguments were rejected.
        tag: String,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// Returned when the smoothing constant is negative or not finite.
    #[error("smoothing must be finite and non-negative, got {smoothing}")]
    InvalidSmoothing {
        /// The rejected smoothing constant.
        smoothing: f64,
    },

    /// Returned when the bag fraction is not in (0.0, 1.0].
    #[error("bag fraction must be in (0.0, 1.0], got {fraction}")]
    InvalidBagFraction {
        /// The rejected fraction.
        fraction: f64,
    },

    /// Returned when an ensemble is configured with zero members.
    #[error("member count must be at least 1, got {n_members}")]
    InvalidMemberCount {
        /// The rejected member count.
        n_members: usize,
    },

    /// Returned when the bag fraction rounds the bag size down to zero.
    #[error("bag fraction {fraction} of {admitted} admitted samples yields an empty bag")]
    EmptyBag {
        /// The configured bag fraction.
        fraction: f64,
        /// The number of admitted samples.
        admitted: usize,
    },

    /// Returned when a heterogeneous ensemble member uses a feature the ensemble lacks.
    #[error("member {member} uses feature {name:?}, which the ensemble does not provide")]
    MissingFeature {
        /// Zero-based member position.
        member: usize,
        /// The missing feature name.
        name: String,
    },

    /// Returned when a member lists its features in a different order than the ensemble.
    #[error("member {member} lists feature {name:?} out of ensemble order")]
    FeatureOrder {
        /// Zero-based member position.
        member: usize,
        /// The first out-of-order feature name.
        name: String,
    },

    /// Returned when a heterogeneous ensemble has no members.
    #[error("ensemble has no members")]
    NoMembers,

    /// Returned when a classifier is used or saved before training.
    #[error("{tag} used before training")]
    NotTrained {
        /// The tag of the untrained classifier.
        tag: &'static str,
    },

    /// Returned when the mask admits no training samples.
    #[error("no training samples admitted")]
    EmptyTraining,

    /// Returned when a frequency denominator is zero for a class.
    #[error("class {class} has zero smoothed mass for feature {feature}")]
    ZeroDenominator {
        /// The class index.
        class: usize,
        /// The feature index.
        feature: usize,
    },

    /// Returned when a Gaussian class has no observation of a feature.
    #[error("class {class} has no known value of feature {feature}")]
    EmptyClass {
        /// The class index.
        class: usize,
        /// The feature index.
        feature: usize,
    },

    /// Returned when every class score is zero so no distribution exists.
    #[error("all class scores are zero")]
    DegenerateScores,

    /// Returned when a discrete code exceeds its feature's fitted range.
    #[error("code {code} for feature {feature} exceeds fitted range {range}")]
    CodeOutOfRange {
        /// The feature index.
        feature: usize,
        /// The offending code.
        code: usize,
        /// The inclusive maximum code.
        range: usize,
    },

    /// Returned when a class index exceeds the class table.
    #[error("class index {class} outside table of {n_classes} classes")]
    ClassOutOfRange {
        /// The offending class index.
        class: usize,
        /// The number of classes.
        n_classes: usize,
    },

    /// Returned when an input vector has the wrong number of features.
    #[error("input has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features.
        got: usize,
    },

    /// Returned when a model stream starts with an unsupported format version.
    #[error("incompatible model format: expected version {expected}, found {found:?}")]
    IncompatibleModelVersion {
        /// The format version this build writes.
        expected: u32,
        /// The header line found in the stream.
        found: String,
    },

    /// Returned when a foreign model blob cannot be encoded.
    #[error("failed to serialize embedded model")]
    SerializeBlob {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when a foreign model blob cannot be decoded.
    #[error("failed to deserialize embedded model")]
    DeserializeBlob {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the data layer fails.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Returned when the model stream is malformed or truncated.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ModelError {
    /// Return the broad category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::UnknownModelTag { .. }
            | ModelError::InvalidSpec { .. }
            | ModelError::InvalidSmoothing { .. }
            | ModelError::InvalidBagFraction { .. }
            | ModelError::InvalidMemberCount { .. }
            | ModelError::EmptyBag { .. }
            | ModelError::MissingFeature { .. }
            | ModelError::FeatureOrder { .. }
            | ModelError::NoMembers
            | ModelError::NotTrained { .. } => ErrorKind::Configuration,

            ModelError::EmptyTraining
            | ModelError::ZeroDenominator { .. }
            | ModelError::EmptyClass { .. }
            | ModelError::DegenerateScores => ErrorKind::Estimation,

            ModelError::CodeOutOfRange { .. }
            | ModelError::ClassOutOfRange { .. }
            | ModelError::FeatureCountMismatch { .. } => ErrorKind::Range,

            ModelError::IncompatibleModelVersion { .. }
            | ModelError::SerializeBlob { .. }
            | ModelError::DeserializeBlob { .. }
            | ModelError::WriteModel { .. }
            | ModelError::ReadModel { .. }
            | ModelError::Stream(_) => ErrorKind::Io,

            ModelError::Data(e) => match e {
                DataError::CodeOutOfRange { .. }
                | DataError::FeatureCountMismatch { .. }
                | DataError::ClassOutOfRange { .. }
                | DataError::MaskLengthMismatch { .. } => ErrorKind::Range,
                DataError::EmptyDataset
                | DataError::TooFewSamples { .. }
                | DataError::NonFiniteValue { .. } => ErrorKind::Estimation,
                DataError::Stream(_)
                | DataError::FileNotFound { .. }
                | DataError::CsvParse { .. }
                | DataError::InconsistentRowLength { .. }
                | DataError::InvalidCell { .. }
                | DataError::UnknownClassLabel { .. }
                | DataError::MissingColumn { .. } => ErrorKind::Io,
                _ => ErrorKind::Configuration,
            },
        }
    }
}
