use tessera_data::DataError;

/// Errors from feature selection.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    /// Returned when the dataset has no samples to correlate.
    #[error("feature selection needs at least one sample")]
    EmptyDataset,

    /// Returned when no single feature has positive merit, so the search
    /// cannot leave the empty selection.
    #[error("no feature carries class signal: all {n_features} single-feature merits are zero")]
    NoSignal {
        /// The number of candidate features.
        n_features: usize,
    },

    /// Returned when the underlying data layer fails.
    #[error(transparent)]
    Data(#[from] DataError),
}
