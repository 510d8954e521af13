//! Correlation-based feature selection.
//!
//! Pairwise symmetric-uncertainty correlations feed a merit function over
//! feature subsets; a greedy hill-climbing search toggles one feature per
//! round until no toggle improves the merit.

mod cfs;
mod correlation;
mod error;
mod search;

pub use cfs::{CorrelationFeatureSelector, Correlations, FeatureSelection, SelectionState, ToggleFeature};
pub use correlation::{entropy, symmetric_uncertainty};
pub use error::SelectError;
pub use search::{SearchOperator, SearchOutcome, SearchState, greedy_search};
