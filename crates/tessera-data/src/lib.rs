//! Data layer: labelled datasets, CSV input, discretization, PCA and the
//! plain-text model stream codec used by every persisted component.

mod dataset;
mod discrete;
pub mod discretize;
mod error;
mod pca;
mod reader;
pub mod stream;

pub use dataset::{DataSet, FeatureVector, SampleMask, admitted_indices, membership_mask, select};
pub use discrete::{CodeLayout, DiscreteVector, DiscretizedDataSet};
pub use discretize::{Binning, Discretize, Discretizer};
pub use error::DataError;
pub use pca::PrincipalComponents;
pub use reader::DataSetReader;
pub use stream::{ModelReader, ModelWriter, StreamError};
