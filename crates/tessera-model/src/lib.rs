//! Classifiers, ensembles and self-describing model files.
//!
//! Every classifier kind implements [`Classifier`] and is registered under a
//! unique type tag in the [`ModelRegistry`]. Kinds are described by a
//! [`ModelSpec`] such as `BaggedClassifier 0.5 10 DiscreteNaiveBayesClassifier ewd 10`;
//! ensembles build their members from such descriptors and persist them
//! inline, so any model tree can be saved and reopened with [`save_model`]
//! and [`load_model`].

mod classifier;
mod confusion;
mod ensemble;
mod error;
mod frequency;
mod gaussian;
mod naive_bayes;
mod persist;
mod registry;
mod resample;
mod spec;
mod tree;
mod validate;

pub use classifier::{ClassDistribution, Classifier, ModelHeader};
pub use confusion::{BinaryCounts, ClassMetrics, ConfusionMatrix};
pub use ensemble::{EnsembleMember, HeterogeneousEnsemble};
pub use error::{ErrorKind, ModelError};
pub use frequency::FrequencyTable;
pub use gaussian::ContinuousNaiveBayes;
pub use naive_bayes::{DiscreteNaiveBayes, NaiveBayesConfig};
pub use persist::{FORMAT_VERSION, load_model, read_model, save_model, write_model};
pub use registry::{Constructor, ModelRegistry};
pub use resample::{ResamplingConfig, ResamplingEnsemble, ResamplingKind};
pub use spec::ModelSpec;
pub use tree::{DecisionTreeClassifier, SplitCriterion, TreeConfig};
pub use validate::{Evaluation, Metric, ParseMetricError, Validator, evaluate, predict_all};
