//! Closed tag → constructor table for every classifier kind.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use tessera_data::ModelReader;
use tracing::debug;

use crate::classifier::Classifier;
use crate::ensemble::HeterogeneousEnsemble;
use crate::gaussian::ContinuousNaiveBayes;
use crate::naive_bayes::DiscreteNaiveBayes;
use crate::resample::{ResamplingEnsemble, ResamplingKind};
use crate::spec::ModelSpec;
use crate::tree::DecisionTreeClassifier;
use crate::{ModelError, ensemble, gaussian, naive_bayes, tree};

/// Builds an untrained classifier from its descriptor.
pub type Constructor = fn(&ModelSpec) -> Result<Box<dyn Classifier>, ModelError>;

static GLOBAL: LazyLock<ModelRegistry> = LazyLock::new(ModelRegistry::standard);

/// Maps type tags to constructors.
///
/// Used both to clone prototypes (build from [`Classifier::spec`]) and to
/// load streams (build from the bare tag, then `open`).
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl ModelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every shipped classifier kind.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(naive_bayes::TAG, DiscreteNaiveBayes::from_spec)
            .with(gaussian::TAG, ContinuousNaiveBayes::from_spec)
            .with(tree::TAG, DecisionTreeClassifier::from_spec)
            .with(ResamplingKind::Bagging.tag(), |spec| {
                ResamplingEnsemble::from_spec(ResamplingKind::Bagging, spec)
            })
            .with(ResamplingKind::Boosting.tag(), |spec| {
                ResamplingEnsemble::from_spec(ResamplingKind::Boosting, spec)
            })
            .with(ensemble::TAG, HeterogeneousEnsemble::from_spec)
    }

    /// Return the process-wide standard registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Register `constructor` under `tag`, replacing any previous entry.
    #[must_use]
    pub fn with(mut self, tag: &'static str, constructor: Constructor) -> Self {
        self.constructors.insert(tag, constructor);
        self
    }

    /// Return the registered tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    /// Return `true` if `tag` is registered.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Build an untrained classifier from a descriptor.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::UnknownModelTag`] | the tag is not registered |
    /// | [`ModelError::InvalidSpec`] | the arguments are rejected by the kind |
    pub fn build(&self, spec: &ModelSpec) -> Result<Box<dyn Classifier>, ModelError> {
        let constructor =
            self.constructors
                .get(spec.tag())
                .ok_or_else(|| ModelError::UnknownModelTag {
                    tag: spec.tag().to_string(),
                })?;
        constructor(spec)
    }

    /// Read one classifier section, dispatching on its tag line.
    ///
    /// The tag is peeked, not consumed; the built instance re-reads it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModelTag`] for unregistered tags, or any
    /// error raised while the instance parses its state.
    pub fn open(&self, reader: &mut ModelReader<'_>) -> Result<Box<dyn Classifier>, ModelError> {
        let tag = reader.peek_tag()?;
        let mut model = self.build(&ModelSpec::bare(tag.as_str()))?;
        model.open(reader)?;
        debug!(tag = %tag, "model section opened");
        Ok(model)
    }
}
