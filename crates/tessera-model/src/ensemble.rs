//! Majority vote over pretrained classifiers that each read a named feature subset.

use rayon::prelude::*;
use tessera_data::{DataSet, ModelReader, ModelWriter, SampleMask, select};
use tracing::{debug, info, instrument};

use crate::classifier::{ClassDistribution, Classifier, ModelHeader};
use crate::registry::ModelRegistry;
use crate::spec::{ModelSpec, SpecArgs};
use crate::validate::{Evaluation, Validator, score_predictions};
use crate::ModelError;

/// Type tag of [`HeterogeneousEnsemble`].
pub const TAG: &str = "EnsembleClassifier";

/// One ensemble member and the feature names it consumes.
#[derive(Debug)]
pub struct EnsembleMember {
    features: Vec<String>,
    classifier: Box<dyn Classifier>,
}

impl EnsembleMember {
    /// Wrap a classifier that reads `features`, in this order.
    #[must_use]
    pub fn new(features: Vec<String>, classifier: Box<dyn Classifier>) -> Self {
        Self {
            features,
            classifier,
        }
    }

    /// Wrap a trained classifier, reading the features it was trained on.
    #[must_use]
    pub fn from_trained(classifier: Box<dyn Classifier>) -> Self {
        Self {
            features: classifier.header().feature_names().to_vec(),
            classifier,
        }
    }

    /// Return the consumed feature names.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Return the classifier.
    #[must_use]
    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }
}

/// Heterogeneous ensemble: each member sees its own projection of the input.
///
/// Member feature lists must name ensemble features in ensemble order, since
/// a projection keeps the ensemble's order.
#[derive(Debug, Default)]
pub struct HeterogeneousEnsemble {
    header: ModelHeader,
    members: Vec<EnsembleMember>,
    masks: Vec<Vec<bool>>,
}

impl HeterogeneousEnsemble {
    /// Create an ensemble over `feature_names` and `class_names`.
    ///
    /// # Errors
    ///
    /// See [`HeterogeneousEnsemble::init`].
    pub fn new(
        feature_names: Vec<String>,
        class_names: Vec<String>,
        members: Vec<EnsembleMember>,
    ) -> Result<Self, ModelError> {
        let mut ensemble = Self {
            header: ModelHeader::new(class_names, feature_names),
            members,
            masks: Vec::new(),
        };
        ensemble.init()?;
        Ok(ensemble)
    }

    pub(crate) fn from_spec(spec: &ModelSpec) -> Result<Box<dyn Classifier>, ModelError> {
        SpecArgs::parse(spec, &[])?.at_most(0)?;
        Ok(Box::new(Self::default()))
    }

    /// Rebuild the cached membership mask of every member.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::NoMembers`] | the ensemble is empty |
    /// | [`ModelError::MissingFeature`] | a member feature is not an ensemble feature |
    /// | [`ModelError::FeatureOrder`] | a member lists its features out of ensemble order |
    pub fn init(&mut self) -> Result<(), ModelError> {
        self.masks = compute_masks(self.header.feature_names(), &self.members)?;
        Ok(())
    }

    /// Return the members.
    #[must_use]
    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    /// Return the cached membership masks, one per member.
    #[must_use]
    pub fn masks(&self) -> &[Vec<bool>] {
        &self.masks
    }

    fn votes(&self, sample: &[f64]) -> Result<Vec<usize>, ModelError> {
        self.members
            .iter()
            .zip(&self.masks)
            .map(|(m, mask)| m.classifier.predict(&select(sample, mask)))
            .collect()
    }

    /// Score the ensemble on `data` with `validator`.
    ///
    /// `data` must carry the ensemble's features in ensemble order.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::FeatureCountMismatch`] | `data` has a different feature count |
    /// | [`ModelError::Data`] | `data` is empty |
    /// | Other model errors | From member classification |
    #[instrument(skip_all, fields(tag = TAG, n_members = self.members.len(), n_samples = data.len()))]
    pub fn evaluate(&self, data: &DataSet, validator: &Validator) -> Result<Evaluation, ModelError> {
        if self.members.is_empty() {
            return Err(ModelError::NoMembers);
        }
        if data.n_features() != self.header.n_features() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.header.n_features(),
                got: data.n_features(),
            });
        }
        let projections = self
            .masks
            .iter()
            .map(|mask| data.project(mask))
            .collect::<Result<Vec<_>, _>>()?;
        let n_classes = self.header.n_classes();
        let predicted = (0..data.len())
            .into_par_iter()
            .map(|i| {
                let votes = self
                    .members
                    .iter()
                    .zip(&projections)
                    .map(|(m, p)| m.classifier.predict(p.samples()[i].values()))
                    .collect::<Result<Vec<_>, ModelError>>()?;
                Ok(ClassDistribution::from_votes(&votes, n_classes)?.predicted_class())
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        score_predictions(&data.labels(), &predicted, n_classes, validator)
    }
}

fn compute_masks(
    features: &[String],
    members: &[EnsembleMember],
) -> Result<Vec<Vec<bool>>, ModelError> {
    if members.is_empty() {
        return Err(ModelError::NoMembers);
    }
    members
        .iter()
        .enumerate()
        .map(|(member, m)| {
            let mut last = None;
            for name in &m.features {
                let position = features.iter().position(|f| f == name).ok_or_else(|| {
                    ModelError::MissingFeature {
                        member,
                        name: name.clone(),
                    }
                })?;
                if last.is_some_and(|l| position <= l) {
                    return Err(ModelError::FeatureOrder {
                        member,
                        name: name.clone(),
                    });
                }
                last = Some(position);
            }
            Ok(features.iter().map(|f| m.features.contains(f)).collect())
        })
        .collect()
}

impl Classifier for HeterogeneousEnsemble {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn spec(&self) -> ModelSpec {
        ModelSpec::bare(TAG)
    }

    fn header(&self) -> &ModelHeader {
        &self.header
    }

    fn is_trained(&self) -> bool {
        !self.members.is_empty()
            && self.masks.len() == self.members.len()
            && self.members.iter().all(|m| m.classifier.is_trained())
    }

    /// Retrain every member on its own projection of `data`.
    ///
    /// Fresh members are built from each member's spec and trained first; the
    /// ensemble keeps its previous members unless all of them succeed. The
    /// ensemble adopts the feature and class names of `data`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::NoMembers`] | the ensemble is empty |
    /// | [`ModelError::MissingFeature`] | `data` lacks a member feature |
    /// | Other model errors | From member construction or training |
    #[instrument(skip_all, fields(tag = TAG, n_members = self.members.len(), n_samples = data.len()))]
    fn train(&mut self, data: &DataSet, mask: Option<&SampleMask>) -> Result<(), ModelError> {
        let masks = compute_masks(data.feature_names(), &self.members)?;
        let registry = ModelRegistry::global();
        let fresh = self
            .members
            .par_iter()
            .zip(&masks)
            .enumerate()
            .map(|(i, (member, feature_mask))| {
                let mut classifier = registry.build(&member.classifier.spec())?;
                let projected = data.project(feature_mask)?;
                classifier.train(&projected, mask)?;
                debug!(member = i, n_features = projected.n_features(), "member trained");
                Ok(EnsembleMember {
                    features: member.features.clone(),
                    classifier,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        info!(n_members = fresh.len(), "heterogeneous ensemble trained");

        self.members = fresh;
        self.header = ModelHeader::from_dataset(data);
        self.masks = masks;
        Ok(())
    }

    fn classify(&self, sample: &[f64]) -> Result<ClassDistribution, ModelError> {
        if self.members.is_empty() {
            return Err(ModelError::NoMembers);
        }
        self.header.check_dimension(sample)?;
        ClassDistribution::from_votes(&self.votes(sample)?, self.header.n_classes())
    }

    fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError> {
        if !self.is_trained() {
            return Err(ModelError::NotTrained { tag: TAG });
        }
        writer.tag(TAG)?;
        self.header.save(writer)?;
        writer.value(self.members.len())?;
        for m in &self.members {
            writer.names(&m.features)?;
            m.classifier.save(writer)?;
        }
        Ok(())
    }

    fn open(&mut self, reader: &mut ModelReader<'_>) -> Result<(), ModelError> {
        reader.expect_tag(TAG)?;
        let header = ModelHeader::open(reader)?;
        let count: usize = reader.value("member count")?;
        let registry = ModelRegistry::global();
        let members = (0..count)
            .map(|_| {
                let features = reader.names("member feature names")?;
                let classifier = registry.open(reader)?;
                Ok(EnsembleMember::new(features, classifier))
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        let masks = compute_masks(header.feature_names(), &members)?;

        self.header = header;
        self.members = members;
        self.masks = masks;
        Ok(())
    }
}
