//! Bootstrap-aggregation ensembles over a prototype classifier kind.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tessera_data::{DataSet, ModelReader, ModelWriter, SampleMask, admitted_indices};
use tracing::{debug, info, instrument};

use crate::classifier::{ClassDistribution, Classifier, ModelHeader};
use crate::registry::ModelRegistry;
use crate::spec::{ModelSpec, SpecArgs, split_nested};
use crate::{ModelError, naive_bayes};

/// Flavour of [`ResamplingEnsemble`].
///
/// Both flavours train identically: members see uniform bags drawn without
/// replacement and vote with equal weight. Only the persisted tag differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplingKind {
    /// Tagged `BaggedClassifier`.
    Bagging,
    /// Tagged `AdaBoostClassifier`. No sample reweighting takes place.
    Boosting,
}

impl ResamplingKind {
    /// Return the type tag.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            ResamplingKind::Bagging => "BaggedClassifier",
            ResamplingKind::Boosting => "AdaBoostClassifier",
        }
    }
}

/// Hyperparameters of [`ResamplingEnsemble`].
///
/// # Defaults
///
/// | Parameter      | Default                        |
/// |----------------|--------------------------------|
/// | `bag_fraction` | 0.1                            |
/// | `n_members`    | 10                             |
/// | `prototype`    | `DiscreteNaiveBayesClassifier` |
/// | `seed`         | 42                             |
#[derive(Debug, Clone, PartialEq)]
pub struct ResamplingConfig {
    bag_fraction: f64,
    n_members: usize,
    prototype: ModelSpec,
    seed: u64,
}

impl Default for ResamplingConfig {
    fn default() -> Self {
        Self {
            bag_fraction: 0.1,
            n_members: 10,
            prototype: ModelSpec::bare(naive_bayes::TAG),
            seed: 42,
        }
    }
}

impl ResamplingConfig {
    /// Create a validated config.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::InvalidBagFraction`] | `bag_fraction` outside (0.0, 1.0] |
    /// | [`ModelError::InvalidMemberCount`] | `n_members` is zero |
    pub fn new(bag_fraction: f64, n_members: usize, prototype: ModelSpec) -> Result<Self, ModelError> {
        if !(bag_fraction > 0.0 && bag_fraction <= 1.0) {
            return Err(ModelError::InvalidBagFraction {
                fraction: bag_fraction,
            });
        }
        if n_members == 0 {
            return Err(ModelError::InvalidMemberCount { n_members });
        }
        Ok(Self {
            bag_fraction,
            n_members,
            prototype,
            seed: 42,
        })
    }

    /// Set the master seed drawn from by [`Classifier::train`].
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the bag fraction.
    #[must_use]
    pub fn bag_fraction(&self) -> f64 {
        self.bag_fraction
    }

    /// Return the member count.
    #[must_use]
    pub fn n_members(&self) -> usize {
        self.n_members
    }

    /// Return the member descriptor.
    #[must_use]
    pub fn prototype(&self) -> &ModelSpec {
        &self.prototype
    }

    /// Return the master seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Parse `[bag [num]] [seed=N] [<member descriptor>]`.
    fn from_spec(spec: &ModelSpec) -> Result<Self, ModelError> {
        let (own, nested) = split_nested(spec, 2);
        let args = SpecArgs::parse_tokens(spec, &spec.args()[..own], &["seed"])?;
        let defaults = Self::default();
        let prototype = nested.unwrap_or(defaults.prototype);
        // Unknown member kinds fail here rather than at training time.
        ModelRegistry::global().build(&prototype)?;
        Ok(Self::new(
            args.positional(0, "bag fraction")?.unwrap_or(defaults.bag_fraction),
            args.positional(1, "member count")?.unwrap_or(defaults.n_members),
            prototype,
        )?
        .with_seed(args.option("seed")?.unwrap_or(defaults.seed)))
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.bag_fraction.to_string(), self.n_members.to_string()];
        args.push(format!("seed={}", self.seed));
        args.push(self.prototype.tag().to_string());
        args.extend(self.prototype.args().iter().cloned());
        args
    }
}

/// An ensemble of prototype clones, each trained on a random bag.
///
/// `classify` collects one vote per member; the vote fractions form the
/// distribution and ties go to the lowest class index.
#[derive(Debug)]
pub struct ResamplingEnsemble {
    kind: ResamplingKind,
    config: ResamplingConfig,
    header: ModelHeader,
    members: Vec<Box<dyn Classifier>>,
}

impl ResamplingEnsemble {
    /// Create an untrained ensemble.
    #[must_use]
    pub fn new(kind: ResamplingKind, config: ResamplingConfig) -> Self {
        Self {
            kind,
            config,
            header: ModelHeader::default(),
            members: Vec::new(),
        }
    }

    pub(crate) fn from_spec(
        kind: ResamplingKind,
        spec: &ModelSpec,
    ) -> Result<Box<dyn Classifier>, ModelError> {
        Ok(Box::new(Self::new(kind, ResamplingConfig::from_spec(spec)?)))
    }

    /// Return the flavour.
    #[must_use]
    pub fn kind(&self) -> ResamplingKind {
        self.kind
    }

    /// Return the hyperparameters.
    #[must_use]
    pub fn config(&self) -> &ResamplingConfig {
        &self.config
    }

    /// Return the trained members.
    #[must_use]
    pub fn members(&self) -> &[Box<dyn Classifier>] {
        &self.members
    }

    /// Train with bags drawn from an injected generator.
    ///
    /// One seed per member is drawn from `rng` in member order before any
    /// member trains, so the result does not depend on thread scheduling.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::EmptyTraining`] | the mask admits no samples |
    /// | [`ModelError::EmptyBag`] | the bag fraction yields zero samples |
    /// | Other model errors | From member construction or training |
    #[instrument(skip_all, fields(tag = self.kind.tag(), n_members = self.config.n_members, n_samples = data.len()))]
    pub fn train_with_rng<R: Rng>(
        &mut self,
        data: &DataSet,
        mask: Option<&SampleMask>,
        rng: &mut R,
    ) -> Result<(), ModelError> {
        let admitted = admitted_indices(mask, data.len())?;
        if admitted.is_empty() {
            return Err(ModelError::EmptyTraining);
        }
        let bag_size = (self.config.bag_fraction * admitted.len() as f64).floor() as usize;
        if bag_size == 0 {
            return Err(ModelError::EmptyBag {
                fraction: self.config.bag_fraction,
                admitted: admitted.len(),
            });
        }

        let member_seeds: Vec<u64> = (0..self.config.n_members).map(|_| rng.r#gen()).collect();
        let registry = ModelRegistry::global();
        let prototype = &self.config.prototype;

        let members = member_seeds
            .into_par_iter()
            .enumerate()
            .map(|(i, seed)| {
                let mut member_rng = ChaCha8Rng::seed_from_u64(seed);
                let picked: Vec<usize> = index::sample(&mut member_rng, admitted.len(), bag_size)
                    .iter()
                    .map(|k| admitted[k])
                    .collect();
                let bag = SampleMask::from_indices(data.len(), &picked);
                let mut member = registry.build(prototype)?;
                member.train(data, Some(&bag))?;
                debug!(member = i, bag_size, "member trained");
                Ok(member)
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        info!(
            n_members = members.len(),
            bag_size,
            n_admitted = admitted.len(),
            "resampling ensemble trained"
        );

        self.header = ModelHeader::from_dataset(data);
        self.members = members;
        Ok(())
    }
}

impl Classifier for ResamplingEnsemble {
    fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    fn spec(&self) -> ModelSpec {
        ModelSpec::new(self.kind.tag(), self.config.to_args())
    }

    fn header(&self) -> &ModelHeader {
        &self.header
    }

    fn is_trained(&self) -> bool {
        !self.members.is_empty()
    }

    /// Train with a generator seeded from the configured master seed.
    ///
    /// # Errors
    ///
    /// See [`ResamplingEnsemble::train_with_rng`].
    fn train(&mut self, data: &DataSet, mask: Option<&SampleMask>) -> Result<(), ModelError> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.train_with_rng(data, mask, &mut rng)
    }

    fn classify(&self, sample: &[f64]) -> Result<ClassDistribution, ModelError> {
        if self.members.is_empty() {
            return Err(ModelError::NotTrained {
                tag: self.kind.tag(),
            });
        }
        self.header.check_dimension(sample)?;
        let votes = self
            .members
            .iter()
            .map(|m| m.predict(sample))
            .collect::<Result<Vec<_>, _>>()?;
        ClassDistribution::from_votes(&votes, self.header.n_classes())
    }

    fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError> {
        if self.members.is_empty() {
            return Err(ModelError::NotTrained {
                tag: self.kind.tag(),
            });
        }
        writer.tag(self.kind.tag())?;
        self.header.save(writer)?;
        writer.value(self.config.bag_fraction)?;
        writer.value(self.config.n_members)?;
        writer.value(self.config.seed)?;
        writer.text(&self.config.prototype.to_string())?;
        writer.value(self.members.len())?;
        for member in &self.members {
            member.save(writer)?;
        }
        Ok(())
    }

    fn open(&mut self, reader: &mut ModelReader<'_>) -> Result<(), ModelError> {
        reader.expect_tag(self.kind.tag())?;
        let header = ModelHeader::open(reader)?;
        let bag_fraction: f64 = reader.value("bag fraction")?;
        let n_members: usize = reader.value("member count")?;
        let seed: u64 = reader.value("master seed")?;
        let prototype: ModelSpec = reader.text("member descriptor")?.parse()?;
        let config = ResamplingConfig::new(bag_fraction, n_members, prototype)?.with_seed(seed);
        let count: usize = reader.value("trained member count")?;
        let registry = ModelRegistry::global();
        let members = (0..count)
            .map(|_| registry.open(reader))
            .collect::<Result<Vec<_>, _>>()?;

        self.config = config;
        self.header = header;
        self.members = members;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> DataSet {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i)]).collect();
        let labels: Vec<usize> = (0..40).map(|i| usize::from(i >= 20)).collect();
        DataSet::from_rows(&rows, &labels).unwrap()
    }

    fn bagging(spec: &str) -> Box<dyn Classifier> {
        ModelRegistry::global().build(&spec.parse().unwrap()).unwrap()
    }

    #[test]
    fn descriptor_defaults_and_round_trip() {
        let bare = bagging("BaggedClassifier");
        assert_eq!(
            bare.spec().to_string(),
            "BaggedClassifier 0.1 10 seed=42 DiscreteNaiveBayesClassifier"
        );
        let full = "AdaBoostClassifier 0.5 3 seed=9 DiscreteNaiveBayesClassifier ewd 4 smoothing=1";
        assert_eq!(bagging(full).spec().to_string(), full);
    }

    #[test]
    fn invalid_fraction_and_count_are_rejected() {
        let build = |s: &str| ModelRegistry::global().build(&s.parse().unwrap());
        assert!(matches!(
            build("BaggedClassifier 1.5 3"),
            Err(ModelError::InvalidBagFraction { .. })
        ));
        assert!(matches!(
            build("BaggedClassifier 0.5 0"),
            Err(ModelError::InvalidMemberCount { n_members: 0 })
        ));
        assert!(matches!(
            build("BaggedClassifier 0.5 2 MysteryClassifier"),
            Err(ModelError::UnknownModelTag { .. })
        ));
    }

    #[test]
    fn empty_bag_is_configuration_error() {
        let mut model = bagging("BaggedClassifier 0.01 2");
        let err = model.train(&data(), None).unwrap_err();
        assert!(matches!(err, ModelError::EmptyBag { admitted: 40, .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn members_follow_the_prototype() {
        let mut model = bagging("BaggedClassifier 0.5 5 DiscreteNaiveBayesClassifier ewd 4");
        model.train(&data(), None).unwrap();
        assert!(model.is_trained());
        assert_eq!(model.predict(&[2.0]).unwrap(), 0);
        assert_eq!(model.predict(&[37.0]).unwrap(), 1);
        let d = model.classify(&[37.0]).unwrap();
        for p in d.as_slice() {
            assert!((p * 5.0 - (p * 5.0).round()).abs() < 1e-9);
        }
    }

    #[test]
    fn injected_generator_controls_bags() {
        let spec = "BaggedClassifier 0.3 5 DiscreteNaiveBayesClassifier ewd 4"
            .parse()
            .unwrap();
        let config = ResamplingConfig::from_spec(&spec).unwrap();
        let mut a = ResamplingEnsemble::new(ResamplingKind::Bagging, config.clone());
        let mut b = ResamplingEnsemble::new(ResamplingKind::Bagging, config);
        a.train_with_rng(&data(), None, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        b.train_with_rng(&data(), None, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        for x in 0..40 {
            let v = [f64::from(x)];
            assert_eq!(a.classify(&v).unwrap(), b.classify(&v).unwrap());
        }
    }

    #[test]
    fn untrained_save_is_rejected() {
        let model = bagging("BaggedClassifier");
        let mut buf = Vec::new();
        let err = model.save(&mut ModelWriter::new(&mut buf)).unwrap_err();
        assert!(matches!(err, ModelError::NotTrained { tag: "BaggedClassifier" }));
    }
}
