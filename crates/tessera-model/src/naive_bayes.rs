//! Naive Bayes over discretized features.

use tessera_data::{
    Binning, DataSet, Discretize, DiscretizedDataSet, Discretizer, ModelReader, ModelWriter,
    PrincipalComponents, SampleMask, StreamError,
};
use tracing::{info, instrument};

use crate::classifier::{ClassDistribution, Classifier, ModelHeader};
use crate::frequency::FrequencyTable;
use crate::spec::{ModelSpec, SpecArgs};
use crate::ModelError;

/// Type tag of [`DiscreteNaiveBayes`].
pub const TAG: &str = "DiscreteNaiveBayesClassifier";

/// Hyperparameters of [`DiscreteNaiveBayes`].
///
/// # Defaults
///
/// | Parameter   | Default          |
/// |-------------|------------------|
/// | `binning`   | `EqualFrequency` |
/// | `bins`      | 20               |
/// | `smoothing` | 1.0              |
/// | `pca`       | `None`           |
/// | `unknown`   | `None`           |
#[derive(Debug, Clone, PartialEq)]
pub struct NaiveBayesConfig {
    binning: Binning,
    bins: usize,
    smoothing: f64,
    pca: Option<usize>,
    unknown: Option<f64>,
}

impl NaiveBayesConfig {
    /// Create a config with the given binning.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Data`] wrapping `InvalidBinCount` if `bins < 2`.
    pub fn new(binning: Binning, bins: usize) -> Result<Self, ModelError> {
        Discretizer::new(binning, bins)?;
        Ok(Self {
            binning,
            bins,
            smoothing: 1.0,
            pca: None,
            unknown: None,
        })
    }

    /// Set the additive smoothing constant.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidSmoothing`] if negative or not finite.
    pub fn with_smoothing(mut self, smoothing: f64) -> Result<Self, ModelError> {
        if !(smoothing.is_finite() && smoothing >= 0.0) {
            return Err(ModelError::InvalidSmoothing { smoothing });
        }
        self.smoothing = smoothing;
        Ok(self)
    }

    /// Reduce to `components` principal components before discretizing.
    #[must_use]
    pub fn with_pca(mut self, components: Option<usize>) -> Self {
        self.pca = components.filter(|&k| k > 0);
        self
    }

    /// Track values equal to `unknown` as missing.
    #[must_use]
    pub fn with_unknown(mut self, unknown: Option<f64>) -> Self {
        self.unknown = unknown;
        self
    }

    /// Return the binning strategy.
    #[must_use]
    pub fn binning(&self) -> Binning {
        self.binning
    }

    /// Return the bin count.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Return the smoothing constant.
    #[must_use]
    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    /// Return the PCA component count, if enabled.
    #[must_use]
    pub fn pca(&self) -> Option<usize> {
        self.pca
    }

    /// Return the unknown sentinel, if tracked.
    #[must_use]
    pub fn unknown(&self) -> Option<f64> {
        self.unknown
    }

    /// Parse `[binning [bins]] [smoothing=α] [pca=k] [unknown=v]`.
    pub(crate) fn from_spec(spec: &ModelSpec) -> Result<Self, ModelError> {
        let args = SpecArgs::parse(spec, &["smoothing", "pca", "unknown"])?;
        args.at_most(2)?;
        let binning = args
            .positional::<Binning>(0, "binning")?
            .unwrap_or(Binning::EqualFrequency);
        let bins = args.positional(1, "bin count")?.unwrap_or(20);
        let config = Self::new(binning, bins)?
            .with_smoothing(args.option("smoothing")?.unwrap_or(1.0))?
            .with_pca(args.option("pca")?)
            .with_unknown(args.option("unknown")?);
        Ok(config)
    }

    pub(crate) fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.binning.short_name().to_string(),
            self.bins.to_string(),
            format!("smoothing={}", self.smoothing),
        ];
        if let Some(k) = self.pca {
            args.push(format!("pca={k}"));
        }
        if let Some(u) = self.unknown {
            args.push(format!("unknown={u}"));
        }
        args
    }

    fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError> {
        writer.value(self.smoothing)?;
        writer.value(self.pca.unwrap_or(0))?;
        writer.optional(self.unknown)?;
        Ok(())
    }
}

impl Default for NaiveBayesConfig {
    fn default() -> Self {
        Self {
            binning: Binning::EqualFrequency,
            bins: 20,
            smoothing: 1.0,
            pca: None,
            unknown: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Fitted {
    pca: Option<PrincipalComponents>,
    discretizer: Discretizer,
    table: FrequencyTable,
}

/// Naive Bayes classifier over discretized (optionally PCA-reduced) features.
///
/// Classification multiplies the class-conditional frequencies of every
/// known code, starting from 1 with no class prior, then normalizes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiscreteNaiveBayes {
    config: NaiveBayesConfig,
    header: ModelHeader,
    fitted: Option<Fitted>,
}

impl DiscreteNaiveBayes {
    /// Create an untrained classifier.
    #[must_use]
    pub fn new(config: NaiveBayesConfig) -> Self {
        Self {
            config,
            header: ModelHeader::default(),
            fitted: None,
        }
    }

    pub(crate) fn from_spec(spec: &ModelSpec) -> Result<Box<dyn Classifier>, ModelError> {
        Ok(Box::new(Self::new(NaiveBayesConfig::from_spec(spec)?)))
    }

    /// Return the hyperparameters.
    #[must_use]
    pub fn config(&self) -> &NaiveBayesConfig {
        &self.config
    }

    /// Return the frequency table, once trained.
    #[must_use]
    pub fn table(&self) -> Option<&FrequencyTable> {
        self.fitted.as_ref().map(|f| &f.table)
    }

    fn fitted(&self) -> Result<&Fitted, ModelError> {
        self.fitted.as_ref().ok_or(ModelError::NotTrained { tag: TAG })
    }

    /// Map a raw feature vector to codes through the fitted PCA and discretizer.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotTrained`] or [`ModelError::FeatureCountMismatch`].
    pub fn codes(&self, sample: &[f64]) -> Result<Vec<Option<usize>>, ModelError> {
        let fitted = self.fitted()?;
        self.header.check_dimension(sample)?;
        let codes = match &fitted.pca {
            Some(pca) => fitted.discretizer.discretize(&pca.transform(sample)?)?,
            None => fitted.discretizer.discretize(sample)?,
        };
        Ok(codes)
    }

    /// Classify a vector that is already discretized.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::NotTrained`] | called before training |
    /// | [`ModelError::FeatureCountMismatch`] | wrong number of codes |
    /// | [`ModelError::CodeOutOfRange`] | a code exceeds its fitted range |
    /// | [`ModelError::DegenerateScores`] | every class has a zero frequency product |
    pub fn classify_codes(&self, codes: &[Option<usize>]) -> Result<ClassDistribution, ModelError> {
        let log_scores = self.fitted()?.table.log_scores(codes)?;
        ClassDistribution::from_log_scores(log_scores)
    }
}

impl Classifier for DiscreteNaiveBayes {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn spec(&self) -> ModelSpec {
        ModelSpec::new(TAG, self.config.to_args())
    }

    fn header(&self) -> &ModelHeader {
        &self.header
    }

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fit PCA and the discretizer on all samples, then count the admitted ones.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::Data`] | PCA or discretizer fitting failed, or mask length mismatch |
    /// | [`ModelError::EmptyTraining`] | the mask admits no samples |
    /// | [`ModelError::ZeroDenominator`] | zero smoothing and a class has no mass |
    #[instrument(skip_all, fields(tag = TAG, n_samples = data.len(), n_features = data.n_features()))]
    fn train(&mut self, data: &DataSet, mask: Option<&SampleMask>) -> Result<(), ModelError> {
        let pca = self
            .config
            .pca
            .map(|k| PrincipalComponents::fit(data, k, self.config.unknown))
            .transpose()?;
        let projected;
        let (source, discretizer_unknown) = match &pca {
            Some(p) => {
                projected = p.transform_dataset(data)?;
                (&projected, None)
            }
            None => (data, self.config.unknown),
        };

        let mut discretizer =
            Discretizer::new(self.config.binning, self.config.bins)?.with_unknown(discretizer_unknown);
        discretizer.fit(source)?;
        let coded = DiscretizedDataSet::from_dataset(source, &discretizer)?;
        let table = FrequencyTable::estimate(
            &coded,
            mask,
            self.config.smoothing,
            discretizer_unknown.is_some(),
        )?;

        info!(
            n_classes = table.n_classes(),
            width = table.layout().width(),
            "discrete naive bayes trained"
        );

        self.header = ModelHeader::from_dataset(data);
        self.fitted = Some(Fitted {
            pca,
            discretizer,
            table,
        });
        Ok(())
    }

    fn classify(&self, sample: &[f64]) -> Result<ClassDistribution, ModelError> {
        self.classify_codes(&self.codes(sample)?)
    }

    fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError> {
        let fitted = self.fitted()?;
        writer.tag(TAG)?;
        self.header.save(writer)?;
        self.config.save(writer)?;
        if let Some(pca) = &fitted.pca {
            pca.save(writer)?;
        }
        fitted.discretizer.save(writer)?;
        fitted.table.save(writer)
    }

    fn open(&mut self, reader: &mut ModelReader<'_>) -> Result<(), ModelError> {
        reader.expect_tag(TAG)?;
        let header = ModelHeader::open(reader)?;
        let smoothing: f64 = reader.value("smoothing")?;
        let pca_components: usize = reader.value("PCA component count")?;
        let unknown = reader.optional("unknown sentinel")?;
        let pca = (pca_components > 0)
            .then(|| PrincipalComponents::open(reader))
            .transpose()?;
        let discretizer = Discretizer::open(reader)?;
        let table = FrequencyTable::open(reader)?;
        if table.layout().ranges() != discretizer.ranges().as_slice()
            || table.n_classes() != header.n_classes()
        {
            return Err(StreamError::Malformed {
                line: reader.line_number(),
                expected: "frequency table matching the discretizer and class names",
                found: format!(
                    "{} classes over ranges {:?}",
                    table.n_classes(),
                    table.layout().ranges()
                ),
            }
            .into());
        }

        let config = NaiveBayesConfig::new(discretizer.binning(), discretizer.bins())?
            .with_smoothing(smoothing)?
            .with_pca(pca.as_ref().map(PrincipalComponents::n_components))
            .with_unknown(unknown);

        self.config = config;
        self.header = header;
        self.fitted = Some(Fitted {
            pca,
            discretizer,
            table,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_data::FeatureVector;

    fn two_class_binary() -> DataSet {
        DataSet::from_rows(&[vec![0.0], vec![0.0], vec![1.0], vec![1.0]], &[0, 0, 1, 1]).unwrap()
    }

    fn ewd2() -> NaiveBayesConfig {
        NaiveBayesConfig::new(Binning::EqualWidth, 2).unwrap()
    }

    #[test]
    fn binary_feature_scenario() {
        let mut nb = DiscreteNaiveBayes::new(ewd2());
        nb.train(&two_class_binary(), None).unwrap();
        let table = nb.table().unwrap();
        assert_eq!(table.frequency(0, 0, 0).unwrap(), 0.75);
        assert_eq!(table.frequency(0, 0, 1).unwrap(), 0.25);

        let d = nb.classify(&[0.0]).unwrap();
        assert_eq!(d.predicted_class(), 0);
        assert!((d.as_slice()[0] - 0.75).abs() < 1e-12);
        assert!((d.as_slice()[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn hundreds_of_features_do_not_underflow() {
        let n_features = 400;
        let rows: Vec<Vec<f64>> = (0..200)
            .map(|i| {
                let class = (i % 2) as f64;
                (0..n_features)
                    .map(|f| class + f64::from((i * 7 + f * 13) % 17) / 20.0)
                    .collect()
            })
            .collect();
        let labels: Vec<usize> = (0..200).map(|i| i % 2).collect();
        let data = DataSet::from_rows(&rows, &labels).unwrap();
        let mut nb = DiscreteNaiveBayes::new(NaiveBayesConfig::new(Binning::EqualWidth, 20).unwrap());
        nb.train(&data, None).unwrap();

        for (row, &label) in rows.iter().zip(&labels).take(10) {
            let d = nb.classify(row).unwrap();
            assert_eq!(d.predicted_class(), label);
            assert!((d.as_slice().iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn classify_before_training_fails() {
        let nb = DiscreteNaiveBayes::default();
        assert!(matches!(
            nb.classify(&[0.0]),
            Err(ModelError::NotTrained { .. })
        ));
    }

    #[test]
    fn wrong_dimension_is_range_error() {
        let mut nb = DiscreteNaiveBayes::new(ewd2());
        nb.train(&two_class_binary(), None).unwrap();
        let err = nb.classify(&[0.0, 1.0]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Range);
    }

    #[test]
    fn out_of_range_code_is_range_error() {
        let mut nb = DiscreteNaiveBayes::new(ewd2());
        nb.train(&two_class_binary(), None).unwrap();
        let err = nb.classify_codes(&[Some(5)]).unwrap_err();
        assert!(matches!(err, ModelError::CodeOutOfRange { code: 5, .. }));
    }

    #[test]
    fn unknown_values_are_skipped() {
        let mut data = DataSet::new(
            vec!["a".to_string(), "b".to_string()],
            vec!["x".to_string(), "y".to_string()],
        )
        .unwrap();
        for (x, y, c) in [(0.0, 0.0, 0), (0.0, -1.0, 0), (1.0, 1.0, 1), (1.0, 1.0, 1)] {
            data.push(FeatureVector::new(vec![x, y], c)).unwrap();
        }
        let config = ewd2().with_unknown(Some(-1.0));
        let mut nb = DiscreteNaiveBayes::new(config);
        nb.train(&data, None).unwrap();
        assert_eq!(nb.codes(&[1.0, -1.0]).unwrap(), vec![Some(1), None]);
        let only_x = nb.classify(&[1.0, -1.0]).unwrap();
        assert_eq!(only_x.predicted_class(), 1);
    }

    #[test]
    fn pca_path_trains_and_classifies() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let t = f64::from(i);
                vec![t, 2.0 * t + 0.5]
            })
            .collect();
        let labels: Vec<usize> = (0..20).map(|i| usize::from(i >= 10)).collect();
        let data = DataSet::from_rows(&rows, &labels).unwrap();
        let config = NaiveBayesConfig::new(Binning::EqualWidth, 4)
            .unwrap()
            .with_pca(Some(1));
        let mut nb = DiscreteNaiveBayes::new(config);
        nb.train(&data, None).unwrap();
        assert_eq!(nb.predict(&[1.0, 2.5]).unwrap(), 0);
        assert_eq!(nb.predict(&[18.0, 36.5]).unwrap(), 1);
    }

    #[test]
    fn spec_round_trip() {
        let spec: ModelSpec = "DiscreteNaiveBayesClassifier ewd 7 smoothing=0.5 unknown=28"
            .parse()
            .unwrap();
        let config = NaiveBayesConfig::from_spec(&spec).unwrap();
        assert_eq!(config.binning(), Binning::EqualWidth);
        assert_eq!(config.bins(), 7);
        assert_eq!(config.unknown(), Some(28.0));
        let again = NaiveBayesConfig::from_spec(&DiscreteNaiveBayes::new(config.clone()).spec()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn bare_spec_uses_defaults() {
        let config = NaiveBayesConfig::from_spec(&ModelSpec::bare(TAG)).unwrap();
        assert_eq!(config, NaiveBayesConfig::default());
    }

    #[test]
    fn save_then_open_reproduces_classification() {
        let mut nb = DiscreteNaiveBayes::new(ewd2().with_smoothing(0.7).unwrap());
        nb.train(&two_class_binary(), None).unwrap();
        let mut buf = Vec::new();
        nb.save(&mut ModelWriter::new(&mut buf)).unwrap();

        let mut back = DiscreteNaiveBayes::default();
        let mut src = buf.as_slice();
        back.open(&mut ModelReader::new(&mut src)).unwrap();
        assert_eq!(back, nb);
        for x in [0.0, 0.3, 1.0] {
            assert_eq!(back.classify(&[x]).unwrap(), nb.classify(&[x]).unwrap());
        }
    }

    #[test]
    fn failed_open_leaves_model_untouched() {
        let mut nb = DiscreteNaiveBayes::new(ewd2());
        nb.train(&two_class_binary(), None).unwrap();
        let before = nb.clone();
        let truncated = format!("{TAG}\n2\nneg\n");
        let mut src = truncated.as_bytes();
        assert!(nb.open(&mut ModelReader::new(&mut src)).is_err());
        assert_eq!(nb, before);
    }

    #[test]
    fn table_disagreeing_with_discretizer_is_rejected() {
        let saved = |config: NaiveBayesConfig| {
            let mut nb = DiscreteNaiveBayes::new(config);
            nb.train(&two_class_binary(), None).unwrap();
            let mut buf = Vec::new();
            nb.save(&mut ModelWriter::new(&mut buf)).unwrap();
            String::from_utf8(buf).unwrap()
        };
        let two_bins = saved(ewd2());
        let three_bins = saved(NaiveBayesConfig::new(Binning::EqualWidth, 3).unwrap());
        let split = |text: &str| text.find("FrequencyTable\n").unwrap();
        let spliced = format!(
            "{}{}",
            &three_bins[..split(&three_bins)],
            &two_bins[split(&two_bins)..]
        );

        let mut nb = DiscreteNaiveBayes::default();
        let mut src = spliced.as_bytes();
        let err = nb.open(&mut ModelReader::new(&mut src)).unwrap_err();
        assert!(matches!(err, ModelError::Stream(StreamError::Malformed { .. })), "{err:?}");
        assert!(!nb.is_trained());
    }

    #[test]
    fn entropy_binning_trains_and_reopens() {
        let spec: ModelSpec = "DiscreteNaiveBayesClassifier ebd 4".parse().unwrap();
        let config = NaiveBayesConfig::from_spec(&spec).unwrap();
        assert_eq!(config.binning(), Binning::Entropy);
        let rows: Vec<Vec<f64>> = (0..12).map(|i| vec![f64::from(i), 5.0]).collect();
        let labels: Vec<usize> = (0..12).map(|i| usize::from(i >= 6)).collect();
        let data = DataSet::from_rows(&rows, &labels).unwrap();
        let mut nb = DiscreteNaiveBayes::new(config);
        nb.train(&data, None).unwrap();
        assert_eq!(nb.predict(&[1.0, 5.0]).unwrap(), 0);
        assert_eq!(nb.predict(&[10.0, 5.0]).unwrap(), 1);

        let mut buf = Vec::new();
        nb.save(&mut ModelWriter::new(&mut buf)).unwrap();
        assert!(String::from_utf8_lossy(&buf).contains("\nEntropyDiscretizer\n"));
        let mut back = DiscreteNaiveBayes::default();
        let mut src = buf.as_slice();
        back.open(&mut ModelReader::new(&mut src)).unwrap();
        assert_eq!(back, nb);
        assert_eq!(back.spec(), nb.spec());
    }
}
