//! Naive Bayes with per-class Gaussian feature densities.

use std::f64::consts::PI;

use tessera_data::{
    DataSet, ModelReader, ModelWriter, PrincipalComponents, SampleMask, admitted_indices,
};
use tracing::{info, instrument};

use crate::classifier::{ClassDistribution, Classifier, ModelHeader};
use crate::spec::{ModelSpec, SpecArgs};
use crate::ModelError;

/// Type tag of [`ContinuousNaiveBayes`].
pub const TAG: &str = "ContinuousNaiveBayesClassifier";

/// Standard deviations are floored here so constant features keep a finite density.
const MIN_STD: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
struct Fitted {
    pca: Option<PrincipalComponents>,
    class_mass: Vec<f64>,
    means: Vec<Vec<f64>>,
    stds: Vec<Vec<f64>>,
}

/// Naive Bayes classifier over continuous features.
///
/// Each class models every feature as an independent normal distribution
/// with the weighted mean and population standard deviation of its known
/// training values. Classes without training mass score zero.
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `pca`     | `None`  |
/// | `unknown` | `None`  |
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContinuousNaiveBayes {
    pca: Option<usize>,
    unknown: Option<f64>,
    header: ModelHeader,
    fitted: Option<Fitted>,
}

impl ContinuousNaiveBayes {
    /// Create an untrained classifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce to `components` principal components first.
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

    pub(crate) fn from_spec(spec: &ModelSpec) -> Result<Box<dyn Classifier>, ModelError> {
        let args = SpecArgs::parse(spec, &["pca", "unknown"])?;
        args.at_most(0)?;
        Ok(Box::new(
            Self::new()
                .with_pca(args.option("pca")?)
                .with_unknown(args.option("unknown")?),
        ))
    }

    /// Return the per-class means, once trained.
    #[must_use]
    pub fn means(&self) -> Option<&[Vec<f64>]> {
        self.fitted.as_ref().map(|f| f.means.as_slice())
    }

    fn is_unknown(&self, v: f64) -> bool {
        self.unknown.is_some_and(|u| u == v)
    }
}

fn log_density(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    -0.5 * z * z - std.ln() - 0.5 * (2.0 * PI).ln()
}

impl Classifier for ContinuousNaiveBayes {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn spec(&self) -> ModelSpec {
        let mut args = Vec::new();
        if let Some(k) = self.pca {
            args.push(format!("pca={k}"));
        }
        if let Some(u) = self.unknown {
            args.push(format!("unknown={u}"));
        }
        ModelSpec::new(TAG, args)
    }

    fn header(&self) -> &ModelHeader {
        &self.header
    }

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::Data`] | PCA fitting failed or mask length mismatch |
    /// | [`ModelError::EmptyTraining`] | the mask admits no samples |
    /// | [`ModelError::EmptyClass`] | a class with samples never observes a feature |
    #[instrument(skip_all, fields(tag = TAG, n_samples = data.len(), n_features = data.n_features()))]
    fn train(&mut self, data: &DataSet, mask: Option<&SampleMask>) -> Result<(), ModelError> {
        let admitted = admitted_indices(mask, data.len())?;
        if admitted.is_empty() {
            return Err(ModelError::EmptyTraining);
        }
        let pca = self
            .pca
            .map(|k| PrincipalComponents::fit(data, k, self.unknown))
            .transpose()?;
        let projected;
        let (source, tracks_unknown) = match &pca {
            Some(p) => {
                projected = p.transform_dataset(data)?;
                (&projected, false)
            }
            None => (data, true),
        };

        let n_classes = source.n_classes();
        let n_features = source.n_features();
        let mut class_mass = vec![0.0f64; n_classes];
        let mut mass = vec![vec![0.0f64; n_features]; n_classes];
        let mut sums = vec![vec![0.0f64; n_features]; n_classes];
        let mut sq_sums = vec![vec![0.0f64; n_features]; n_classes];

        for &i in &admitted {
            let s = &source.samples()[i];
            let (c, w) = (s.class_index(), s.effective_weight());
            class_mass[c] += w;
            for (f, &v) in s.values().iter().enumerate() {
                if tracks_unknown && self.is_unknown(v) {
                    continue;
                }
                mass[c][f] += w;
                sums[c][f] += w * v;
                sq_sums[c][f] += w * v * v;
            }
        }

        let mut means = vec![vec![0.0f64; n_features]; n_classes];
        let mut stds = vec![vec![MIN_STD; n_features]; n_classes];
        for c in 0..n_classes {
            if class_mass[c] <= 0.0 {
                continue;
            }
            for f in 0..n_features {
                let m = mass[c][f];
                if m <= 0.0 {
                    return Err(ModelError::EmptyClass { class: c, feature: f });
                }
                let mean = sums[c][f] / m;
                let var = (sq_sums[c][f] / m - mean * mean).max(0.0);
                means[c][f] = mean;
                stds[c][f] = var.sqrt().max(MIN_STD);
            }
        }

        info!(n_classes, n_features, "continuous naive bayes trained");

        self.header = ModelHeader::from_dataset(data);
        self.fitted = Some(Fitted {
            pca,
            class_mass,
            means,
            stds,
        });
        Ok(())
    }

    fn classify(&self, sample: &[f64]) -> Result<ClassDistribution, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotTrained { tag: TAG })?;
        self.header.check_dimension(sample)?;
        let (values, tracks_unknown) = match &fitted.pca {
            Some(pca) => (pca.transform(sample)?, false),
            None => (sample.to_vec(), true),
        };
        let log_scores = fitted
            .class_mass
            .iter()
            .enumerate()
            .map(|(c, &m)| {
                if m <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                values
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| !(tracks_unknown && self.is_unknown(v)))
                    .map(|(f, &v)| log_density(v, fitted.means[c][f], fitted.stds[c][f]))
                    .sum()
            })
            .collect();
        ClassDistribution::from_log_scores(log_scores)
    }

    fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotTrained { tag: TAG })?;
        writer.tag(TAG)?;
        self.header.save(writer)?;
        writer.value(self.pca.unwrap_or(0))?;
        writer.optional(self.unknown)?;
        if let Some(pca) = &fitted.pca {
            pca.save(writer)?;
        }
        writer.value(fitted.class_mass.len())?;
        writer.value(fitted.means.first().map_or(0, Vec::len))?;
        writer.row(&fitted.class_mass)?;
        for (means, stds) in fitted.means.iter().zip(&fitted.stds) {
            writer.row(means)?;
            writer.row(stds)?;
        }
        Ok(())
    }

    fn open(&mut self, reader: &mut ModelReader<'_>) -> Result<(), ModelError> {
        reader.expect_tag(TAG)?;
        let header = ModelHeader::open(reader)?;
        let pca_components: usize = reader.value("PCA component count")?;
        let unknown = reader.optional("unknown sentinel")?;
        let pca = (pca_components > 0)
            .then(|| PrincipalComponents::open(reader))
            .transpose()?;
        let n_classes: usize = reader.value("class count")?;
        let n_features: usize = reader.value("feature count")?;
        let class_mass = reader.row(n_classes, "class masses")?;
        let mut means = Vec::with_capacity(n_classes);
        let mut stds = Vec::with_capacity(n_classes);
        for _ in 0..n_classes {
            means.push(reader.row(n_features, "class means")?);
            stds.push(reader.row(n_features, "class standard deviations")?);
        }

        self.pca = pca.as_ref().map(PrincipalComponents::n_components);
        self.unknown = unknown;
        self.header = header;
        self.fitted = Some(Fitted {
            pca,
            class_mass,
            means,
            stds,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> DataSet {
        let rows = vec![
            vec![0.0, 1.0],
            vec![0.2, 1.2],
            vec![-0.2, 0.8],
            vec![5.0, -1.0],
            vec![5.2, -1.2],
            vec![4.8, -0.8],
        ];
        DataSet::from_rows(&rows, &[0, 0, 0, 1, 1, 1]).unwrap()
    }

    #[test]
    fn separates_blobs() {
        let mut nb = ContinuousNaiveBayes::new();
        nb.train(&blobs(), None).unwrap();
        assert_eq!(nb.predict(&[0.1, 1.1]).unwrap(), 0);
        assert_eq!(nb.predict(&[4.9, -0.9]).unwrap(), 1);
        let means = nb.means().unwrap();
        assert!((means[0][0] - 0.0).abs() < 1e-12);
        assert!((means[1][1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn absent_class_scores_zero() {
        let mut nb = ContinuousNaiveBayes::new();
        let mask = SampleMask::from_indices(6, &[0, 1, 2]);
        nb.train(&blobs(), Some(&mask)).unwrap();
        let d = nb.classify(&[5.0, -1.0]).unwrap();
        assert_eq!(d.as_slice()[1], 0.0);
    }

    #[test]
    fn constant_feature_off_its_value_still_classifies() {
        // Feature 1 is constant inside each class.
        let rows = vec![
            vec![0.0, 3.0],
            vec![0.4, 3.0],
            vec![-0.4, 3.0],
            vec![5.0, 7.0],
            vec![5.4, 7.0],
            vec![4.6, 7.0],
        ];
        let data = DataSet::from_rows(&rows, &[0, 0, 0, 1, 1, 1]).unwrap();
        let mut nb = ContinuousNaiveBayes::new();
        nb.train(&data, None).unwrap();

        let d = nb.classify(&[0.1, 4.0]).unwrap();
        assert_eq!(d.predicted_class(), 0);
        assert!(d.as_slice().iter().all(|p| p.is_finite()));
        let d = nb.classify(&[4.9, 6.5]).unwrap();
        assert_eq!(d.predicted_class(), 1);
    }

    #[test]
    fn feature_never_observed_is_estimation_error() {
        let data = DataSet::from_rows(&[vec![28.0, 1.0], vec![28.0, 2.0]], &[0, 0]).unwrap();
        let mut nb = ContinuousNaiveBayes::new().with_unknown(Some(28.0));
        let err = nb.train(&data, None).unwrap_err();
        assert!(matches!(err, ModelError::EmptyClass { class: 0, feature: 0 }));
    }

    #[test]
    fn save_then_open_is_within_tolerance() {
        let mut nb = ContinuousNaiveBayes::new().with_unknown(Some(-99.0));
        nb.train(&blobs(), None).unwrap();
        let mut buf = Vec::new();
        nb.save(&mut ModelWriter::new(&mut buf)).unwrap();
        let mut back = ContinuousNaiveBayes::new();
        let mut src = buf.as_slice();
        back.open(&mut ModelReader::new(&mut src)).unwrap();
        for x in [[0.0, 1.0], [2.5, 0.0], [5.0, -99.0]] {
            let a = nb.classify(&x).unwrap();
            let b = back.classify(&x).unwrap();
            for (p, q) in a.as_slice().iter().zip(b.as_slice()) {
                assert!((p - q).abs() < 1e-12);
            }
        }
        assert_eq!(back.spec(), nb.spec());
    }
}
