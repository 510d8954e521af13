//! Principal component projection fitted from a dataset's covariance matrix.

use tracing::{debug, instrument};

use crate::stream::{ModelReader, ModelWriter, StreamError};
use crate::{DataError, DataSet};

const TAG: &str = "PrincipalComponents";
const MAX_SWEEPS: usize = 100;
const OFF_DIAGONAL_TOL: f64 = 1e-22;

/// A fitted linear projection onto the leading eigenvectors of the covariance.
///
/// Values equal to the unknown sentinel are ignored when estimating the mean
/// and covariance and are replaced by the feature mean before projecting.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalComponents {
    mean: Vec<f64>,
    components: Vec<Vec<f64>>,
    eigenvalues: Vec<f64>,
    unknown: Option<f64>,
}

impl PrincipalComponents {
    /// Fit the `n_components` leading components of `data`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`DataError::InvalidComponentCount`] | `n_components` is 0 or exceeds the feature count |
    /// | [`DataError::TooFewSamples`] | fewer than two samples |
    #[instrument(skip_all, fields(n_samples = data.len(), n_features = data.n_features(), n_components = n_components))]
    pub fn fit(data: &DataSet, n_components: usize, unknown: Option<f64>) -> Result<Self, DataError> {
        let d = data.n_features();
        if n_components == 0 || n_components > d {
            return Err(DataError::InvalidComponentCount {
                components: n_components,
                n_features: d,
            });
        }
        let n = data.len();
        if n < 2 {
            return Err(DataError::TooFewSamples { n_samples: n });
        }

        let is_unknown = |v: f64| unknown.is_some_and(|u| u == v);

        let mut sums = vec![0.0f64; d];
        let mut counts = vec![0usize; d];
        for s in data.samples() {
            for (f, &v) in s.values().iter().enumerate() {
                if !is_unknown(v) {
                    sums[f] += v;
                    counts[f] += 1;
                }
            }
        }
        let mean: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
            .collect();

        let mut cov = vec![vec![0.0f64; d]; d];
        for s in data.samples() {
            let dev: Vec<f64> = s
                .values()
                .iter()
                .zip(&mean)
                .map(|(&v, &m)| if is_unknown(v) { 0.0 } else { v - m })
                .collect();
            for i in 0..d {
                for j in i..d {
                    cov[i][j] += dev[i] * dev[j];
                }
            }
        }
        let denom = (n - 1) as f64;
        for i in 0..d {
            for j in i..d {
                cov[i][j] /= denom;
                cov[j][i] = cov[i][j];
            }
        }

        let (values, vectors) = jacobi_eigen(cov);
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

        let components: Vec<Vec<f64>> = order[..n_components]
            .iter()
            .map(|&k| {
                let mut v: Vec<f64> = (0..d).map(|row| vectors[row][k]).collect();
                // Fix the sign so the largest-magnitude entry is positive.
                let pivot = v
                    .iter()
                    .copied()
                    .fold(0.0f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
                if pivot < 0.0 {
                    v.iter_mut().for_each(|x| *x = -*x);
                }
                v
            })
            .collect();
        let eigenvalues = order[..n_components].iter().map(|&k| values[k]).collect();

        debug!("principal components fitted");
        Ok(Self {
            mean,
            components,
            eigenvalues,
            unknown,
        })
    }

    /// Return the input dimension.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Return the output dimension.
    #[must_use]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Return the variance captured by each kept component.
    #[must_use]
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Project one vector onto the kept components.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::FeatureCountMismatch`] when the vector length differs
    /// from the fitted input dimension.
    pub fn transform(&self, values: &[f64]) -> Result<Vec<f64>, DataError> {
        if values.len() != self.mean.len() {
            return Err(DataError::FeatureCountMismatch {
                expected: self.mean.len(),
                got: values.len(),
                sample_index: 0,
            });
        }
        let centered: Vec<f64> = values
            .iter()
            .zip(&self.mean)
            .map(|(&v, &m)| {
                if self.unknown.is_some_and(|u| u == v) {
                    0.0
                } else {
                    v - m
                }
            })
            .collect();
        Ok(self
            .components
            .iter()
            .map(|w| w.iter().zip(&centered).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// Project every sample of `data`, renaming features `pc0`, `pc1`, ...
    ///
    /// # Errors
    ///
    /// Propagates [`PrincipalComponents::transform`] and dataset validation errors.
    pub fn transform_dataset(&self, data: &DataSet) -> Result<DataSet, DataError> {
        let names = (0..self.n_components()).map(|i| format!("pc{i}")).collect();
        let mut out = DataSet::new(data.class_names().to_vec(), names)?;
        for s in data.samples() {
            let mut v = crate::FeatureVector::new(self.transform(s.values())?, s.class_index());
            if let Some(w) = s.weight() {
                v = v.with_weight(w);
            }
            out.push(v)?;
        }
        for step in data.preprocessing() {
            out = out.with_preprocessing(step.clone());
        }
        Ok(out.with_preprocessing(format!("pca {}", self.n_components())))
    }

    /// Write the fitted projection.
    pub fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), StreamError> {
        writer.tag(TAG)?;
        writer.value(self.n_features())?;
        writer.value(self.n_components())?;
        writer.optional(self.unknown)?;
        writer.row(&self.mean)?;
        for c in &self.components {
            writer.row(c)?;
        }
        writer.row(&self.eigenvalues)
    }

    /// Read a projection written by [`PrincipalComponents::save`].
    pub fn open(reader: &mut ModelReader<'_>) -> Result<Self, DataError> {
        reader.expect_tag(TAG)?;
        let d: usize = reader.value("PCA input dimension")?;
        let k: usize = reader.value("PCA component count")?;
        if k == 0 || k > d {
            return Err(DataError::InvalidComponentCount {
                components: k,
                n_features: d,
            });
        }
        let unknown = reader.optional("unknown sentinel")?;
        let mean = reader.row(d, "PCA mean")?;
        let components = (0..k)
            .map(|_| reader.row(d, "PCA component"))
            .collect::<Result<Vec<Vec<f64>>, _>>()?;
        let eigenvalues = reader.row(k, "PCA eigenvalues")?;
        Ok(Self {
            mean,
            components,
            eigenvalues,
            unknown,
        })
    }
}

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix.
///
/// Returns the eigenvalues and a matrix whose column `k` is the eigenvector of
/// eigenvalue `k`.
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off < OFF_DIAGONAL_TOL {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q] == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for row in a.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
                for k in 0..n {
                    let (pk, qk) = (a[p][k], a[q][k]);
                    a[p][k] = c * pk - s * qk;
                    a[q][k] = s * pk + c * qk;
                }
                for row in v.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
            }
        }
    }

    let values = (0..n).map(|i| a[i][i]).collect();
    (values, v)
}
