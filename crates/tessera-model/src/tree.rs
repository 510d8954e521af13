//! CART decision tree, persisted as an embedded binary blob.
//!
//! The tree keeps its native state (an arena of nodes) in a serde-derived
//! struct and writes it with `bincode` behind a short text header, the same
//! way any foreign classifier engine would be embedded in a model stream.

use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tessera_data::{DataSet, ModelReader, ModelWriter, SampleMask, admitted_indices};
use tracing::{debug, info, instrument};

use crate::classifier::{ClassDistribution, Classifier, ModelHeader};
use crate::spec::{ModelSpec, SpecArgs};
use crate::ModelError;

/// Type tag of [`DecisionTreeClassifier`].
pub const TAG: &str = "DecisionTreeClassifier";

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Compute the impurity of a node from its weighted class masses.
    ///
    /// Returns 0.0 when `total` is zero.
    #[must_use]
    pub fn impurity(self, class_mass: &[f64], total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        match self {
            SplitCriterion::Gini => {
                1.0 - class_mass
                    .iter()
                    .map(|&m| {
                        let p = m / total;
                        p * p
                    })
                    .sum::<f64>()
            }
            SplitCriterion::Entropy => -class_mass
                .iter()
                .filter(|&&m| m > 0.0)
                .map(|&m| {
                    let p = m / total;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

impl fmt::Display for SplitCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SplitCriterion::Gini => "gini",
            SplitCriterion::Entropy => "entropy",
        })
    }
}

impl FromStr for SplitCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gini" => Ok(SplitCriterion::Gini),
            "entropy" => Ok(SplitCriterion::Entropy),
            other => Err(format!("unknown split criterion {other:?}")),
        }
    }
}

/// Hyperparameters of [`DecisionTreeClassifier`].
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `criterion`         | `Gini`                |
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    criterion: SplitCriterion,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: Option<usize>,
    seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            criterion: SplitCriterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

impl TreeConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the maximum tree depth (root is depth 0).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the maximum number of features to consider at each split.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed for feature subsampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the split criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn validate(&self, n_features: usize) -> Result<usize, ModelError> {
        let invalid = |reason: String| ModelError::InvalidSpec {
            tag: TAG.to_string(),
            reason,
        };
        if self.max_depth == Some(0) {
            return Err(invalid("depth must be at least 1".to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(invalid(format!(
                "min_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf < 1 {
            return Err(invalid("min_leaf must be at least 1".to_string()));
        }
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(invalid(format!(
                "max_features {max_features} outside [1, {n_features}]"
            )));
        }
        Ok(max_features)
    }

    fn from_spec(spec: &ModelSpec) -> Result<Self, ModelError> {
        let args = SpecArgs::parse(
            spec,
            &["criterion", "depth", "min_split", "min_leaf", "max_features", "seed"],
        )?;
        args.at_most(0)?;
        let defaults = Self::default();
        let criterion = args
            .option::<String>("criterion")?
            .map(|c| c.parse::<SplitCriterion>().map_err(|e| spec.invalid(e)))
            .transpose()?
            .unwrap_or(defaults.criterion);
        Ok(Self::new()
            .with_criterion(criterion)
            .with_max_depth(args.option("depth")?)
            .with_min_samples_split(args.option("min_split")?.unwrap_or(defaults.min_samples_split))
            .with_min_samples_leaf(args.option("min_leaf")?.unwrap_or(defaults.min_samples_leaf))
            .with_max_features(args.option("max_features")?)
            .with_seed(args.option("seed")?.unwrap_or(defaults.seed)))
    }

    fn to_args(&self) -> Vec<String> {
        let defaults = Self::default();
        let mut args = Vec::new();
        if self.criterion != defaults.criterion {
            args.push(format!("criterion={}", self.criterion));
        }
        if let Some(d) = self.max_depth {
            args.push(format!("depth={d}"));
        }
        if self.min_samples_split != defaults.min_samples_split {
            args.push(format!("min_split={}", self.min_samples_split));
        }
        if self.min_samples_leaf != defaults.min_samples_leaf {
            args.push(format!("min_leaf={}", self.min_samples_leaf));
        }
        if let Some(m) = self.max_features {
            args.push(format!("max_features={m}"));
        }
        if self.seed != defaults.seed {
            args.push(format!("seed={}", self.seed));
        }
        args
    }
}

/// A node in the tree arena. Children are arena indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

/// The engine's native state, carried as a blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TreeState {
    nodes: Vec<Node>,
    n_features: usize,
    n_classes: usize,
}

impl TreeState {
    fn leaf(&self, sample: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if sample[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((*left, d + 1));
                    stack.push((*right, d + 1));
                }
            }
        }
        max_depth
    }

    /// Reject arenas whose child links could not have come from `build`.
    fn check(&self) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    *feature < self.n_features
                        && *left > i
                        && *right > i
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
                Node::Leaf { distribution } => distribution.len() == self.n_classes,
            })
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct Builder<'a> {
    columns: &'a [Vec<f64>],
    labels: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
    config: &'a TreeConfig,
    max_features: usize,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl Builder<'_> {
    fn class_mass(&self, indices: &[usize]) -> Vec<f64> {
        let mut mass = vec![0.0; self.n_classes];
        for &i in indices {
            mass[self.labels[i]] += self.weights[i];
        }
        mass
    }

    fn build(&mut self, indices: &[usize], depth: usize) -> usize {
        let mass = self.class_mass(indices);
        let total: f64 = mass.iter().sum();
        let impurity = self.config.criterion.impurity(&mass, total);

        let depth_exceeded = self.config.max_depth.is_some_and(|d| depth >= d);
        let stop = indices.len() < self.config.min_samples_split || impurity <= 0.0 || depth_exceeded;
        let split = if stop {
            None
        } else {
            self.best_split(indices, &mass, total, impurity)
        };
        let Some(split) = split else {
            let distribution = if total > 0.0 {
                mass.iter().map(|&m| m / total).collect()
            } else {
                vec![1.0 / self.n_classes as f64; self.n_classes]
            };
            self.arena.push(Node::Leaf { distribution });
            return self.arena.len() - 1;
        };

        // Reserve the slot so children land at higher indices.
        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            distribution: Vec::new(),
        });
        let left = self.build(&split.left, depth + 1);
        let right = self.build(&split.right, depth + 1);
        self.arena[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(
        &mut self,
        indices: &[usize],
        parent: &[f64],
        total: f64,
        impurity: f64,
    ) -> Option<Split> {
        let n_features = self.columns.len();
        let mut order: Vec<usize> = (0..n_features).collect();
        for i in 0..self.max_features {
            let j = self.rng.gen_range(i..n_features);
            order.swap(i, j);
        }
        let mut candidates = order[..self.max_features].to_vec();
        candidates.sort_unstable();

        let min_leaf = self.config.min_samples_leaf;
        let n = indices.len();
        let mut best_decrease = 0.0;
        let mut best: Option<(usize, f64)> = None;

        for feature in candidates {
            let column = &self.columns[feature];
            let mut sorted: Vec<(f64, usize)> = indices.iter().map(|&i| (column[i], i)).collect();
            sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0.0; self.n_classes];
            let mut right = parent.to_vec();
            let mut left_total = 0.0;
            for k in 0..n - 1 {
                let (value, i) = sorted[k];
                let w = self.weights[i];
                left[self.labels[i]] += w;
                right[self.labels[i]] -= w;
                left_total += w;

                let next = sorted[k + 1].0;
                if value == next || k + 1 < min_leaf || n - k - 1 < min_leaf {
                    continue;
                }
                let right_total = total - left_total;
                let decrease = total * impurity
                    - left_total * self.config.criterion.impurity(&left, left_total)
                    - right_total * self.config.criterion.impurity(&right, right_total);
                if decrease > best_decrease {
                    best_decrease = decrease;
                    best = Some((feature, (value + next) / 2.0));
                }
            }
        }

        let (feature, threshold) = best?;
        let column = &self.columns[feature];
        let (left, right) = indices.iter().partition(|&&i| column[i] <= threshold);
        Some(Split {
            feature,
            threshold,
            left,
            right,
        })
    }
}

/// CART decision tree classifier.
///
/// Samples go left when `value <= threshold`. Leaves store the weighted
/// class distribution of their training samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionTreeClassifier {
    config: TreeConfig,
    header: ModelHeader,
    state: Option<TreeState>,
}

impl DecisionTreeClassifier {
    /// Create an untrained tree.
    #[must_use]
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            header: ModelHeader::default(),
            state: None,
        }
    }

    pub(crate) fn from_spec(spec: &ModelSpec) -> Result<Box<dyn Classifier>, ModelError> {
        Ok(Box::new(Self::new(TreeConfig::from_spec(spec)?)))
    }

    /// Return the hyperparameters.
    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Return the fitted depth, once trained. A single leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> Option<usize> {
        self.state.as_ref().map(TreeState::depth)
    }

    /// Return the number of arena nodes, once trained.
    #[must_use]
    pub fn n_nodes(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.nodes.len())
    }
}

impl Classifier for DecisionTreeClassifier {
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
        self.state.is_some()
    }

    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::InvalidSpec`] | depth, split or leaf limits out of range |
    /// | [`ModelError::EmptyTraining`] | the mask admits no samples |
    /// | [`ModelError::Data`] | mask length mismatch |
    #[instrument(skip_all, fields(tag = TAG, n_samples = data.len(), n_features = data.n_features()))]
    fn train(&mut self, data: &DataSet, mask: Option<&SampleMask>) -> Result<(), ModelError> {
        let max_features = self.config.validate(data.n_features())?;
        let admitted = admitted_indices(mask, data.len())?;
        if admitted.is_empty() {
            return Err(ModelError::EmptyTraining);
        }
        let columns: Vec<Vec<f64>> = (0..data.n_features()).map(|f| data.column(f)).collect();
        let labels = data.labels();
        let weights: Vec<f64> = data.samples().iter().map(|s| s.effective_weight()).collect();

        let mut builder = Builder {
            columns: &columns,
            labels: &labels,
            weights: &weights,
            n_classes: data.n_classes(),
            config: &self.config,
            max_features,
            rng: ChaCha8Rng::seed_from_u64(self.config.seed),
            arena: Vec::new(),
        };
        builder.build(&admitted, 0);
        let state = TreeState {
            nodes: builder.arena,
            n_features: data.n_features(),
            n_classes: data.n_classes(),
        };
        debug!(n_nodes = state.nodes.len(), depth = state.depth(), "decision tree built");
        info!(n_admitted = admitted.len(), "decision tree trained");

        self.header = ModelHeader::from_dataset(data);
        self.state = Some(state);
        Ok(())
    }

    fn classify(&self, sample: &[f64]) -> Result<ClassDistribution, ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotTrained { tag: TAG })?;
        self.header.check_dimension(sample)?;
        Ok(ClassDistribution::new(state.leaf(sample).to_vec()))
    }

    fn save(&self, writer: &mut ModelWriter<'_>) -> Result<(), ModelError> {
        let state = self.state.as_ref().ok_or(ModelError::NotTrained { tag: TAG })?;
        writer.tag(TAG)?;
        self.header.save(writer)?;
        writer.text(&self.spec().to_string())?;
        let bytes = bincode::serialize(state).map_err(|source| ModelError::SerializeBlob { source })?;
        writer.blob(&bytes)?;
        Ok(())
    }

    fn open(&mut self, reader: &mut ModelReader<'_>) -> Result<(), ModelError> {
        reader.expect_tag(TAG)?;
        let header = ModelHeader::open(reader)?;
        let spec: ModelSpec = reader.text("tree descriptor")?.parse()?;
        if spec.tag() != TAG {
            return Err(spec.invalid(format!("descriptor inside a {TAG} section")));
        }
        let bytes = reader.blob()?;
        let state: TreeState =
            bincode::deserialize(&bytes).map_err(|source| ModelError::DeserializeBlob { source })?;
        if !state.check() || state.n_features != header.n_features() {
            return Err(ModelError::DeserializeBlob {
                source: Box::new(bincode::ErrorKind::Custom(
                    "embedded tree does not match its header".to_string(),
                )),
            });
        }
        let config = TreeConfig::from_spec(&spec)?;

        self.config = config;
        self.header = header;
        self.state = Some(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps() -> DataSet {
        let rows: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels: Vec<usize> = (0..12).map(|i| usize::from(i >= 6)).collect();
        DataSet::from_rows(&rows, &labels).unwrap()
    }

    #[test]
    fn gini_and_entropy_of_balanced_node() {
        assert!((SplitCriterion::Gini.impurity(&[5.0, 5.0], 10.0) - 0.5).abs() < 1e-12);
        assert!((SplitCriterion::Entropy.impurity(&[5.0, 5.0], 10.0) - 2.0f64.ln()).abs() < 1e-12);
        assert_eq!(SplitCriterion::Gini.impurity(&[4.0, 0.0], 4.0), 0.0);
    }

    #[test]
    fn separable_data_needs_one_split() {
        let mut tree = DecisionTreeClassifier::default();
        tree.train(&steps(), None).unwrap();
        assert_eq!(tree.depth(), Some(1));
        assert_eq!(tree.n_nodes(), Some(3));
        assert_eq!(tree.predict(&[2.0, 0.0]).unwrap(), 0);
        assert_eq!(tree.predict(&[9.0, 1.0]).unwrap(), 1);
        assert_eq!(tree.classify(&[9.0, 1.0]).unwrap().confidence(), 1.0);
    }

    #[test]
    fn mask_restricts_training() {
        let mut tree = DecisionTreeClassifier::default();
        let mask = SampleMask::from_indices(12, &[0, 1, 2, 3]);
        tree.train(&steps(), Some(&mask)).unwrap();
        assert_eq!(tree.n_nodes(), Some(1));
        assert_eq!(tree.predict(&[11.0, 2.0]).unwrap(), 0);
    }

    #[test]
    fn depth_zero_is_rejected() {
        let mut tree = DecisionTreeClassifier::new(TreeConfig::new().with_max_depth(Some(0)));
        let err = tree.train(&steps(), None).unwrap_err();
        assert!(matches!(err, ModelError::InvalidSpec { .. }));
    }

    #[test]
    fn spec_round_trip() {
        let spec: ModelSpec = "DecisionTreeClassifier criterion=entropy depth=3 seed=7"
            .parse()
            .unwrap();
        let tree = DecisionTreeClassifier::from_spec(&spec).unwrap();
        assert_eq!(tree.spec(), spec);
        assert!(DecisionTreeClassifier::from_spec(&"DecisionTreeClassifier criterion=chaos".parse().unwrap()).is_err());
    }

    #[test]
    fn blob_round_trip_keeps_predictions() {
        let mut tree = DecisionTreeClassifier::new(TreeConfig::new().with_criterion(SplitCriterion::Entropy));
        tree.train(&steps(), None).unwrap();
        let mut buf = Vec::new();
        tree.save(&mut ModelWriter::new(&mut buf)).unwrap();
        let mut back = DecisionTreeClassifier::default();
        let mut src = buf.as_slice();
        back.open(&mut ModelReader::new(&mut src)).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn corrupted_blob_is_rejected() {
        let mut tree = DecisionTreeClassifier::default();
        tree.train(&steps(), None).unwrap();
        let mut buf = Vec::new();
        tree.save(&mut ModelWriter::new(&mut buf)).unwrap();
        let text = String::from_utf8_lossy(&buf).into_owned();
        let cut = text.find("blob ").unwrap();
        let corrupted = format!("{}blob 3\nabc\n", &text[..cut]);
        let mut back = DecisionTreeClassifier::default();
        let mut src = corrupted.as_bytes();
        let err = back.open(&mut ModelReader::new(&mut src)).unwrap_err();
        assert!(matches!(err, ModelError::DeserializeBlob { .. }));
        assert!(!back.is_trained());
    }
}
