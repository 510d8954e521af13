use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use tessera_data::{Binning, DataSet, DataSetReader, Discretizer, DiscretizedDataSet};
use tessera_model::{
    Classifier, EnsembleMember, Evaluation, HeterogeneousEnsemble, Metric, ModelRegistry,
    ModelSpec, Validator, evaluate, load_model, save_model,
};
use tessera_select::CorrelationFeatureSelector;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Discretized Bayesian classifiers, resampling ensembles and feature selection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for resampling ensembles and trees that do not set one
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Where and how to read a labelled CSV dataset.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Path to the input CSV file
    #[arg(long)]
    data: PathBuf,

    /// Name of the class label column
    #[arg(long, default_value = "class")]
    label_column: String,

    /// Name of an optional sample weight column
    #[arg(long)]
    weight_column: Option<String>,
}

impl DataArgs {
    fn reader(&self) -> DataSetReader {
        DataSetReader::new(&self.data)
            .with_label_column(self.label_column.clone())
            .with_weight_column(self.weight_column.clone())
    }

    fn read(&self) -> Result<DataSet> {
        self.reader()
            .read()
            .with_context(|| format!("failed to read {}", self.data.display()))
    }

    /// Read with the class table of a trained model so label indices line up.
    fn read_for(&self, model: &dyn Classifier) -> Result<DataSet> {
        let data = self
            .reader()
            .with_class_names(model.header().class_names().to_vec())
            .read()
            .with_context(|| format!("failed to read {}", self.data.display()))?;
        if data.feature_names() != model.header().feature_names() {
            warn!(
                data = ?data.feature_names(),
                model = ?model.header().feature_names(),
                "feature names differ from the trained model"
            );
        }
        Ok(data)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Train a classifier described by a model descriptor and save it
    Train {
        #[command(flatten)]
        data: DataArgs,

        /// Model descriptor, e.g. "BaggedClassifier 0.5 10 DiscreteNaiveBayesClassifier ewd 10"
        #[arg(long)]
        spec: String,

        /// Output path for the model file
        #[arg(long)]
        model: PathBuf,
    },

    /// Classify every row of a dataset with a saved model
    Classify {
        /// Path to the model file
        #[arg(long)]
        model: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        /// Number of top-k classes to output per row
        #[arg(long, default_value_t = 3)]
        top_k: usize,
    },

    /// Score a saved model on a labelled dataset
    Evaluate {
        /// Path to the model file
        #[arg(long)]
        model: PathBuf,

        #[command(flatten)]
        data: DataArgs,

        /// Metric: acc, precision, recall, specificity, balacc, f1, ppv, npv, fpr or fdr
        #[arg(long, default_value = "acc")]
        metric: Metric,

        /// Class index treated as positive by one-vs-rest metrics
        #[arg(long, default_value_t = 1)]
        positive_class: usize,
    },

    /// Select a feature subset by correlation merit
    Select {
        #[command(flatten)]
        data: DataArgs,

        /// Discretization used to measure correlations: ewd, efd, kmd or ebd
        #[arg(long, default_value = "ewd")]
        binning: Binning,

        /// Number of bins per feature
        #[arg(long, default_value_t = 10)]
        bins: usize,

        /// Feature value treated as unknown
        #[arg(long, allow_hyphen_values = true)]
        unknown: Option<f64>,
    },

    /// Train a heterogeneous ensemble whose members see named feature subsets
    Ensemble {
        #[command(flatten)]
        data: DataArgs,

        /// Member as "feat1,feat2:Descriptor args", repeatable
        #[arg(long = "member", required = true)]
        members: Vec<String>,

        /// Output path for the model file
        #[arg(long)]
        model: PathBuf,

        /// Metric reported on the training data
        #[arg(long, default_value = "acc")]
        metric: Metric,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    tag: &'static str,
    spec: String,
    model: PathBuf,
    n_samples: usize,
    n_features: usize,
    n_classes: usize,
    training_accuracy: f64,
}

#[derive(Serialize)]
struct ClassifyOutput {
    tag: &'static str,
    n_samples: usize,
    predictions: Vec<PredictionOutput>,
}

#[derive(Serialize)]
struct PredictionOutput {
    row: usize,
    predicted: String,
    confidence: f64,
    top_k: Vec<(String, f64)>,
}

#[derive(Serialize)]
struct EvaluateOutput {
    tag: &'static str,
    spec: String,
    n_samples: usize,
    metric: String,
    score: f64,
    accuracy: f64,
    confusion_matrix: Vec<Vec<usize>>,
    class_names: Vec<String>,
}

#[derive(Serialize)]
struct SelectOutput {
    n_features: usize,
    selected: Vec<String>,
    indices: Vec<usize>,
    merit: f64,
    merit_trace: Vec<f64>,
}

#[derive(Serialize)]
struct EnsembleOutput {
    model: PathBuf,
    n_samples: usize,
    members: Vec<MemberOutput>,
    metric: String,
    score: f64,
}

#[derive(Serialize)]
struct MemberOutput {
    features: Vec<String>,
    spec: String,
}

/// Add `seed=<seed>` to resampling and tree descriptors that do not set one.
fn seeded(spec: ModelSpec, seed: u64) -> ModelSpec {
    let args = spec.args();
    let has_seed = |a: &String| a.starts_with("seed=");
    let insert_at = match spec.tag() {
        "BaggedClassifier" | "AdaBoostClassifier" if args.len() >= 2 => {
            (!args.get(2).is_some_and(has_seed)).then_some(2)
        }
        "DecisionTreeClassifier" => (!args.iter().any(has_seed)).then_some(args.len()),
        _ => None,
    };
    match insert_at {
        Some(i) => {
            let mut args = args.to_vec();
            args.insert(i, format!("seed={seed}"));
            ModelSpec::new(spec.tag(), args)
        }
        None => spec,
    }
}

fn build(spec: &str, seed: u64) -> Result<Box<dyn Classifier>> {
    let spec: ModelSpec = spec.parse().context("invalid model descriptor")?;
    ModelRegistry::global()
        .build(&seeded(spec, seed))
        .context("failed to build model")
}

/// Parse `feat1,feat2:Descriptor args` into a member feature list and descriptor.
fn parse_member(raw: &str) -> Result<(Vec<String>, &str)> {
    let (features, spec) = raw
        .split_once(':')
        .with_context(|| format!("member {raw:?} must look like \"a,b:Descriptor\""))?;
    let features: Vec<String> = features
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    anyhow::ensure!(!features.is_empty(), "member {raw:?} lists no features");
    Ok((features, spec.trim()))
}

fn load(path: &Path) -> Result<Box<dyn Classifier>> {
    let model = load_model(path).with_context(|| format!("failed to load {}", path.display()))?;
    info!(tag = model.tag(), spec = %model.spec(), "model loaded");
    Ok(model)
}

fn print_json<T: Serialize>(output: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train { data, spec, model } => {
            let dataset = data.read()?;
            let mut classifier = build(&spec, cli.seed)?;
            classifier
                .train(&dataset, None)
                .context("training failed")?;
            let fit = evaluate(classifier.as_ref(), &dataset, &Validator::new(Metric::Accuracy))
                .context("scoring on the training data failed")?;
            save_model(classifier.as_ref(), &model).context("failed to save model")?;

            print_json(&TrainOutput {
                tag: classifier.tag(),
                spec: classifier.spec().to_string(),
                model,
                n_samples: dataset.len(),
                n_features: dataset.n_features(),
                n_classes: dataset.n_classes(),
                training_accuracy: fit.score,
            })?;
        }

        Command::Classify { model, data, top_k } => {
            let classifier = load(&model)?;
            let dataset = data.read_for(classifier.as_ref())?;
            let class_names = classifier.header().class_names();

            let distributions = dataset
                .samples()
                .par_iter()
                .map(|s| classifier.classify(s.values()))
                .collect::<Result<Vec<_>, _>>()
                .context("classification failed")?;

            let predictions = distributions
                .iter()
                .enumerate()
                .map(|(row, d)| PredictionOutput {
                    row,
                    predicted: class_names[d.predicted_class()].clone(),
                    confidence: d.confidence(),
                    top_k: d
                        .top_k(top_k)
                        .into_iter()
                        .map(|(c, p)| (class_names[c].clone(), p))
                        .collect(),
                })
                .collect();

            print_json(&ClassifyOutput {
                tag: classifier.tag(),
                n_samples: dataset.len(),
                predictions,
            })?;
        }

        Command::Evaluate {
            model,
            data,
            metric,
            positive_class,
        } => {
            let classifier = load(&model)?;
            let dataset = data.read_for(classifier.as_ref())?;
            let validator = Validator::new(metric).with_positive_class(positive_class);
            let Evaluation {
                metric,
                score,
                confusion,
            } = evaluate(classifier.as_ref(), &dataset, &validator).context("evaluation failed")?;

            print_json(&EvaluateOutput {
                tag: classifier.tag(),
                spec: classifier.spec().to_string(),
                n_samples: dataset.len(),
                metric: metric.to_string(),
                score,
                accuracy: confusion.accuracy(),
                confusion_matrix: confusion.as_rows().to_vec(),
                class_names: classifier.header().class_names().to_vec(),
            })?;
        }

        Command::Select {
            data,
            binning,
            bins,
            unknown,
        } => {
            let dataset = data.read()?;
            let mut discretizer = Discretizer::new(binning, bins)?.with_unknown(unknown);
            discretizer.fit(&dataset).context("discretization failed")?;
            let coded = DiscretizedDataSet::from_dataset(&dataset, &discretizer)?;
            let selection = CorrelationFeatureSelector::new()
                .select(&coded)
                .context("feature selection failed")?;

            print_json(&SelectOutput {
                n_features: dataset.n_features(),
                selected: selection.names(),
                indices: selection.indices(),
                merit: selection.merit(),
                merit_trace: selection.trace().to_vec(),
            })?;
        }

        Command::Ensemble {
            data,
            members,
            model,
            metric,
        } => {
            let dataset = data.read()?;
            let mut described = Vec::with_capacity(members.len());
            let mut built = Vec::with_capacity(members.len());
            for raw in &members {
                let (features, spec) = parse_member(raw)?;
                let classifier = build(spec, cli.seed)?;
                described.push(MemberOutput {
                    features: features.clone(),
                    spec: classifier.spec().to_string(),
                });
                built.push(EnsembleMember::new(features, classifier));
            }

            let mut ensemble = HeterogeneousEnsemble::new(
                dataset.feature_names().to_vec(),
                dataset.class_names().to_vec(),
                built,
            )
            .context("invalid ensemble members")?;
            ensemble
                .train(&dataset, None)
                .context("ensemble training failed")?;
            let evaluation = ensemble
                .evaluate(&dataset, &Validator::new(metric))
                .context("ensemble evaluation failed")?;
            save_model(&ensemble, &model).context("failed to save model")?;

            print_json(&EnsembleOutput {
                model,
                n_samples: dataset.len(),
                members: described,
                metric: evaluation.metric.to_string(),
                score: evaluation.score,
            })?;
        }
    }

    Ok(())
}
