//! Criterion benchmarks for tessera-model: naive Bayes and bagging training and prediction.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use tessera_data::DataSet;
use tessera_model::{Classifier, ModelRegistry, ModelSpec, predict_all, write_model};

fn make_classification(n_samples: usize, n_features: usize, n_classes: usize, seed: u64) -> DataSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes;
        labels.push(class);
        let row: Vec<f64> = (0..n_features)
            .map(|f| {
                let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 0.5
            })
            .collect();
        rows.push(row);
    }
    DataSet::from_rows(&rows, &labels).unwrap()
}

fn build(spec: &str) -> Box<dyn Classifier> {
    ModelRegistry::global()
        .build(&spec.parse::<ModelSpec>().unwrap())
        .unwrap()
}

fn bench_nb_train(c: &mut Criterion) {
    let data = make_classification(2000, 20, 5, 42);
    let mut model = build("DiscreteNaiveBayesClassifier ewd 10");

    c.bench_function("nb_train_2000x20_5class_ewd10", |b| {
        b.iter(|| model.train(&data, None).unwrap());
    });
}

fn bench_nb_predict(c: &mut Criterion) {
    let data = make_classification(2000, 20, 5, 42);
    let mut model = build("DiscreteNaiveBayesClassifier efd 10");
    model.train(&data, None).unwrap();

    c.bench_function("nb_predict_batch_2000x20", |b| {
        b.iter(|| predict_all(model.as_ref(), &data).unwrap());
    });
}

fn bench_bagging_train(c: &mut Criterion) {
    let data = make_classification(2000, 20, 5, 42);
    let mut model = build("BaggedClassifier 0.3 25 DiscreteNaiveBayesClassifier ewd 10");

    c.bench_function("bagging_train_2000x20_25members", |b| {
        b.iter(|| model.train(&data, None).unwrap());
    });
}

fn bench_bagging_save(c: &mut Criterion) {
    let data = make_classification(500, 20, 5, 42);
    let mut model = build("BaggedClassifier 0.5 25 DecisionTreeClassifier depth=6");
    model.train(&data, None).unwrap();

    c.bench_function("bagged_trees_write_25members", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            write_model(model.as_ref(), &mut buf).unwrap();
            buf
        });
    });
}

criterion_group!(
    benches,
    bench_nb_train,
    bench_nb_predict,
    bench_bagging_train,
    bench_bagging_save
);
criterion_main!(benches);
