//! End-to-end selection on a seeded synthetic dataset.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tessera_data::{Binning, DataSet, Discretizer, DiscretizedDataSet, FeatureVector};
use tessera_select::{CorrelationFeatureSelector, SelectError};

/// Class 1 when `signal > 0.5`; `echo` is a noisy copy of `signal`; `noise` is independent.
fn synthetic(n: usize, seed: u64) -> DataSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let names = vec!["noise".to_string(), "signal".to_string(), "echo".to_string()];
    let mut data = DataSet::new(vec!["lo".to_string(), "hi".to_string()], names).unwrap();
    for _ in 0..n {
        let signal: f64 = rng.r#gen();
        let echo = signal + rng.gen_range(-0.05..0.05);
        let noise: f64 = rng.r#gen();
        let class = usize::from(signal > 0.5);
        data.push(FeatureVector::new(vec![noise, signal, echo], class))
            .unwrap();
    }
    data
}

fn discretize(data: &DataSet) -> DiscretizedDataSet {
    let mut d = Discretizer::new(Binning::EqualFrequency, 4).unwrap();
    d.fit(data).unwrap();
    DiscretizedDataSet::from_dataset(data, &d).unwrap()
}

#[test]
fn selects_signal_and_skips_noise() {
    let data = synthetic(400, 7);
    let selection = CorrelationFeatureSelector::new()
        .select(&discretize(&data))
        .unwrap();

    let names = selection.names();
    assert!(!names.contains(&"noise".to_string()), "selected {names:?}");
    assert!(
        names.contains(&"signal".to_string()) || names.contains(&"echo".to_string()),
        "selected {names:?}"
    );
    assert!(selection.trace().windows(2).all(|w| w[1] >= w[0]));
    assert!(selection.merit() > 0.0);

    let projected = selection.apply(&data).unwrap();
    assert_eq!(projected.feature_names(), names.as_slice());
}

#[test]
fn constant_dataset_has_no_signal() {
    let mut data = DataSet::new(
        vec!["a".to_string(), "b".to_string()],
        vec!["x".to_string(), "y".to_string()],
    )
    .unwrap();
    for i in 0..20 {
        data.push(FeatureVector::new(vec![1.0, 2.0], i % 2)).unwrap();
    }
    let err = CorrelationFeatureSelector::new()
        .select(&discretize(&data))
        .unwrap_err();
    assert!(matches!(err, SelectError::NoSignal { n_features: 2 }));
}
