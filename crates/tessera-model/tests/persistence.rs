//! Model files: round trips through nested ensembles and rejection of bad streams.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tessera_data::{DataSet, FeatureVector};
use tessera_model::{
    Classifier, EnsembleMember, ErrorKind, HeterogeneousEnsemble, ModelError, ModelRegistry,
    ModelSpec, load_model, read_model, save_model, write_model,
};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Three features with an unknown sentinel sprinkled into `b`.
fn dataset(n: usize, seed: u64) -> DataSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = DataSet::new(names(&["neg", "pos"]), names(&["a", "b", "c"])).unwrap();
    for _ in 0..n {
        let a: f64 = rng.r#gen();
        let class = usize::from(a > 0.4);
        let b = if rng.gen_bool(0.1) {
            -1.0
        } else {
            class as f64 + rng.gen_range(-0.8..0.8)
        };
        let c = rng.gen_range(0.0..10.0);
        data.push(FeatureVector::new(vec![a, b, c], class)).unwrap();
    }
    data
}

fn trained(spec: &str, data: &DataSet) -> Box<dyn Classifier> {
    let mut model = ModelRegistry::global()
        .build(&spec.parse::<ModelSpec>().unwrap())
        .unwrap();
    model.train(data, None).unwrap();
    model
}

fn reload(model: &dyn Classifier) -> Box<dyn Classifier> {
    let mut buf = Vec::new();
    write_model(model, &mut buf).unwrap();
    read_model(&mut buf.as_slice()).unwrap()
}

fn assert_same_predictions(a: &dyn Classifier, b: &dyn Classifier, data: &DataSet) {
    for sample in data.samples() {
        assert_eq!(
            a.classify(sample.values()).unwrap(),
            b.classify(sample.values()).unwrap(),
            "diverged on {:?}",
            sample.values()
        );
    }
}

#[test]
fn every_kind_round_trips_bit_exactly() {
    let data = dataset(200, 1);
    for spec in [
        "DiscreteNaiveBayesClassifier ewd 8 unknown=-1",
        "DiscreteNaiveBayesClassifier efd 6 smoothing=0.5 pca=2",
        "ContinuousNaiveBayesClassifier unknown=-1",
        "ContinuousNaiveBayesClassifier pca=2",
        "DecisionTreeClassifier depth=4 criterion=entropy",
        "BaggedClassifier 0.4 5 DiscreteNaiveBayesClassifier kmd 5",
        "AdaBoostClassifier 0.5 3 seed=8 DecisionTreeClassifier min_leaf=3",
        "BaggedClassifier 0.8 2 BaggedClassifier 0.5 3 ContinuousNaiveBayesClassifier",
    ] {
        let model = trained(spec, &data);
        let back = reload(model.as_ref());
        assert_eq!(back.tag(), model.tag(), "{spec}");
        assert_eq!(back.spec(), model.spec(), "{spec}");
        assert_eq!(back.header(), model.header(), "{spec}");
        assert_same_predictions(model.as_ref(), back.as_ref(), &data);
    }
}

#[test]
fn heterogeneous_ensemble_of_ensembles_round_trips_through_a_file() {
    let data = dataset(240, 2);
    let project = |features: &[&str]| {
        data.project(&data.membership_mask(&names(features)).unwrap())
            .unwrap()
    };
    let members = vec![
        EnsembleMember::from_trained(trained(
            "DecisionTreeClassifier depth=3",
            &project(&["a", "c"]),
        )),
        EnsembleMember::from_trained(trained(
            "BaggedClassifier 0.5 3 DecisionTreeClassifier",
            &project(&["a", "b"]),
        )),
        EnsembleMember::from_trained(trained(
            "DiscreteNaiveBayesClassifier ewd 4 unknown=-1",
            &project(&["b"]),
        )),
    ];
    let ensemble =
        HeterogeneousEnsemble::new(names(&["a", "b", "c"]), names(&["neg", "pos"]), members)
            .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ensemble.model");
    save_model(&ensemble, &path).unwrap();
    let back = load_model(&path).unwrap();

    assert_eq!(back.tag(), "EnsembleClassifier");
    assert_same_predictions(&ensemble, back.as_ref(), &data);
}

#[test]
fn unknown_member_tag_aborts_the_load() {
    let data = dataset(100, 3);
    let model = trained("BaggedClassifier 0.5 2 DiscreteNaiveBayesClassifier ewd 3", &data);
    let mut buf = Vec::new();
    write_model(model.as_ref(), &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    // Rename the second member section; the descriptor line keeps its tag.
    let member_tag = "\nDiscreteNaiveBayesClassifier\n";
    let first = text.find(member_tag).unwrap();
    let second = first + 1 + text[first + 1..].find(member_tag).unwrap();
    let corrupted = format!(
        "{}\nSupportVectorMachine\n{}",
        &text[..second],
        &text[second + member_tag.len()..]
    );

    let err = read_model(&mut corrupted.as_bytes()).unwrap_err();
    assert!(matches!(err, ModelError::UnknownModelTag { ref tag } if tag == "SupportVectorMachine"));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn truncated_stream_is_rejected() {
    let data = dataset(100, 4);
    let model = trained("BaggedClassifier 0.5 3 DecisionTreeClassifier", &data);
    let mut buf = Vec::new();
    write_model(model.as_ref(), &mut buf).unwrap();
    for cut in [buf.len() / 4, buf.len() / 2, buf.len() * 3 / 4] {
        assert!(read_model(&mut &buf[..cut]).is_err(), "cut at {cut} was accepted");
    }
}

#[test]
fn absurd_blob_length_is_an_error() {
    let data = dataset(60, 6);
    let model = trained("DecisionTreeClassifier depth=2", &data);
    let mut buf = Vec::new();
    write_model(model.as_ref(), &mut buf).unwrap();
    let text = String::from_utf8_lossy(&buf).into_owned();
    let start = text.find("\nblob ").unwrap() + 1;
    let header_end = start + text[start..].find('\n').unwrap();
    let mut corrupted = buf[..start].to_vec();
    corrupted.extend_from_slice(format!("blob {}", u64::MAX).as_bytes());
    corrupted.extend_from_slice(&buf[header_end..]);

    let err = read_model(&mut corrupted.as_slice()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn version_mismatch_is_reported() {
    let data = dataset(50, 5);
    let model = trained("ContinuousNaiveBayesClassifier", &data);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.model");
    let mut buf = b"tessera-model 0\n".to_vec();
    let mut body = Vec::new();
    write_model(model.as_ref(), &mut body).unwrap();
    let first_newline = body.iter().position(|&b| b == b'\n').unwrap();
    buf.extend_from_slice(&body[first_newline + 1..]);
    std::fs::write(&path, &buf).unwrap();

    let err = load_model(&path).unwrap_err();
    assert!(matches!(
        err,
        ModelError::IncompatibleModelVersion { expected: 1, ref found } if found.trim() == "tessera-model 0"
    ));
}

#[test]
fn untrained_models_cannot_be_saved() {
    let model = ModelRegistry::global()
        .build(&ModelSpec::bare("DecisionTreeClassifier"))
        .unwrap();
    let mut buf = Vec::new();
    let err = write_model(model.as_ref(), &mut buf).unwrap_err();
    assert!(matches!(err, ModelError::NotTrained { .. }));
}
