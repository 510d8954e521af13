//! End-to-end data preparation: CSV input, discretization and PCA.

use std::io::Write;

use tessera_data::{
    Binning, DataError, DataSetReader, Discretize, Discretizer, DiscretizedDataSet,
    ModelReader, ModelWriter, PrincipalComponents,
};

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const WEATHER: &str = "\
temp,humidity,w,class
30.0,0.20,1.0,sunny
28.5,0.25,2.0,sunny
12.0,0.90,1.0,rain
10.5,0.85,0.5,rain
20.0,0.55,1.0,cloudy
21.0,0.60,1.0,cloudy
";

#[test]
fn csv_to_codes() {
    let file = write_csv(WEATHER);
    let data = DataSetReader::new(file.path())
        .with_weight_column(Some("w".to_string()))
        .read()
        .unwrap();

    assert_eq!(data.len(), 6);
    assert_eq!(data.feature_names(), ["temp", "humidity"]);
    assert_eq!(data.class_names(), ["sunny", "rain", "cloudy"]);
    assert_eq!(data.samples()[1].weight(), Some(2.0));
    assert_eq!(data.labels(), vec![0, 0, 1, 1, 2, 2]);

    let mut disc = Discretizer::new(Binning::EqualWidth, 3).unwrap();
    disc.fit(&data).unwrap();
    let coded = DiscretizedDataSet::from_dataset(&data, &disc).unwrap();

    assert_eq!(coded.layout().ranges(), [2, 2]);
    // Coldest and hottest rows fall in the outer bins.
    assert_eq!(coded.samples()[3].codes()[0], Some(0));
    assert_eq!(coded.samples()[0].codes()[0], Some(2));
    assert_eq!(coded.samples()[1].effective_weight(), 2.0);
}

#[test]
fn fixed_class_table_rejects_strangers() {
    let file = write_csv(WEATHER);
    let err = DataSetReader::new(file.path())
        .with_weight_column(Some("w".to_string()))
        .with_class_names(vec!["sunny".into(), "rain".into()])
        .read()
        .unwrap_err();
    assert!(matches!(err, DataError::UnknownClassLabel { .. }));
}

#[test]
fn pca_then_discretize_survives_persistence() {
    // Two strongly correlated features: one component carries almost all variance.
    let mut csv = String::from("a,b,class\n");
    for i in 0..40 {
        let t = f64::from(i) / 4.0;
        let wobble = if i % 2 == 0 { 0.05 } else { -0.05 };
        csv.push_str(&format!("{},{},{}\n", t, 2.0 * t + wobble, usize::from(i >= 20)));
    }
    let file = write_csv(&csv);
    let data = DataSetReader::new(file.path()).read().unwrap();

    let pca = PrincipalComponents::fit(&data, 1, None).unwrap();
    let ev = pca.eigenvalues();
    assert!(ev[0] > 0.0);
    let projected = pca.transform_dataset(&data).unwrap();
    assert_eq!(projected.feature_names(), ["pc0"]);
    assert_eq!(projected.preprocessing().last().map(String::as_str), Some("pca 1"));

    let mut disc = Discretizer::new(Binning::EqualFrequency, 4).unwrap();
    disc.fit(&projected).unwrap();

    let mut buf = Vec::new();
    {
        let mut writer = ModelWriter::new(&mut buf);
        pca.save(&mut writer).unwrap();
        disc.save(&mut writer).unwrap();
        writer.flush().unwrap();
    }
    let mut src = buf.as_slice();
    let mut reader = ModelReader::new(&mut src);
    let pca_back = PrincipalComponents::open(&mut reader).unwrap();
    let disc_back = Discretizer::open(&mut reader).unwrap();
    reader.expect_end().unwrap();

    for s in data.samples() {
        let a = disc.discretize(&pca.transform(s.values()).unwrap()).unwrap();
        let b = disc_back
            .discretize(&pca_back.transform(s.values()).unwrap())
            .unwrap();
        assert_eq!(a, b);
    }
}
