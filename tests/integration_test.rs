// Integration tests for xbag
use tempfile::TempDir;
use xbag::prelude::*;
use xbag::table::{parse_frames, TableFormat};
use xbag_core::{AssignmentConfig, PosteriorMode};

fn two_instances() -> Vec<Frame> {
    [("one", 1.0), ("one", 2.0), ("one", 3.0), ("two", 10.0), ("two", 11.0), ("two", 12.0)]
        .iter()
        .map(|&(name, x)| Frame::numeric(name, &[x]))
        .collect()
}

fn config(size: usize, method: GenerationMethod) -> PipelineConfig {
    PipelineConfig {
        numeric: NumericCodebookConfig::new(size, method),
        ..Default::default()
    }
}

fn assert_rows_close(a: &[Vec<f32>], b: &[Vec<f32>]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_eq!(x.len(), y.len());
        for (u, v) in x.iter().zip(y) {
            assert!((u - v).abs() < 1e-4, "{} != {}", u, v);
        }
    }
}

#[test]
fn test_two_instance_bags() {
    let pipeline = BagPipeline::new(
        config(2, GenerationMethod::KMeansPlusPlus),
        FeatureLayout::numeric(1),
    )
    .unwrap();
    let (codebook, output) = pipeline.fit(&two_instances()).unwrap();

    let book = codebook.codebooks[0].as_numeric().unwrap();
    let mut centers: Vec<f32> = book.codewords().iter().map(|c| c.as_slice()[0]).collect();
    centers.sort_by(f32::total_cmp);
    assert!((centers[0] - 2.0).abs() < 1e-4);
    assert!((centers[1] - 11.0).abs() < 1e-4);

    // each instance puts all three frames on one codeword, and not the same one
    for row in &output.bag {
        let mut sorted = row.clone();
        sorted.sort_by(f32::total_cmp);
        assert_eq!(sorted, vec![0.0, 3.0]);
    }
    assert_ne!(output.bag[0], output.bag[1]);
    assert_eq!(output.instances[0].num_frames, 3);
}

#[test]
fn test_idf_zeroes_ubiquitous_codeword() {
    let mut frames: Vec<Frame> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| Frame::numeric(*name, &[0.0]))
        .collect();
    frames.insert(1, Frame::numeric("a", &[10.0]));

    let config = PipelineConfig {
        idf_weighting: true,
        ..config(2, GenerationMethod::KMeansPlusPlus)
    };
    let pipeline = BagPipeline::new(config, FeatureLayout::numeric(1)).unwrap();
    let (codebook, output) = pipeline.fit(&frames).unwrap();

    let book = codebook.codebooks[0].as_numeric().unwrap();
    let zero = if book.codewords()[0].as_slice()[0] < 5.0 { 0 } else { 1 };
    let dff = codebook.weighting.document_frequency.as_ref().unwrap();
    assert!(dff[zero].abs() < 1e-6);
    assert!((dff[1 - zero] - 4f32.log10()).abs() < 1e-4);

    assert!(output.bag[0][zero].abs() < 1e-6);
    assert!((output.bag[0][1 - zero] - 4f32.log10()).abs() < 1e-4);
}

#[test]
fn test_windowed_instances() {
    let frames: Vec<Frame> = (0..10)
        .map(|i| Frame::numeric("clip", &[(i % 3) as f32]).with_time(i as f32 * 0.1))
        .collect();
    let config = PipelineConfig {
        windowing: Some(Windowing::new(0.4, 0.2)),
        ..config(3, GenerationMethod::KMeansPlusPlus)
    };
    let pipeline = BagPipeline::new(config, FeatureLayout::numeric(1)).unwrap();
    let (_, output) = pipeline.fit(&frames).unwrap();

    let centers: Vec<f32> = output.instances.iter().map(|i| i.center.unwrap()).collect();
    assert_eq!(centers.len(), 5);
    assert!((centers[4] - 0.8).abs() < 1e-6);

    // window edges are inclusive
    assert_eq!(output.instances[0].num_frames, 3);
    assert_eq!(output.instances[2].num_frames, 5);
    for (instance, row) in output.instances.iter().zip(&output.bag) {
        assert_eq!(row.iter().sum::<f32>(), instance.num_frames as f32);
    }
}

#[test]
fn test_empty_window_is_smoothed() {
    let frames: Vec<Frame> = [0.0, 0.1, 0.2, 1.0, 1.1]
        .iter()
        .enumerate()
        .map(|(i, &t)| Frame::numeric("clip", &[i as f32]).with_time(t))
        .collect();
    let config = PipelineConfig {
        windowing: Some(Windowing::new(0.2, 0.5)),
        ..config(2, GenerationMethod::KMeansPlusPlus)
    };
    let pipeline = BagPipeline::new(config, FeatureLayout::numeric(1)).unwrap();
    let (_, output) = pipeline.fit(&frames).unwrap();

    assert_eq!(output.instances.len(), 3);
    assert_eq!(output.instances[1].num_frames, 0);
    assert!(output.bag[1].iter().all(|&v| v == 0.001));
    assert!(output.bag[0].iter().all(|&v| v != 0.001));
}

#[test]
fn test_fit_is_deterministic() {
    for method in [
        GenerationMethod::Random,
        GenerationMethod::RandomPlusPlus,
        GenerationMethod::KMeans,
        GenerationMethod::KMeansPlusPlus,
    ] {
        let pipeline = BagPipeline::new(config(3, method), FeatureLayout::numeric(1)).unwrap();
        let (first, _) = pipeline.fit(&two_instances()).unwrap();
        let (second, _) = pipeline.fit(&two_instances()).unwrap();
        assert_eq!(first, second, "{}", method);
    }
}

#[test]
fn test_insufficient_training_data() {
    let pipeline = BagPipeline::new(
        config(10, GenerationMethod::Random),
        FeatureLayout::numeric(1),
    )
    .unwrap();
    assert!(matches!(
        pipeline.fit(&two_instances()),
        Err(Error::InsufficientData { requested: 10, .. })
    ));
}

#[test]
fn test_gmm_posterior_mass() {
    let numeric = NumericCodebookConfig::new(2, GenerationMethod::EmKMeansPlusPlus).with_assignment(
        AssignmentConfig {
            posterior: Some(PosteriorMode::Prior),
            ..Default::default()
        },
    );
    let config = PipelineConfig {
        numeric,
        ..Default::default()
    };
    let pipeline = BagPipeline::new(config, FeatureLayout::numeric(1)).unwrap();
    let (codebook, output) = pipeline.fit(&two_instances()).unwrap();

    // every frame spreads a posterior summing to one
    for row in &output.bag {
        assert!((row.iter().sum::<f32>() - 3.0).abs() < 1e-3);
    }
    let reloaded = xbag::storage::decode(&xbag::storage::encode(&codebook).unwrap()).unwrap();
    assert_rows_close(&pipeline.encode(&reloaded, &two_instances()).unwrap().bag, &output.bag);
}

#[test]
fn test_saved_codebook_reproduces_encoding() {
    let text = "\
a;0.5;0.1;the cat sat
a;0.7;0.2;the cat
a;0.6;0.4;a dog
b;5.0;3.0;the dog barked
b;5.5;3.5;dog
c;9.0;9.0;cat
";
    let (frames, layout) = parse_frames(text, &TableFormat::default()).unwrap();
    assert_eq!(layout, FeatureLayout::new(vec![1, 1, 0]));

    let config = PipelineConfig {
        standardize_input: true,
        log_weighting: true,
        idf_weighting: true,
        normalization: Some(BagNormalization::UnitLength),
        normalize_output: true,
        ..config(3, GenerationMethod::KMeansPlusPlus)
    };
    let pipeline = BagPipeline::new(config, layout).unwrap();
    let (codebook, fitted) = pipeline.fit(&frames).unwrap();

    let dir = TempDir::new().unwrap();
    let store = CodebookStore::new(dir.path().join("codebook.txt"));
    store.save(&codebook).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded.bag_width(), codebook.bag_width());
    assert_eq!(
        loaded.weighting.document_frequency,
        codebook.weighting.document_frequency
    );
    let encoded = pipeline.encode(&loaded, &frames).unwrap();
    assert_rows_close(&encoded.bag, &fitted.bag);
    assert_eq!(encoded.instances, fitted.instances);
}

#[test]
fn test_unknown_method_name() {
    assert!(matches!(
        "kmedians".parse::<GenerationMethod>(),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "numeric": { "size": 4, "method": "kmeans++", "random_seed": 7 },
        "idf_weighting": true,
        "windowing": { "size": 1.0, "hop": 0.5 }
    }"#;
    let config: PipelineConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.numeric.size, 4);
    assert_eq!(config.numeric.method, GenerationMethod::KMeansPlusPlus);
    assert!(config.idf_weighting);
    assert!(config.validate().is_ok());
}
