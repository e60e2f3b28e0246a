use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use tomato_leaf_nn::config::PipelineConfig;
use tomato_leaf_nn::dataset::Augmentation;
use tomato_leaf_nn::error::{ConversionError, PipelineError};
use tomato_leaf_nn::export::{
    CalibrationDataset, ConversionOptions, Converter, ExportMode, InferenceArtifact, NativeConverter,
};
use tomato_leaf_nn::inference::{read_labels, Classifier, Detection, InferenceModel};
use tomato_leaf_nn::network::{BackboneSpec, HeadSpec, Network};
use tomato_leaf_nn::ActivationFunction;

const CLASSES: [&str; 2] = ["Tomato___Spider_mites", "Tomato___healthy"];
const SIZE: u32 = 8;

/// Writes `per_class` solid-ish PNGs per class: reddish mites, greenish healthy.
fn write_partition(root: &Path, per_class: usize, offset: u8) {
    for (class, name) in CLASSES.iter().enumerate() {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let jitter = offset.wrapping_add(i as u8 * 7) % 40;
            let color = if class == 0 { Rgb([200 + jitter / 2, 40 + jitter, 30]) } else { Rgb([40 + jitter, 190 + jitter / 2, 50]) };
            let mut img = RgbImage::from_pixel(SIZE, SIZE, color);
            img.put_pixel((i as u32) % SIZE, 0, Rgb([255, 255, 255]));
            img.save(dir.join(format!("leaf_{:03}.png", i))).unwrap();
        }
    }
}

fn pipeline(dir: &TempDir) -> PipelineConfig {
    let root = dir.path();
    write_partition(&root.join("train_set"), 12, 0);
    write_partition(&root.join("test_set"), 5, 3);

    let mut config = PipelineConfig::default();
    config.paths.train_dir = root.join("train_set");
    config.paths.test_dir = root.join("test_set");
    config.paths.checkpoint = root.join("models/best_model.json");
    config.paths.model = root.join("models/final_model.json");
    config.paths.history = root.join("models/training_history.json");
    config.paths.reports_dir = root.join("reports");
    config.paths.export = root.join("models/model.tlnn");
    config.paths.labels = root.join("models/labels.txt");
    config.paths.detections = root.join("models/detections.jsonl");
    config.image.size = SIZE;
    config.image.augmentation = Augmentation::disabled();
    config.model.backbone = BackboneSpec { widths: vec![16], activation: ActivationFunction::ReLU6 };
    config.model.head = HeadSpec { hidden_units: 8, dropout: 0.0 };
    config.train.epochs = 4;
    config.train.batch_size = 4;
    config.train.learning_rate = 0.01;
    config.train.lr_patience = 1;
    config.train.early_stop_patience = 2;
    config.export.calibration_samples = 16;
    config
}

fn trained(dir: &TempDir) -> PipelineConfig {
    let config = pipeline(dir);
    config.trainer().run().unwrap();
    config
}

#[test]
fn train_writes_checkpoint_model_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = pipeline(&dir);
    let outcome = config.trainer().run().unwrap();

    assert!(!outcome.history.is_empty() && outcome.history.len() <= 4);
    assert!(config.paths.checkpoint.exists());
    assert!(config.paths.history.exists());

    let saved = Network::load_json(&config.paths.model).unwrap();
    assert_eq!(saved.metadata.output_labels.as_deref(), Some(&CLASSES.map(String::from)[..]));
    assert_eq!(saved.metadata.image_size(), Some(SIZE));
    // Frozen mode: backbone untouched, head trainable.
    assert_eq!(saved.trainable_mask(), vec![false, true, true]);
    // Balanced data: every class weight is 1.
    assert!(outcome.class_weights.as_slice().iter().all(|w| (w - 1.0).abs() < 1e-12));
}

#[test]
fn fine_tune_boundary_past_backbone_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pipeline(&dir);
    config.train = config.train.fine_tune_from(2);
    let err = config.trainer().run().unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)), "{}", err);
}

#[test]
fn empty_training_class_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let config = pipeline(&dir);
    let extra = "Tomato___Leaf_Mold";
    std::fs::create_dir_all(config.paths.train_dir.join(extra)).unwrap();
    std::fs::create_dir_all(config.paths.test_dir.join(extra)).unwrap();
    RgbImage::new(SIZE, SIZE).save(config.paths.test_dir.join(extra).join("x.png")).unwrap();

    match config.trainer().run().unwrap_err() {
        PipelineError::EmptyClass { name, .. } => assert_eq!(name, extra),
        other => panic!("expected EmptyClass, got {}", other),
    }
}

#[test]
fn missing_train_dir_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = pipeline(&dir);
    config.paths.train_dir = dir.path().join("nowhere");
    let err = config.trainer().run().unwrap_err();
    assert!(err.to_string().contains("nowhere"));
}

#[test]
fn evaluation_counts_every_test_sample() {
    let dir = tempfile::tempdir().unwrap();
    let config = trained(&dir);
    let evaluator = config.evaluator();
    let eval = evaluator.run().unwrap();

    assert_eq!(eval.confusion.total(), 10);
    assert_eq!(eval.truths, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
    assert_eq!(eval.report.classes.iter().map(|c| c.support).sum::<usize>(), 10);
    let text = std::fs::read_to_string(evaluator.report_path()).unwrap();
    assert!(text.contains("Tomato___healthy") && text.contains("weighted avg"));
    assert!(image::open(evaluator.confusion_path()).is_ok());
}

#[test]
fn evaluation_rejects_a_different_class_set() {
    let dir = tempfile::tempdir().unwrap();
    let config = trained(&dir);
    std::fs::create_dir_all(config.paths.test_dir.join("Tomato___Leaf_Mold")).unwrap();
    RgbImage::new(SIZE, SIZE).save(config.paths.test_dir.join("Tomato___Leaf_Mold/a.png")).unwrap();
    let err = config.evaluator().run().unwrap_err();
    assert!(matches!(err, PipelineError::ClassMismatch(_)));
}

#[test]
fn export_is_quantized_loadable_and_stable() {
    let dir = tempfile::tempdir().unwrap();
    let config = trained(&dir);

    let first = config.exporter().run().unwrap();
    assert_eq!(first.mode, ExportMode::Quantized);
    assert_eq!(first.calibration_samples, 16);
    assert_eq!(read_labels(&config.paths.labels).unwrap(), CLASSES.map(String::from).to_vec());
    assert!(InferenceModel::load(&first.path).unwrap().artifact.quantized);

    let mut again = config.exporter();
    again.output_path = dir.path().join("again/model.tlnn");
    let second = again.run().unwrap();
    let ratio = first.bytes as f64 / second.bytes as f64;
    assert!((0.9..=1.1).contains(&ratio));

    let classifier = Classifier::load(&first.path, &config.paths.labels).unwrap();
    let ranked = classifier
        .classify_image(&config.paths.test_dir.join("Tomato___healthy/leaf_000.png"))
        .unwrap();
    assert_eq!(ranked.len(), 2);
    assert!(ranked[0].confidence >= ranked[1].confidence);
}

#[test]
fn representative_calibration_reads_training_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = trained(&dir);
    config.export.representative = true;
    let report = config.exporter().run().unwrap();
    assert_eq!(report.mode, ExportMode::Quantized);
    assert_eq!(report.calibration_samples, 16);
}

/// Rejects every quantized attempt the way an int8-only op set rejects an
/// unsupported operator; float attempts go through the real converter.
struct NoInt8Converter;

impl Converter for NoInt8Converter {
    fn convert(
        &self,
        network: &Network,
        options: &ConversionOptions,
        calibration: Option<&CalibrationDataset>,
    ) -> Result<InferenceArtifact, ConversionError> {
        if options.quantize {
            return Err(ConversionError::UnsupportedOperator {
                layer: 0,
                op: "CONV_2D".into(),
                op_set: "INT8_BUILTINS".into(),
            });
        }
        NativeConverter.convert(network, options, calibration)
    }
}

struct BrokenConverter;

impl Converter for BrokenConverter {
    fn convert(
        &self,
        _network: &Network,
        _options: &ConversionOptions,
        _calibration: Option<&CalibrationDataset>,
    ) -> Result<InferenceArtifact, ConversionError> {
        Err(ConversionError::Encode("disk full".into()))
    }
}

#[test]
fn failed_quantization_falls_back_to_float() {
    let dir = tempfile::tempdir().unwrap();
    let config = trained(&dir);

    let report = config.exporter().run_with(&NoInt8Converter).unwrap();
    match &report.mode {
        ExportMode::Fallback { reason } => assert!(reason.contains("CONV_2D")),
        other => panic!("expected fallback, got {:?}", other),
    }
    assert_eq!(report.calibration_samples, 0);
    let model = InferenceModel::load(&report.path).unwrap();
    assert!(!model.artifact.quantized);
    assert_eq!(model.output_size(), 2);
}

#[test]
fn fallback_can_be_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = trained(&dir);
    config.export.require_quantized = true;
    let err = config.exporter().run_with(&NoInt8Converter).unwrap_err();
    assert!(matches!(err, PipelineError::QuantizationRequired(_)));
    assert!(!config.paths.export.exists());
}

#[test]
fn both_attempts_failing_is_fatal_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = trained(&dir);
    let err = config.exporter().run_with(&BrokenConverter).unwrap_err();
    assert!(matches!(err, PipelineError::Export { .. }));
    let written: Vec<PathBuf> = std::fs::read_dir(dir.path().join("models")).unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().map_or(false, |e| e == "tlnn"))
        .collect();
    assert!(written.is_empty());
}

#[test]
fn quantized_artifact_is_smaller_than_the_float_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let config = trained(&dir);

    let quantized = config.exporter().run().unwrap();
    let mut fallback = config.exporter();
    fallback.output_path = dir.path().join("float/model.tlnn");
    let float = fallback.run_with(&NoInt8Converter).unwrap();

    assert_eq!(quantized.mode, ExportMode::Quantized);
    assert!(float.is_fallback());
    // int8 weights take a quarter of the f32 bytes; allow for headers and scales.
    assert!(quantized.bytes * 2 < float.bytes, "quantized {} vs float {}", quantized.bytes, float.bytes);
}

#[test]
fn decided_predictions_are_recorded_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let config = trained(&dir);
    let report = config.exporter().run().unwrap();
    let classifier = Classifier::load(&report.path, &config.paths.labels).unwrap().with_threshold(0.0);
    let history = config.detection_history();

    for name in CLASSES {
        let ranked = classifier.classify_image(&config.paths.test_dir.join(name).join("leaf_001.png")).unwrap();
        let decided = classifier.decide(&ranked).unwrap();
        history.record(&Detection::now(&decided)).unwrap();
    }

    let listed = history.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].timestamp_ms >= listed[1].timestamp_ms);
    assert!(listed.iter().all(|d| CLASSES.contains(&d.label.as_str())));
    assert_eq!(history.clear().unwrap(), 2);
    assert!(!config.paths.detections.exists());
}
