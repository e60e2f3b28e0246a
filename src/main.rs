//! `tomato-leaf`: train, evaluate, export and run the tomato leaf classifier.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use tomato_leaf_nn::config::PipelineConfig;
use tomato_leaf_nn::export::ExportMode;
use tomato_leaf_nn::inference::{Classifier, Detection};
use tomato_leaf_nn::logging::{init_logging, LogConfig};
use tomato_leaf_nn::train::BackboneMode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tomato leaf pest classifier pipeline")]
struct Cli {
    /// Debug-level logging with module targets.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON pipeline configuration; missing fields keep their defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Frozen,
    FineTune,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the classifier head (and optionally the upper backbone).
    Train {
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// First trainable backbone layer in fine-tune mode.
        #[arg(long)]
        boundary: Option<usize>,
        #[arg(long)]
        epochs: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Base learning rate; fine-tuning divides it by 10.
        #[arg(long)]
        learning_rate: Option<f64>,
        #[arg(long)]
        train_dir: Option<PathBuf>,
        #[arg(long)]
        test_dir: Option<PathBuf>,
        /// Full-precision network whose backbone is reused.
        #[arg(long)]
        pretrained: Option<PathBuf>,
        #[arg(long)]
        no_augment: bool,
    },
    /// Write the classification report and confusion matrix for a saved model.
    Evaluate {
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        test_dir: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Convert a saved model into an int8 inference artifact (float fallback).
    Export {
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        calibration_samples: Option<usize>,
        /// Calibrate on training images instead of random inputs.
        #[arg(long)]
        representative: bool,
        /// Fail instead of writing a float artifact.
        #[arg(long)]
        require_quantized: bool,
    },
    /// Classify one image with an exported artifact.
    Predict {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        artifact: Option<PathBuf>,
        #[arg(long)]
        labels: Option<PathBuf>,
        #[arg(long, default_value_t = tomato_leaf_nn::inference::DEFAULT_THRESHOLD)]
        threshold: f64,
        /// Print every class with its probability.
        #[arg(long)]
        all: bool,
        /// Append a decided prediction to the detection history.
        #[arg(long)]
        record: bool,
    },
    /// List recorded detections, newest first.
    History {
        /// Delete every recorded detection instead.
        #[arg(long)]
        clear: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose { LogConfig::verbose() } else { LogConfig::default() };
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_json(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Train { mode, boundary, epochs, batch_size, learning_rate, train_dir, test_dir, pretrained, no_augment } => {
            match (mode, boundary) {
                (Some(ModeArg::Frozen), _) => config.train.backbone_mode = BackboneMode::Frozen,
                (Some(ModeArg::FineTune), Some(b)) => config.train.backbone_mode = BackboneMode::FineTune { boundary: b },
                (Some(ModeArg::FineTune), None) => anyhow::bail!("--mode fine-tune needs --boundary"),
                (None, Some(b)) => config.train.backbone_mode = BackboneMode::FineTune { boundary: b },
                (None, None) => {}
            }
            if let Some(v) = epochs { config.train.epochs = v; }
            if let Some(v) = batch_size { config.train.batch_size = v; }
            if let Some(v) = learning_rate { config.train.learning_rate = v; }
            if let Some(v) = train_dir { config.paths.train_dir = v; }
            if let Some(v) = test_dir { config.paths.test_dir = v; }
            if pretrained.is_some() { config.paths.pretrained_backbone = pretrained; }
            if no_augment { config.image.augmentation.enabled = false; }

            let outcome = config.trainer().run().context("training failed")?;
            if let Some(best) = outcome.history.best_by_val_accuracy() {
                info!(epoch = best.epoch, val_accuracy = best.val_accuracy, "best epoch");
            }
            if outcome.stopped_early {
                info!(restored_epoch = ?outcome.best_epoch, "training stopped early");
            }
        }
        Command::Evaluate { model, test_dir, out_dir } => {
            let mut evaluator = config.evaluator();
            if let Some(v) = model { evaluator.model_path = v; }
            if let Some(v) = test_dir { evaluator.test_dir = v; }
            if let Some(v) = out_dir { evaluator.out_dir = v; }
            let evaluation = evaluator.run().context("evaluation failed")?;
            println!("{}", evaluation.render_text());
        }
        Command::Export { model, output, calibration_samples, representative, require_quantized } => {
            if let Some(v) = calibration_samples { config.export.calibration_samples = v; }
            config.export.representative |= representative;
            config.export.require_quantized |= require_quantized;
            let mut exporter = config.exporter();
            if let Some(v) = model { exporter.model_path = v; }
            if let Some(v) = output {
                exporter.labels_path = Some(v.with_file_name("labels.txt"));
                exporter.output_path = v;
            }
            let report = exporter.run().context("export failed")?;
            match &report.mode {
                ExportMode::Quantized => info!(path = %report.path.display(), bytes = report.bytes, "exported int8 model"),
                ExportMode::Fallback { reason } => warn!(
                    path = %report.path.display(),
                    bytes = report.bytes,
                    reason = %reason,
                    "exported float model (quantization fell back)"
                ),
            }
        }
        Command::Predict { image, artifact, labels, threshold, all, record } => {
            let artifact = artifact.unwrap_or_else(|| config.paths.export.clone());
            let labels = labels.unwrap_or_else(|| config.paths.labels.clone());
            let classifier = Classifier::load(&artifact, &labels)
                .with_context(|| format!("loading classifier from {}", artifact.display()))?
                .with_threshold(threshold);
            let ranked = classifier.classify_image(&image)
                .with_context(|| format!("classifying {}", image.display()))?;
            let decision = classifier.decide(&ranked);
            if all {
                for p in &ranked {
                    println!("{:>6.2}%  {}", p.confidence * 100.0, p.label);
                }
            } else {
                match &decision {
                    Some(p) => println!("{} ({:.2}%)", p.label, p.confidence * 100.0),
                    None => println!("undecided (no class above {:.0}%)", threshold * 100.0),
                }
            }
            if record {
                match &decision {
                    Some(p) => config.detection_history().record(&Detection::now(p))
                        .context("recording detection")?,
                    None => warn!("undecided prediction was not recorded"),
                }
            }
        }
        Command::History { clear } => {
            let history = config.detection_history();
            if clear {
                let removed = history.clear().context("clearing detection history")?;
                println!("removed {} detection(s)", removed);
            } else {
                let detections = history.list()
                    .with_context(|| format!("reading {}", history.path().display()))?;
                if detections.is_empty() {
                    println!("no detections recorded");
                }
                for d in &detections {
                    println!("{:>15}  {:>6.2}%  {}", d.timestamp_ms, d.confidence * 100.0, d.label);
                }
            }
        }
    }
    Ok(())
}
