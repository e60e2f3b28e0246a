use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::dataset::augment::Augmentation;
use crate::dataset::image::input_len;
use crate::dataset::partition::Partition;
use crate::dataset::tensor_set::{AugmentedSource, DecodedPartition, EpochSource, TensorSet};
use crate::error::{PipelineError, Result};
use crate::network::metadata::InputType;
use crate::network::network::Network;
use crate::network::spec::{BackboneSpec, HeadSpec, NetworkSpec};
use crate::train::callbacks::BestCheckpoint;
use crate::train::class_weights::ClassWeightTable;
use crate::train::epoch_stats::TrainingHistory;
use crate::train::loop_fn::{train_loop, LoopOutcome};
use crate::train::train_config::TrainConfig;

/// Filesystem locations a training run reads from and writes to.
#[derive(Debug, Clone)]
pub struct TrainPaths {
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
    /// Best-val-accuracy checkpoint; `None` disables checkpointing.
    pub checkpoint: Option<PathBuf>,
    /// Final model, written after the last epoch.
    pub model: PathBuf,
    pub history: Option<PathBuf>,
    /// Full-precision network whose backbone is reused.
    pub pretrained_backbone: Option<PathBuf>,
}

/// Result of a complete training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub network: Network,
    pub history: TrainingHistory,
    pub class_weights: ClassWeightTable,
    pub stopped_early: bool,
    /// Epoch the returned parameters come from when early stopping restored them.
    pub best_epoch: Option<usize>,
}

/// Builds, trains and persists the classifier from two partition directories.
#[derive(Debug, Clone)]
pub struct Trainer {
    pub paths: TrainPaths,
    pub image_size: u32,
    pub augmentation: Augmentation,
    pub backbone: BackboneSpec,
    pub head: HeadSpec,
    pub config: TrainConfig,
}

impl Trainer {
    pub fn new(paths: TrainPaths, config: TrainConfig) -> Trainer {
        Trainer {
            paths,
            image_size: 32,
            augmentation: Augmentation::default(),
            backbone: BackboneSpec::default(),
            head: HeadSpec::default(),
            config,
        }
    }

    /// Runs the whole stage: scan, weight, build, train, save.
    pub fn run(&self) -> Result<TrainingOutcome> {
        if self.image_size == 0 {
            return Err(PipelineError::Config("image size must be positive".into()));
        }
        self.config.validate(None)?;

        // ── Data ──────────────────────────────────────────────────────────
        let train_part = Partition::scan(&self.paths.train_dir)?;
        let val_part = Partition::scan(&self.paths.val_dir)?;
        train_part.ensure_same_classes(&val_part)?;

        let class_weights = ClassWeightTable::balanced(&train_part.class_counts(), &train_part.class_names)?;

        let train_decoded = DecodedPartition::load(&train_part, self.image_size)?;
        let val_set = DecodedPartition::load(&val_part, self.image_size)?.tensors();

        // ── Model ─────────────────────────────────────────────────────────
        let mut network = self.build_network(train_part.n_classes())?;
        network.metadata.output_labels = Some(train_part.class_names.clone());
        network.metadata.input_type = Some(InputType::ImageRgb { width: self.image_size, height: self.image_size });
        network.metadata.description = Some(format!(
            "tomato leaf classifier, {} classes, {}x{} RGB input",
            train_part.n_classes(), self.image_size, self.image_size
        ));

        let mut train_source: Box<dyn EpochSource> = if self.augmentation.enabled {
            Box::new(AugmentedSource::new(train_decoded, self.augmentation.clone(), self.config.seed))
        } else {
            Box::new(train_decoded.tensors())
        };
        let mut checkpoint = BestCheckpoint::new(self.paths.checkpoint.clone());

        let outcome = fit(&mut network, train_source.as_mut(), &val_set, &class_weights, &self.config, &mut checkpoint)?;

        // ── Persist ───────────────────────────────────────────────────────
        network.save_json(&self.paths.model)?;
        info!(path = %self.paths.model.display(), "saved final model");
        if let Some(path) = &self.paths.history {
            outcome.history.save_json(path)?;
            info!(path = %path.display(), "saved training history");
        }

        Ok(TrainingOutcome {
            network,
            history: outcome.history,
            class_weights,
            stopped_early: outcome.stopped_early,
            best_epoch: outcome.restored_epoch,
        })
    }

    /// Fresh head on either the pretrained backbone or a newly initialized one.
    fn build_network(&self, n_classes: usize) -> Result<Network> {
        let spec = NetworkSpec {
            input_size: input_len(self.image_size),
            n_classes,
            backbone: self.backbone.clone(),
            head: self.head.clone(),
        };
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        match &self.paths.pretrained_backbone {
            Some(path) => {
                let pretrained = Network::load_json(path)?;
                info!(path = %path.display(), layers = pretrained.backbone_len, "loaded pretrained backbone");
                spec.attach_head(pretrained, &mut rng)
            }
            None => {
                warn!("no pretrained backbone configured, training from randomly initialized weights");
                spec.build(&mut rng)
            }
        }
    }
}

/// Applies the backbone policy, builds the optimizer at the mode's learning
/// rate and runs the training loop.
pub fn fit(
    network: &mut Network,
    train: &mut dyn EpochSource,
    val: &TensorSet,
    class_weights: &ClassWeightTable,
    config: &TrainConfig,
    checkpoint: &mut BestCheckpoint,
) -> Result<LoopOutcome> {
    config.validate(Some(network.backbone_len))?;
    network.apply_backbone_mode(&config.backbone_mode)?;

    let learning_rate = config.effective_learning_rate();
    let mut optimizer = config.optimizer.build(learning_rate);
    let trainable = network.trainable_mask().iter().filter(|&&t| t).count();
    info!(
        mode = ?config.backbone_mode,
        learning_rate,
        trainable_layers = trainable,
        total_layers = network.layers.len(),
        parameters = network.parameter_count(),
        "starting training"
    );

    train_loop(network, train, val, class_weights, optimizer.as_mut(), config, checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::train::train_config::BackboneMode;

    fn net() -> Network {
        NetworkSpec {
            input_size: 2,
            n_classes: 2,
            backbone: BackboneSpec { widths: vec![4, 4, 4], activation: ActivationFunction::ReLU6 },
            head: HeadSpec { hidden_units: 4, dropout: 0.0 },
        }
        .build(&mut StdRng::seed_from_u64(3))
        .unwrap()
    }

    fn toy() -> TensorSet {
        TensorSet::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![0, 1], 2)
    }

    #[test]
    fn fit_freezes_below_boundary() {
        let mut network = net();
        let config = TrainConfig { epochs: 1, ..TrainConfig::default() }.fine_tune_from(2);
        let mut train = toy();
        fit(&mut network, &mut train, &toy(), &ClassWeightTable::uniform(2), &config,
            &mut BestCheckpoint::new(None)).unwrap();
        assert_eq!(network.trainable_mask(), vec![false, false, true, true, true]);
        assert_eq!(network.metadata.backbone_mode, Some(BackboneMode::FineTune { boundary: 2 }));
    }

    #[test]
    fn fine_tuning_starts_at_a_tenth_of_the_base_rate() {
        let config = TrainConfig { epochs: 1, learning_rate: 1e-3, ..TrainConfig::default() };
        let mut train = toy();

        let frozen = fit(&mut net(), &mut train, &toy(), &ClassWeightTable::uniform(2), &config,
                         &mut BestCheckpoint::new(None)).unwrap();
        assert!((frozen.history.epochs[0].learning_rate - 1e-3).abs() < 1e-15);

        let tuned = fit(&mut net(), &mut train, &toy(), &ClassWeightTable::uniform(2), &config.fine_tune_from(1),
                        &mut BestCheckpoint::new(None)).unwrap();
        assert!((tuned.history.epochs[0].learning_rate - 1e-4).abs() < 1e-15);
    }

    #[test]
    fn fit_rejects_boundary_past_backbone() {
        let mut network = net();
        let config = TrainConfig::default().fine_tune_from(4);
        let mut train = toy();
        let err = fit(&mut network, &mut train, &toy(), &ClassWeightTable::uniform(2), &config,
                      &mut BestCheckpoint::new(None)).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
