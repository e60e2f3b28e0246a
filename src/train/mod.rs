pub mod callbacks;
pub mod class_weights;
pub mod epoch_stats;
pub mod loop_fn;
pub mod train_config;
pub mod trainer;

pub use callbacks::{BestCheckpoint, EarlyStopping, ReduceLrOnPlateau};
pub use class_weights::ClassWeightTable;
pub use epoch_stats::{EpochStats, TrainingHistory};
pub use loop_fn::{evaluate_set, train_loop, LoopOutcome};
pub use train_config::{BackboneMode, TrainConfig, FINE_TUNE_LR_DIVISOR};
pub use trainer::{fit, TrainPaths, Trainer, TrainingOutcome};
