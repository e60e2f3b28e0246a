use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::dataset::tensor_set::{EpochSource, TensorSet};
use crate::error::{PipelineError, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::{argmax, matrix::Matrix};
use crate::network::network::Network;
use crate::optim::Optimizer;
use crate::train::callbacks::{BestCheckpoint, EarlyStopping, ReduceLrOnPlateau};
use crate::train::class_weights::ClassWeightTable;
use crate::train::epoch_stats::{EpochStats, TrainingHistory};
use crate::train::train_config::TrainConfig;

/// What `train_loop` observed besides the updated network.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub history: TrainingHistory,
    /// True when early stopping ended the run before the epoch budget.
    pub stopped_early: bool,
    /// Epoch whose parameters the network holds after an early stop.
    pub restored_epoch: Option<usize>,
    pub final_learning_rate: f64,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains the trainable layers of `network` with class-weighted cross-entropy.
///
/// After every epoch, in this order:
/// 1. `checkpoint` persists the network if validation accuracy improved,
/// 2. the learning rate decays if validation loss plateaued for `lr_patience` epochs,
/// 3. training stops if validation loss plateaued for `early_stop_patience`
///    epochs, and the best-validation-loss parameters are restored.
///
/// Frozen layers are never updated and back-propagation stops at the lowest
/// trainable layer.
pub fn train_loop(
    network: &mut Network,
    train: &mut dyn EpochSource,
    val: &TensorSet,
    class_weights: &ClassWeightTable,
    optimizer: &mut dyn Optimizer,
    config: &TrainConfig,
    checkpoint: &mut BestCheckpoint,
) -> Result<LoopOutcome> {
    config.validate(Some(network.backbone_len))?;
    if val.is_empty() {
        return Err(PipelineError::Config("validation set is empty".into()));
    }
    let n_classes = network.output_size();
    if train.n_classes() != n_classes || val.n_classes != n_classes || class_weights.len() != n_classes {
        return Err(PipelineError::ClassMismatch(format!(
            "network has {} outputs, train set {} classes, validation set {} classes, {} class weights",
            n_classes, train.n_classes(), val.n_classes, class_weights.len()
        )));
    }
    let lowest = network.lowest_trainable()
        .ok_or_else(|| PipelineError::Config("network has no trainable layers".into()))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut plateau = ReduceLrOnPlateau::new(config.lr_patience, config.lr_factor, config.min_lr)
        .with_min_delta(config.lr_min_delta);
    let mut early_stop = EarlyStopping::new(config.early_stop_patience)
        .with_min_delta(config.early_stop_min_delta);
    let mut history = TrainingHistory::default();
    let mut stopped_early = false;
    let mut restored_epoch = None;

    for epoch in 1..=config.epochs {
        let t_start = Instant::now();
        let learning_rate = optimizer.learning_rate();

        // ── One full pass over the training data ───────────────────────────
        let (train_loss, train_accuracy) = {
            let data = train.epoch(epoch);
            if data.is_empty() {
                return Err(PipelineError::Config("training set is empty".into()));
            }
            run_one_epoch(network, &data, class_weights, optimizer, config, lowest, &mut rng)
        };

        // ── Validation ────────────────────────────────────────────────────
        let (val_loss, val_accuracy) = evaluate_set(network, val);

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            train_accuracy,
            val_loss,
            val_accuracy,
            learning_rate,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        info!(
            "epoch {}/{} - loss {:.4} - accuracy {:.4} - val_loss {:.4} - val_accuracy {:.4} - lr {:.2e}",
            epoch, config.epochs, train_loss, train_accuracy, val_loss, val_accuracy, learning_rate
        );
        history.epochs.push(stats);

        // ── Callbacks ─────────────────────────────────────────────────────
        checkpoint.on_epoch_end(epoch, val_accuracy, network)?;
        if let Some(new_lr) = plateau.on_epoch_end(val_loss, learning_rate) {
            optimizer.set_learning_rate(new_lr);
        }
        if early_stop.on_epoch_end(epoch, val_loss, network) {
            stopped_early = true;
            restored_epoch = early_stop.restore_best(network);
            break;
        }
    }

    Ok(LoopOutcome {
        history,
        stopped_early,
        restored_epoch,
        final_learning_rate: optimizer.learning_rate(),
    })
}

/// Mean unweighted cross-entropy and accuracy over `set`, in inference mode.
pub fn evaluate_set(network: &mut Network, set: &TensorSet) -> (f64, f64) {
    let n = set.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mut total_loss = 0.0;
    let mut correct = 0usize;
    for (input, &label) in set.inputs.iter().zip(&set.labels) {
        let output = network.forward(input.clone());
        total_loss += CrossEntropyLoss::loss(&output, label);
        if argmax(&output) == label {
            correct += 1;
        }
    }
    (total_loss / n as f64, correct as f64 / n as f64)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Runs one epoch of mini-batch updates. Returns (mean weighted loss, accuracy).
fn run_one_epoch(
    network: &mut Network,
    data: &TensorSet,
    class_weights: &ClassWeightTable,
    optimizer: &mut dyn Optimizer,
    config: &TrainConfig,
    lowest: usize,
    rng: &mut StdRng,
) -> (f64, f64) {
    let n = data.len();
    let mut total_loss = 0.0;
    let mut correct = 0usize;

    let mut indices: Vec<usize> = (0..n).collect();
    if config.shuffle {
        indices.shuffle(rng);
    }

    for batch in indices.chunks(config.batch_size) {
        // Gradient storage for trainable layers only.
        let mut acc_grads: Vec<(Matrix, Vec<f64>)> = network.layers[lowest..].iter()
            .map(|layer| (Matrix::zeros(layer.input_size, layer.size), vec![0.0; layer.size]))
            .collect();

        for &idx in batch {
            let label = data.labels[idx];
            let weight = class_weights.get(label);

            let output = network.forward_train(data.inputs[idx].clone(), rng);
            total_loss += CrossEntropyLoss::weighted_loss(&output, label, weight);
            if argmax(&output) == label {
                correct += 1;
            }

            // Backward pass down to the lowest trainable layer.
            let mut delta = CrossEntropyLoss::weighted_derivative(&output, label, weight);
            for i in (lowest..network.layers.len()).rev() {
                let (w_grad, b_grad, input_delta) = network.layers[i].compute_gradients(&delta);
                let (w_acc, b_acc) = &mut acc_grads[i - lowest];
                for (a, g) in w_acc.data.iter_mut().zip(&w_grad.data) {
                    *a += g;
                }
                for (a, g) in b_acc.iter_mut().zip(&b_grad) {
                    *a += g;
                }
                delta = input_delta;
            }
        }

        // Average and apply.
        let inv_batch = 1.0 / batch.len() as f64;
        for (offset, (w_acc, b_acc)) in acc_grads.into_iter().enumerate() {
            let i = lowest + offset;
            if !network.layers[i].trainable {
                continue;
            }
            let w_avg = w_acc.map(|x| x * inv_batch);
            let b_avg: Vec<f64> = b_acc.iter().map(|x| x * inv_batch).collect();
            optimizer.step(i, &mut network.layers[i], &w_avg, &b_avg);
        }
    }

    debug!(samples = n, lowest_trainable = lowest, "epoch pass complete");
    (total_loss / n as f64, correct as f64 / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::network::spec::{BackboneSpec, HeadSpec, NetworkSpec};
    use crate::optim::{Adam, Sgd};
    use crate::train::train_config::BackboneMode;

    /// Two well-separated 4-d clusters per class.
    fn clusters(n_per_class: &[usize], seed: u64) -> TensorSet {
        use rand::Rng;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut inputs = Vec::new();
        let mut labels = Vec::new();
        for (class, &n) in n_per_class.iter().enumerate() {
            for _ in 0..n {
                let mut x: Vec<f64> = (0..4).map(|_| rng.gen_range(-0.1..0.1)).collect();
                x[class] += 1.0;
                inputs.push(x);
                labels.push(class);
            }
        }
        TensorSet::new(inputs, labels, n_per_class.len())
    }

    fn small_net(n_classes: usize) -> Network {
        NetworkSpec {
            input_size: 4,
            n_classes,
            backbone: BackboneSpec { widths: vec![8, 8], activation: ActivationFunction::ReLU6 },
            head: HeadSpec { hidden_units: 8, dropout: 0.0 },
        }
        .build(&mut StdRng::seed_from_u64(11))
        .unwrap()
    }

    #[test]
    fn frozen_layers_do_not_change() {
        let mut net = small_net(3);
        net.apply_backbone_mode(&BackboneMode::FineTune { boundary: 1 }).unwrap();
        let frozen_before = net.layers[0].clone();
        let tuned_before = net.layers[1].weights.clone();

        let mut train = clusters(&[10, 10, 10], 1);
        let val = clusters(&[4, 4, 4], 2);
        let config = TrainConfig { epochs: 2, batch_size: 5, ..TrainConfig::default() }.fine_tune_from(1);
        let mut opt = Sgd::new(config.effective_learning_rate());
        train_loop(&mut net, &mut train, &val, &ClassWeightTable::uniform(3), &mut opt, &config,
                   &mut BestCheckpoint::new(None)).unwrap();

        assert_eq!(net.layers[0].weights, frozen_before.weights);
        assert_eq!(net.layers[0].biases, frozen_before.biases);
        assert_ne!(net.layers[1].weights, tuned_before);
    }

    #[test]
    fn learns_separable_clusters() {
        let mut net = small_net(3);
        let mut train = clusters(&[30, 30, 30], 3);
        let val = clusters(&[10, 10, 10], 4);
        let config = TrainConfig {
            epochs: 30,
            batch_size: 8,
            learning_rate: 0.05,
            backbone_mode: BackboneMode::FineTune { boundary: 0 },
            early_stop_patience: 30,
            ..TrainConfig::default()
        };
        let mut opt = Adam::new(config.effective_learning_rate());
        let outcome = train_loop(&mut net, &mut train, &val, &ClassWeightTable::uniform(3), &mut opt,
                                 &config, &mut BestCheckpoint::new(None)).unwrap();

        let last = outcome.history.last().unwrap();
        assert!(last.val_accuracy >= 0.9, "val accuracy {}", last.val_accuracy);
        assert!(last.val_loss < outcome.history.epochs[0].val_loss);
    }

    #[test]
    fn early_stop_ends_run_and_restores_best() {
        let mut net = small_net(2);
        net.apply_backbone_mode(&BackboneMode::Frozen).unwrap();
        let mut train = clusters(&[12, 12], 5);
        // Validation labels are the opposite of training labels, so fitting
        // the training set drives validation loss up.
        let mut val = clusters(&[4, 4], 6);
        for label in val.labels.iter_mut() {
            *label = 1 - *label;
        }
        let config = TrainConfig {
            epochs: 40,
            batch_size: 4,
            learning_rate: 0.1,
            lr_patience: 1,
            early_stop_patience: 3,
            min_lr: 0.0,
            ..TrainConfig::default()
        };
        let mut opt = Sgd::new(config.effective_learning_rate());
        let outcome = train_loop(&mut net, &mut train, &val, &ClassWeightTable::uniform(2), &mut opt,
                                 &config, &mut BestCheckpoint::new(None)).unwrap();

        assert!(outcome.stopped_early);
        assert!(outcome.history.len() < 40);
        let best = outcome.restored_epoch.unwrap();
        let best_loss = outcome.history.epochs[best - 1].val_loss;
        assert!(outcome.history.epochs.iter().all(|s| s.val_loss >= best_loss));
        let (restored_loss, _) = evaluate_set(&mut net, &val);
        assert!((restored_loss - best_loss).abs() < 1e-9);
        assert!(outcome.final_learning_rate < 0.1);
    }

    #[test]
    fn class_count_mismatch_is_rejected() {
        let mut net = small_net(3);
        let mut train = clusters(&[2, 2], 1);
        let val = clusters(&[2, 2], 2);
        let config = TrainConfig::default();
        let mut opt = Sgd::new(0.1);
        let err = train_loop(&mut net, &mut train, &val, &ClassWeightTable::uniform(2), &mut opt,
                             &config, &mut BestCheckpoint::new(None)).unwrap_err();
        assert!(matches!(err, PipelineError::ClassMismatch(_)));
    }

    #[test]
    fn invalid_patience_order_is_rejected_before_training() {
        let mut net = small_net(2);
        let mut train = clusters(&[2, 2], 1);
        let val = clusters(&[2, 2], 2);
        let config = TrainConfig { lr_patience: 5, early_stop_patience: 5, ..TrainConfig::default() };
        let mut opt = Sgd::new(0.1);
        let err = train_loop(&mut net, &mut train, &val, &ClassWeightTable::uniform(2), &mut opt,
                             &config, &mut BestCheckpoint::new(None)).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
