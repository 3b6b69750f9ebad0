//! Experiment orchestration around an external training driver.
//!
//! Gradients and parameter updates belong to a [`TrainingDriver`]. This module
//! owns everything around it: the validation split, per-epoch evaluation,
//! learning-rate reduction on plateaus, early stopping (restoring the best
//! weights when it triggers), and the final test report.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::ImageDataset;
use crate::error::{ConfigError, ExperimentError, ParameterError};
use crate::loss::cross_entropy_loss;
use crate::metrics::{accuracy, top_k_accuracy};
use crate::models::block::BlockKind;
use crate::models::classifier::Classifier;
use crate::nn::{self, Module};

/// Performs the optimization passes of an experiment.
pub trait TrainingDriver {
    /// Runs one epoch of optimization over `train` at `learning_rate` and
    /// returns the mean training loss. Updates are written through the
    /// handles returned by `model.parameters()`.
    fn train_epoch(
        &mut self,
        model: &Classifier,
        train: &ImageDataset,
        config: &ExperimentConfig,
        learning_rate: f32,
    ) -> f32;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub validation_split: f32,
    pub plateau_factor: f32,
    pub plateau_patience: usize,
    pub min_learning_rate: f32,
    pub early_stopping_patience: usize,
    pub restore_best_weights: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.005,
            weight_decay: 0.0001,
            batch_size: 128,
            num_epochs: 50,
            validation_split: 0.1,
            plateau_factor: 0.5,
            plateau_patience: 5,
            min_learning_rate: 0.0,
            early_stopping_patience: 10,
            restore_best_weights: true,
        }
    }
}

impl ExperimentConfig {
    /// Defaults with the learning rate tuned for `kind`.
    pub fn for_block(kind: BlockKind) -> Self {
        let learning_rate = match kind {
            BlockKind::MlpMixer => 0.005,
            BlockKind::FNet => 0.001,
            BlockKind::Gmlp => 0.003,
        };
        Self {
            learning_rate,
            ..Self::default()
        }
    }
}

/// Multiplies the learning rate by `factor` once the monitored loss has not
/// improved by more than `min_delta` for `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    factor: f32,
    patience: usize,
    min_delta: f32,
    min_lr: f32,
    best: f32,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f32, patience: usize, min_lr: f32) -> Self {
        Self {
            factor,
            patience,
            min_delta: 1e-4,
            min_lr,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    /// Records this epoch's loss and returns the learning rate to use next.
    pub fn step(&mut self, loss: f32, learning_rate: f32) -> f32 {
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.wait = 0;
            return learning_rate;
        }

        self.wait += 1;
        if self.wait >= self.patience && learning_rate > self.min_lr {
            self.wait = 0;
            return (learning_rate * self.factor).max(self.min_lr);
        }
        learning_rate
    }
}

/// Stops training once the monitored loss has not improved for `patience`
/// epochs, remembering the best parameters seen.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best: f32,
    best_epoch: Option<usize>,
    wait: usize,
    best_weights: Option<Vec<ArrayD<f32>>>,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            best: f32::INFINITY,
            best_epoch: None,
            wait: 0,
            best_weights: None,
        }
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best_loss(&self) -> f32 {
        self.best
    }

    /// Records this epoch's loss. `model` is snapshotted on improvement.
    /// Returns true when training should stop.
    pub fn update<M: Module + ?Sized>(&mut self, epoch: usize, loss: f32, model: &M) -> bool {
        self.wait += 1;
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.best_epoch = Some(epoch);
            self.best_weights = Some(nn::snapshot(model));
            self.wait = 0;
        }
        self.wait >= self.patience && epoch > 0
    }

    /// Writes the best snapshot back into `model`. Returns false if none was taken.
    pub fn restore_best<M: Module + ?Sized>(&self, model: &M) -> Result<bool, ParameterError> {
        match &self.best_weights {
            Some(state) => {
                nn::restore(model, state)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Loss and accuracies of a model over a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
    pub top5_accuracy: f32,
}

/// Evaluates `model` in inference mode, weighting each batch by its size.
pub fn evaluate(model: &Classifier, dataset: &ImageDataset, batch_size: usize) -> Evaluation {
    let mut totals = Evaluation {
        loss: 0.0,
        accuracy: 0.0,
        top5_accuracy: 0.0,
    };
    if dataset.is_empty() {
        return totals;
    }

    for batch in dataset.batches(batch_size) {
        let logits = model.forward(&batch.images);
        let weight = batch.labels.len() as f32;
        totals.loss += cross_entropy_loss(&logits, &batch.labels) * weight;
        totals.accuracy += accuracy(&logits, &batch.labels) * weight;
        totals.top5_accuracy += top_k_accuracy(&logits, &batch.labels, 5) * weight;
    }

    let n = dataset.len() as f32;
    Evaluation {
        loss: totals.loss / n,
        accuracy: totals.accuracy / n,
        top5_accuracy: totals.top5_accuracy / n,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub learning_rate: f32,
    pub train_loss: f32,
    pub validation: Evaluation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub history: Vec<EpochRecord>,
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
    pub test: Evaluation,
}

/// Trains `model` with `driver` and reports its test-set performance.
pub fn run_experiment<D: TrainingDriver + ?Sized>(
    model: &Classifier,
    driver: &mut D,
    train_data: &ImageDataset,
    test_data: &ImageDataset,
    config: &ExperimentConfig,
) -> Result<ExperimentReport, ExperimentError> {
    let num_classes = model.config().num_classes;
    train_data.check_labels(num_classes)?;
    test_data.check_labels(num_classes)?;
    if config.batch_size == 0 {
        return Err(ConfigError::ZeroDimension { name: "batch_size" }.into());
    }

    let (train, validation) = train_data.split_validation(config.validation_split)?;
    info!(
        block = %model.config().block,
        train = train.len(),
        validation = validation.len(),
        test = test_data.len(),
        learning_rate = config.learning_rate,
        "starting experiment"
    );

    let mut learning_rate = config.learning_rate;
    let mut plateau = ReduceLrOnPlateau::new(config.plateau_factor, config.plateau_patience, config.min_learning_rate);
    let mut early_stopping = EarlyStopping::new(config.early_stopping_patience);
    let mut history = Vec::with_capacity(config.num_epochs);
    let mut stopped_early = false;

    for epoch in 0..config.num_epochs {
        let train_loss = driver.train_epoch(model, &train, config, learning_rate);
        let val = evaluate(model, &validation, config.batch_size);
        info!(
            epoch = epoch + 1,
            train_loss,
            val_loss = val.loss,
            val_acc = val.accuracy,
            val_top5 = val.top5_accuracy,
            learning_rate,
            "epoch finished"
        );
        history.push(EpochRecord {
            epoch,
            learning_rate,
            train_loss,
            validation: val,
        });

        // Without a validation set there is nothing to monitor.
        if validation.is_empty() {
            continue;
        }

        if early_stopping.update(epoch, val.loss, model) {
            warn!(
                epoch = epoch + 1,
                best_epoch = early_stopping.best_epoch().map(|e| e + 1),
                best_val_loss = early_stopping.best_loss(),
                "validation loss stopped improving, stopping early"
            );
            stopped_early = true;
            break;
        }

        let next_rate = plateau.step(val.loss, learning_rate);
        if next_rate < learning_rate {
            info!(from = learning_rate, to = next_rate, "reducing learning rate on plateau");
        }
        learning_rate = next_rate;
    }

    // A run that uses every epoch keeps its last weights.
    if stopped_early && config.restore_best_weights && early_stopping.restore_best(model)? {
        info!(best_epoch = early_stopping.best_epoch().map(|e| e + 1), "restored best weights");
    }

    let test = evaluate(model, test_data, config.batch_size);
    info!("Test accuracy: {:.2}%", test.accuracy * 100.0);
    info!("Test top 5 accuracy: {:.2}%", test.top5_accuracy * 100.0);

    Ok(ExperimentReport {
        history,
        best_epoch: early_stopping.best_epoch(),
        stopped_early,
        test,
    })
}
