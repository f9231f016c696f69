pub mod trainer;
pub mod scheduler;
pub mod callbacks;
pub mod pipeline;
pub mod plots;

use crate::model::metrics::EvaluationReport;
use crate::utils::validation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Maximum number of training epochs
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Initial learning rate
    pub learning_rate: f64,
    /// Adam epsilon
    pub adam_epsilon: f32,
    /// Learning rate scheduler type ("plateau" or "constant")
    pub lr_scheduler: String,
    /// Fraction of the training split held back for validation
    pub validation_split: f64,
    /// Early stopping patience (0 = disabled)
    pub early_stopping_patience: usize,
    /// Restore the weights of the best validation epoch
    pub restore_best_weights: bool,
    /// Plateau scheduler reduction factor
    pub lr_factor: f64,
    /// Plateau scheduler patience
    pub lr_patience: usize,
    /// Learning rate floor
    pub min_lr: f64,
    /// Weight the loss by balanced class weights
    pub class_weighting: bool,
    /// Held-out test fraction
    pub test_size: f64,
    /// Random seed for the split and epoch shuffles
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.001,
            adam_epsilon: 1e-7,
            lr_scheduler: "plateau".to_string(),
            validation_split: 0.2,
            early_stopping_patience: 15,
            restore_best_weights: true,
            lr_factor: 0.5,
            lr_patience: 5,
            min_lr: 1e-6,
            class_weighting: true,
            test_size: 0.2,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Create configuration for quick testing
    pub fn quick_test() -> Self {
        Self {
            epochs: 5,
            batch_size: 16,
            learning_rate: 0.01,
            ..Default::default()
        }
    }

    /// Load from a JSON file; missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read training config {:?}", path))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse training config {:?}", path))
    }

    /// Reject values the trainer cannot run with
    pub fn validate(&self) -> Result<()> {
        validation::positive(self.epochs, "epochs")?;
        validation::positive(self.batch_size, "batch_size")?;
        validation::positive(self.learning_rate, "learning_rate")?;
        validation::positive(self.validation_split, "validation_split")?;
        validation::in_range(self.validation_split, 0.0, 0.9, "validation_split")?;
        validation::in_range(self.test_size, 0.01, 0.9, "test_size")?;
        validation::in_range(self.lr_factor, 0.0, 1.0, "lr_factor")?;
        validation::in_range(self.min_lr, 0.0, self.learning_rate, "min_lr")?;
        match self.lr_scheduler.as_str() {
            "plateau" | "constant" => Ok(()),
            other => anyhow::bail!("Unknown lr_scheduler: {}", other),
        }
    }
}

/// Metrics recorded at the end of each epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    /// Mean training loss (weighted BCE + L2)
    pub loss: f64,
    /// Training accuracy
    pub accuracy: f64,
    /// Validation loss (BCE + L2)
    pub val_loss: f64,
    /// Validation accuracy
    pub val_accuracy: f64,
    /// Learning rate used during the epoch
    pub learning_rate: f64,
}

/// Training state
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Completed epochs
    pub epoch: usize,
    /// Optimizer steps taken
    pub global_step: usize,
    /// Lowest validation loss seen
    pub best_val_loss: f64,
    /// Epoch (1-based) with the lowest validation loss
    pub best_epoch: usize,
    /// Whether early stopping ended training
    pub stopped_early: bool,
    /// Per-epoch history
    pub history: Vec<EpochMetrics>,
}

impl TrainingState {
    /// Create new training state
    pub fn new() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            ..Default::default()
        }
    }

    /// Update after epoch
    pub fn update_epoch(&mut self, metrics: EpochMetrics) {
        self.epoch += 1;
        if metrics.val_loss < self.best_val_loss {
            self.best_val_loss = metrics.val_loss;
            self.best_epoch = metrics.epoch;
        }
        self.history.push(metrics);
    }
}

/// Training result
#[derive(Debug)]
pub struct TrainingResult<M> {
    /// Trained model, best weights restored when configured
    pub model: M,
    /// Final training state
    pub state: TrainingState,
    /// Training duration in seconds
    pub duration_secs: f64,
}

/// Everything a finished pipeline run produced
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    /// Final training state
    pub state: TrainingState,
    /// Held-out test evaluation
    pub test_report: EvaluationReport,
    /// Directory the artifacts were written to
    pub artifact_dir: std::path::PathBuf,
    /// Training duration in seconds
    pub duration_secs: f64,
}
