use crate::data::preprocessing::ClassWeights;
use crate::data::PatientRecord;
use crate::model::architecture::{init_model, DiabetesNet};
use crate::model::ModelConfig;
use crate::training::callbacks::{
    CallbackManager, EarlyStoppingCallback, MetricsLoggerCallback, ProgressLoggerCallback,
    TimerCallback,
};
use crate::training::scheduler::LearningRateScheduler;
use crate::training::{EpochMetrics, TrainingConfig, TrainingResult, TrainingState};
use crate::utils::random;
use anyhow::{anyhow, bail, Result};
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Probability threshold for the positive class
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Trainer for the diabetes risk network
pub struct Trainer<B: AutodiffBackend> {
    /// Training configuration
    config: TrainingConfig,
    /// Model configuration
    model_config: ModelConfig,
    /// Device
    device: B::Device,
    /// Where to stream the per-epoch history
    history_file: Option<PathBuf>,
    /// Draw an epoch progress bar
    show_progress: bool,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create new trainer
    pub fn new(config: TrainingConfig, model_config: ModelConfig, device: B::Device) -> Self {
        Self {
            config,
            model_config,
            device,
            history_file: None,
            show_progress: true,
        }
    }

    /// Write history to this file after every epoch
    pub fn with_history_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.history_file = Some(path.into());
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Train on `train`, monitoring `val`
    ///
    /// Rows are reshuffled every epoch. Training rows are weighted by
    /// `class_weights`; validation loss is unweighted. Returns the inference
    /// copy of the model with the best validation epoch's weights when
    /// `restore_best_weights` is set.
    pub fn train(
        &self,
        train: &[PatientRecord],
        val: &[PatientRecord],
        class_weights: &ClassWeights,
    ) -> Result<TrainingResult<DiabetesNet<B::InnerBackend>>> {
        check_records(train, self.model_config.input_size, "training")?;
        check_records(val, self.model_config.input_size, "validation")?;
        info!(
            "Training on {} rows, validating on {} rows, {} epochs max",
            train.len(),
            val.len(),
            self.config.epochs
        );
        debug!("Training configuration: {:?}", self.config);

        let start_time = Instant::now();
        let mut state = TrainingState::new();
        let mut rng = random::seeded_rng(self.config.seed);
        B::seed(self.config.seed);

        let mut model = init_model::<B>(&self.model_config, &self.device);
        let mut optim = AdamConfig::new()
            .with_epsilon(self.config.adam_epsilon)
            .init::<B, DiabetesNet<B>>();
        let mut scheduler = LearningRateScheduler::from_config(&self.config);
        let mut best_model: Option<DiabetesNet<B>> = None;

        let mut callbacks = CallbackManager::new();
        callbacks.add_callback(TimerCallback::new());
        callbacks.add_callback(ProgressLoggerCallback::new(
            if self.show_progress { 10 } else { 1 },
            self.config.epochs,
        ));
        if self.config.early_stopping_patience > 0 {
            callbacks.add_callback(EarlyStoppingCallback::new(self.config.early_stopping_patience));
        }
        if let Some(path) = &self.history_file {
            callbacks.add_callback(MetricsLoggerCallback::new(path.clone()));
        }

        let progress = self.progress_bar();
        callbacks.on_train_begin();

        for epoch in 0..self.config.epochs {
            callbacks.on_epoch_begin(epoch);
            let lr = scheduler.get_lr();

            let order = random::shuffled_indices(train.len(), &mut rng);
            let mut loss_sum = 0.0;
            let mut correct = 0usize;

            for batch in order.chunks(self.config.batch_size) {
                let tensors = batch_tensors::<B>(train, batch, Some(class_weights), &self.device);
                let output = model.loss(tensors.inputs, tensors.targets, tensors.weights);

                let batch_loss: f64 = output.loss.clone().into_scalar().elem();
                loss_sum += batch_loss * batch.len() as f64;
                let logits = output
                    .logits
                    .into_data()
                    .to_vec::<f32>()
                    .map_err(|e| anyhow!("Failed to read logits: {:?}", e))?;
                correct += count_correct(&logits, &tensors.labels);

                let grads = output.loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(lr, model, grads);
                state.global_step += 1;
            }

            let val_eval = evaluate(&model.valid(), val, self.config.batch_size, &self.device)?;
            let metrics = EpochMetrics {
                epoch: epoch + 1,
                loss: loss_sum / train.len() as f64,
                accuracy: correct as f64 / train.len() as f64,
                val_loss: val_eval.loss,
                val_accuracy: val_eval.accuracy,
                learning_rate: lr,
            };

            if metrics.val_loss < state.best_val_loss {
                best_model = Some(model.clone());
            }
            state.update_epoch(metrics.clone());
            scheduler.step_with_metric(metrics.val_loss);

            progress.set_message(format!(
                "loss {:.4} val_loss {:.4}",
                metrics.loss, metrics.val_loss
            ));
            progress.inc(1);

            callbacks.on_epoch_end(&state, &metrics);
            if callbacks.should_stop() {
                state.stopped_early = true;
                break;
            }
        }

        progress.finish_and_clear();
        callbacks.on_train_end(&state);
        info!(
            "Finished after {} epochs, {} optimizer steps",
            state.epoch, state.global_step
        );

        if self.config.restore_best_weights {
            if let Some(best) = best_model {
                info!(
                    "Restoring weights from epoch {} (val_loss {:.4})",
                    state.best_epoch, state.best_val_loss
                );
                model = best;
            }
        }

        Ok(TrainingResult {
            model: model.valid(),
            state,
            duration_secs: start_time.elapsed().as_secs_f64(),
        })
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(self.config.epochs as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} epoch {pos}/{len} [{bar:30}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar
    }
}

/// Loss and accuracy of a model over a set of rows
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Unweighted BCE plus the L2 term
    pub loss: f64,
    pub accuracy: f64,
    /// Positive-class probability per row
    pub probabilities: Vec<f32>,
}

impl Evaluation {
    /// Thresholded class labels
    pub fn predictions(&self) -> Vec<u8> {
        self.probabilities
            .iter()
            .map(|&p| u8::from(p > DECISION_THRESHOLD))
            .collect()
    }
}

/// Evaluate without gradients or dropout
pub fn evaluate<B: Backend>(
    model: &DiabetesNet<B>,
    records: &[PatientRecord],
    batch_size: usize,
    device: &B::Device,
) -> Result<Evaluation> {
    if records.is_empty() {
        bail!("Cannot evaluate on an empty set");
    }
    let indices: Vec<usize> = (0..records.len()).collect();
    let mut loss_sum = 0.0;
    let mut probabilities = Vec::with_capacity(records.len());

    for batch in indices.chunks(batch_size.max(1)) {
        let tensors = batch_tensors::<B>(records, batch, None, device);
        let output = model.loss(tensors.inputs, tensors.targets, None);
        let batch_loss: f64 = output.loss.into_scalar().elem();
        loss_sum += batch_loss * batch.len() as f64;

        let probs = burn::tensor::activation::sigmoid(output.logits)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Failed to read probabilities: {:?}", e))?;
        probabilities.extend(probs);
    }

    let labels: Vec<u8> = records.iter().map(|r| r.target.unwrap_or(0)).collect();
    let correct = probabilities
        .iter()
        .zip(&labels)
        .filter(|&(&p, &t)| u8::from(p > DECISION_THRESHOLD) == t)
        .count();

    Ok(Evaluation {
        loss: loss_sum / records.len() as f64,
        accuracy: correct as f64 / records.len() as f64,
        probabilities,
    })
}

struct BatchTensors<B: Backend> {
    inputs: Tensor<B, 2>,
    targets: Tensor<B, 2>,
    weights: Option<Tensor<B, 2>>,
    labels: Vec<u8>,
}

fn batch_tensors<B: Backend>(
    records: &[PatientRecord],
    indices: &[usize],
    class_weights: Option<&ClassWeights>,
    device: &B::Device,
) -> BatchTensors<B> {
    let n = indices.len();
    let d = records.first().map(|r| r.features.len()).unwrap_or(0);

    let mut features = Vec::with_capacity(n * d);
    let mut labels = Vec::with_capacity(n);
    for &i in indices {
        features.extend_from_slice(&records[i].features);
        labels.push(records[i].target.unwrap_or(0));
    }

    let targets: Vec<f32> = labels.iter().map(|&t| t as f32).collect();
    let weights = class_weights.map(|cw| {
        let w: Vec<f32> = labels.iter().map(|&t| cw.weight(t) as f32).collect();
        Tensor::from_data(TensorData::new(w, [n, 1]), device)
    });

    BatchTensors {
        inputs: Tensor::from_data(TensorData::new(features, [n, d]), device),
        targets: Tensor::from_data(TensorData::new(targets, [n, 1]), device),
        weights,
        labels,
    }
}

fn count_correct(logits: &[f32], labels: &[u8]) -> usize {
    logits
        .iter()
        .zip(labels)
        .filter(|&(&z, &t)| u8::from(z > 0.0) == t)
        .count()
}

fn check_records(records: &[PatientRecord], width: usize, name: &str) -> Result<()> {
    if records.is_empty() {
        bail!("The {} set is empty", name);
    }
    if let Some(pos) = records.iter().position(|r| r.target.is_none()) {
        bail!("Row {} of the {} set has no label", pos, name);
    }
    if let Some(bad) = records.iter().find(|r| r.features.len() != width) {
        bail!(
            "The {} set has a row with {} features; the model expects {}",
            name,
            bad.features.len(),
            width
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn separable(n: usize) -> Vec<PatientRecord> {
        (0..n)
            .map(|i| {
                let label = (i % 2) as u8;
                let sign = if label == 1 { 1.0 } else { -1.0 };
                let jitter = (i % 7) as f32 * 0.05;
                PatientRecord::new(vec![sign + jitter, sign - jitter, 0.5, sign], Some(label))
            })
            .collect()
    }

    fn small_model() -> ModelConfig {
        ModelConfig::diabetes_default()
            .with_input_size(4)
            .with_hidden_size_1(8)
            .with_hidden_size_2(4)
            .with_dropout(0.0)
            .with_use_batch_norm(false)
    }

    #[test]
    fn test_trainer_learns_separable_data() {
        let data = separable(80);
        let (train, val) = data.split_at(64);
        let config = TrainingConfig {
            epochs: 30,
            batch_size: 16,
            learning_rate: 0.01,
            ..Default::default()
        };
        let trainer = Trainer::<TestBackend>::new(config, small_model(), Default::default())
            .with_progress(false);

        let result = trainer.train(train, val, &ClassWeights::uniform()).unwrap();
        assert!(result.state.epoch > 0);
        assert_eq!(result.state.history.len(), result.state.epoch);
        // 64 rows in batches of 16
        assert_eq!(result.state.global_step, result.state.epoch * 4);

        let first = &result.state.history[0];
        let eval = evaluate(&result.model, val, 16, &Default::default()).unwrap();
        assert!(eval.loss < first.val_loss);
        assert!(eval.accuracy >= 0.85);
    }

    #[test]
    fn test_restored_weights_match_best_epoch() {
        let data = separable(40);
        let (train, val) = data.split_at(32);
        let config = TrainingConfig {
            epochs: 8,
            batch_size: 8,
            learning_rate: 0.05,
            ..Default::default()
        };
        let trainer = Trainer::<TestBackend>::new(config, small_model(), Default::default())
            .with_progress(false);
        let result = trainer.train(train, val, &ClassWeights::uniform()).unwrap();

        let eval = evaluate(&result.model, val, 8, &Default::default()).unwrap();
        assert!((eval.loss - result.state.best_val_loss).abs() < 1e-4);
    }

    #[test]
    fn test_missing_labels_rejected() {
        let mut data = separable(10);
        data[3].target = None;
        let trainer = Trainer::<TestBackend>::new(
            TrainingConfig::quick_test(),
            small_model(),
            Default::default(),
        );
        assert!(trainer.train(&data[..8], &data[8..], &ClassWeights::uniform()).is_err());
    }

    #[test]
    fn test_evaluation_predictions_threshold() {
        let eval = Evaluation {
            loss: 0.0,
            accuracy: 0.0,
            probabilities: vec![0.2, 0.5, 0.51, 0.9],
        };
        assert_eq!(eval.predictions(), vec![0, 0, 1, 1]);
    }
}
