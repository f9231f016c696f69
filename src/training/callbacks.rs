use crate::training::{EpochMetrics, TrainingState};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Training callback trait
///
/// Callbacks allow custom actions to be performed at various points during training.
pub trait TrainingCallback: Send + Sync {
    /// Called at the start of training
    fn on_train_begin(&mut self) {}

    /// Called at the end of training
    fn on_train_end(&mut self, _state: &TrainingState) {}

    /// Called at the start of each epoch
    fn on_epoch_begin(&mut self, _epoch: usize) {}

    /// Called at the end of each epoch, after the state has been updated
    fn on_epoch_end(&mut self, _state: &TrainingState, _metrics: &EpochMetrics) {}

    /// Ask the trainer to stop after the current epoch
    fn should_stop(&self) -> bool {
        false
    }
}

/// Callback manager that handles multiple callbacks
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackManager {
    /// Create new callback manager
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a callback
    pub fn add_callback<C: TrainingCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn on_train_begin(&mut self) {
        for callback in &mut self.callbacks {
            callback.on_train_begin();
        }
    }

    pub fn on_train_end(&mut self, state: &TrainingState) {
        for callback in &mut self.callbacks {
            callback.on_train_end(state);
        }
    }

    pub fn on_epoch_begin(&mut self, epoch: usize) {
        for callback in &mut self.callbacks {
            callback.on_epoch_begin(epoch);
        }
    }

    pub fn on_epoch_end(&mut self, state: &TrainingState, metrics: &EpochMetrics) {
        for callback in &mut self.callbacks {
            callback.on_epoch_end(state, metrics);
        }
    }

    /// True if any callback requested a stop
    pub fn should_stop(&self) -> bool {
        self.callbacks.iter().any(|c| c.should_stop())
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Early stopping on validation loss
pub struct EarlyStoppingCallback {
    patience: usize,
    min_delta: f64,
    best: f64,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStoppingCallback {
    /// Stop once `patience` consecutive epochs fail to lower validation loss
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            best: f64::INFINITY,
            wait: 0,
            stopped_epoch: None,
        }
    }

    /// Epoch at which the stop was triggered
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn on_epoch_end(&mut self, _state: &TrainingState, metrics: &EpochMetrics) {
        if metrics.val_loss < self.best - self.min_delta {
            self.best = metrics.val_loss;
            self.wait = 0;
            return;
        }

        self.wait += 1;
        if self.wait >= self.patience && self.stopped_epoch.is_none() {
            tracing::info!(
                "Early stopping at epoch {}: val_loss has not improved for {} epochs",
                metrics.epoch,
                self.wait
            );
            self.stopped_epoch = Some(metrics.epoch);
        }
    }

    fn should_stop(&self) -> bool {
        self.stopped_epoch.is_some()
    }
}

/// Progress logging callback
pub struct ProgressLoggerCallback {
    log_frequency: usize,
    total_epochs: usize,
}

impl ProgressLoggerCallback {
    /// Create new progress logger
    pub fn new(log_frequency: usize, total_epochs: usize) -> Self {
        Self {
            log_frequency: log_frequency.max(1),
            total_epochs,
        }
    }
}

impl TrainingCallback for ProgressLoggerCallback {
    fn on_epoch_end(&mut self, _state: &TrainingState, metrics: &EpochMetrics) {
        if metrics.epoch % self.log_frequency == 0 || metrics.epoch == self.total_epochs {
            tracing::info!(
                "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4} - lr: {:.2e}",
                metrics.epoch,
                self.total_epochs,
                metrics.loss,
                metrics.accuracy,
                metrics.val_loss,
                metrics.val_accuracy,
                metrics.learning_rate
            );
        }
    }
}

/// Writes the history to a JSON file after every epoch
pub struct MetricsLoggerCallback {
    log_file: PathBuf,
    metrics_history: Vec<EpochMetrics>,
}

impl MetricsLoggerCallback {
    /// Create new metrics logger
    pub fn new<P: Into<PathBuf>>(log_file: P) -> Self {
        Self {
            log_file: log_file.into(),
            metrics_history: Vec::new(),
        }
    }

    fn save_metrics(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.metrics_history)?;
        std::fs::write(&self.log_file, json)?;
        Ok(())
    }
}

impl TrainingCallback for MetricsLoggerCallback {
    fn on_epoch_end(&mut self, _state: &TrainingState, metrics: &EpochMetrics) {
        self.metrics_history.push(metrics.clone());

        if let Err(e) = self.save_metrics() {
            tracing::warn!("Failed to save metrics: {}", e);
        }
    }
}

/// Timer callback that tracks training time
pub struct TimerCallback {
    start_time: Option<Instant>,
    epoch_start: Option<Instant>,
    epoch_times: Vec<Duration>,
}

impl TimerCallback {
    /// Create new timer callback
    pub fn new() -> Self {
        Self {
            start_time: None,
            epoch_start: None,
            epoch_times: Vec::new(),
        }
    }

    /// Get average epoch time
    pub fn average_epoch_time(&self) -> Option<Duration> {
        if self.epoch_times.is_empty() {
            None
        } else {
            let total: Duration = self.epoch_times.iter().sum();
            Some(total / self.epoch_times.len() as u32)
        }
    }
}

impl Default for TimerCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingCallback for TimerCallback {
    fn on_train_begin(&mut self) {
        self.start_time = Some(Instant::now());
        tracing::info!("Training started");
    }

    fn on_epoch_begin(&mut self, _epoch: usize) {
        self.epoch_start = Some(Instant::now());
    }

    fn on_epoch_end(&mut self, _state: &TrainingState, metrics: &EpochMetrics) {
        if let Some(start) = self.epoch_start.take() {
            let elapsed = start.elapsed();
            tracing::debug!("Epoch {} took {:.2?}", metrics.epoch, elapsed);
            self.epoch_times.push(elapsed);
        }
    }

    fn on_train_end(&mut self, state: &TrainingState) {
        if let Some(start) = self.start_time {
            tracing::info!(
                "Training completed in {:.2?} ({} epochs, avg {:.2?}/epoch)",
                start.elapsed(),
                state.epoch,
                self.average_epoch_time().unwrap_or_default()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(epoch: usize, val_loss: f64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            val_loss,
            ..Default::default()
        }
    }

    #[test]
    fn test_early_stopping() {
        let mut callback = EarlyStoppingCallback::new(2);
        let state = TrainingState::new();

        callback.on_epoch_end(&state, &epoch(1, 1.0));
        assert!(!callback.should_stop());

        callback.on_epoch_end(&state, &epoch(2, 1.1));
        assert!(!callback.should_stop());

        callback.on_epoch_end(&state, &epoch(3, 1.2));
        assert!(callback.should_stop());
        assert_eq!(callback.stopped_epoch(), Some(3));
    }

    #[test]
    fn test_early_stopping_equal_loss_is_not_improvement() {
        let mut callback = EarlyStoppingCallback::new(1);
        let state = TrainingState::new();

        callback.on_epoch_end(&state, &epoch(1, 0.5));
        callback.on_epoch_end(&state, &epoch(2, 0.5));
        assert!(callback.should_stop());
    }

    #[test]
    fn test_callback_manager() {
        let mut manager = CallbackManager::new();
        manager.add_callback(ProgressLoggerCallback::new(1, 3));
        manager.add_callback(TimerCallback::new());
        manager.add_callback(EarlyStoppingCallback::new(1));

        let state = TrainingState::new();
        manager.on_train_begin();
        manager.on_epoch_begin(0);
        manager.on_epoch_end(&state, &epoch(1, 0.5));
        assert!(!manager.should_stop());

        manager.on_epoch_begin(1);
        manager.on_epoch_end(&state, &epoch(2, 0.6));
        assert!(manager.should_stop());

        manager.on_train_end(&state);
    }

    #[test]
    fn test_metrics_logger_writes_history() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut logger = MetricsLoggerCallback::new(&path);

        let state = TrainingState::new();
        logger.on_epoch_end(&state, &epoch(1, 0.7));
        logger.on_epoch_end(&state, &epoch(2, 0.6));

        let written: Vec<EpochMetrics> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[1].val_loss, 0.6);
    }
}
