use tracing::info;

/// Learning rate schedulers
#[derive(Debug, Clone)]
pub enum LearningRateScheduler {
    /// Constant learning rate
    Constant { lr: f64 },
    /// Reduce on plateau of a monitored loss
    ReduceOnPlateau {
        lr: f64,
        factor: f64,
        patience: usize,
        min_lr: f64,
        min_delta: f64,
        cooldown: usize,
        cooldown_counter: usize,
        num_bad_epochs: usize,
        best: f64,
    },
}

impl LearningRateScheduler {
    /// Create constant scheduler
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    /// Create reduce on plateau scheduler
    pub fn reduce_on_plateau(lr: f64, factor: f64, patience: usize, min_lr: f64) -> Self {
        Self::ReduceOnPlateau {
            lr,
            factor,
            patience,
            min_lr,
            min_delta: 1e-4,
            cooldown: 0,
            cooldown_counter: 0,
            num_bad_epochs: 0,
            best: f64::INFINITY,
        }
    }

    /// Build from the scheduler name in the training configuration
    pub fn from_config(config: &crate::training::TrainingConfig) -> Self {
        match config.lr_scheduler.as_str() {
            "constant" => Self::constant(config.learning_rate),
            _ => Self::reduce_on_plateau(
                config.learning_rate,
                config.lr_factor,
                config.lr_patience,
                config.min_lr,
            ),
        }
    }

    /// Get current learning rate
    pub fn get_lr(&self) -> f64 {
        match *self {
            Self::Constant { lr } => lr,
            Self::ReduceOnPlateau { lr, .. } => lr,
        }
    }

    /// Feed the epoch's monitored loss (lower is better) and return the
    /// learning rate for the next epoch
    pub fn step_with_metric(&mut self, metric: f64) -> f64 {
        match self {
            Self::ReduceOnPlateau {
                lr,
                factor,
                patience,
                min_lr,
                min_delta,
                cooldown,
                cooldown_counter,
                num_bad_epochs,
                best,
            } => {
                if *cooldown_counter > 0 {
                    *cooldown_counter -= 1;
                    *num_bad_epochs = 0;
                }

                if metric < *best - *min_delta {
                    *best = metric;
                    *num_bad_epochs = 0;
                } else if *cooldown_counter == 0 {
                    *num_bad_epochs += 1;
                    if *num_bad_epochs >= *patience && *lr > *min_lr {
                        let new_lr = (*lr * *factor).max(*min_lr);
                        info!("Reducing learning rate to {:.2e}", new_lr);
                        *lr = new_lr;
                        *cooldown_counter = *cooldown;
                        *num_bad_epochs = 0;
                    }
                }

                *lr
            }
            Self::Constant { lr } => *lr,
        }
    }
}

impl Default for LearningRateScheduler {
    fn default() -> Self {
        Self::constant(0.001)
    }
}
