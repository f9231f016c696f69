pub mod architecture;
pub mod checkpoint;
pub mod loss;
pub mod metrics;

use burn::prelude::*;

/// Model configuration
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Number of input features
    #[config(default = "10")]
    pub input_size: usize,

    /// Number of hidden units in first layer
    #[config(default = "64")]
    pub hidden_size_1: usize,

    /// Number of hidden units in second layer
    #[config(default = "32")]
    pub hidden_size_2: usize,

    /// Dropout rate
    #[config(default = "0.5")]
    pub dropout: f64,

    /// L2 penalty on the hidden-layer kernels
    #[config(default = "1e-2")]
    pub l2: f64,

    /// Use batch normalization
    #[config(default = "true")]
    pub use_batch_norm: bool,

    /// Weight of the current batch in the running statistics update
    #[config(default = "0.01")]
    pub batch_norm_momentum: f64,

    /// Batch normalization epsilon
    #[config(default = "1e-3")]
    pub batch_norm_epsilon: f64,
}

impl ModelConfig {
    /// Network used for diabetes risk prediction
    pub fn diabetes_default() -> Self {
        Self::new()
            .with_hidden_size_1(64)
            .with_hidden_size_2(32)
            .with_dropout(0.5)
            .with_l2(1e-2)
            .with_use_batch_norm(true)
    }
}
