//! # diabrisk: Diabetes Risk Classifier
//!
//! diabrisk trains a small feed-forward network that classifies patients as
//! diabetic or non-diabetic from routine clinical measurements, and serves the
//! trained model over HTTP.
//!
//! ## Features
//!
//! - CSV/TSV loading (optionally gzipped) with one-hot gender encoding
//! - Stratified train/test split and standardization fitted on training rows only
//! - Class-weighted training with early stopping and learning-rate reduction
//! - Self-describing artifact directory (weights, scaler, feature order, history)
//! - `POST /predict` returning a label, probability and risk tier
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use diabrisk::training::pipeline::{run_training, PipelineOptions};
//! use diabrisk::Predictor;
//!
//! // Train and write artifacts
//! let options = PipelineOptions::new("Cleaned_Diabetes_Dataset.csv", "artifacts");
//! let summary = run_training(&options).unwrap();
//! println!("test accuracy: {:.3}", summary.test_report.accuracy);
//!
//! // Reload and predict
//! let predictor: Predictor = Predictor::from_artifacts("artifacts", Default::default()).unwrap();
//! let features = vec![50.0, 4.7, 46.0, 4.9, 4.2, 0.9, 2.4, 24.0, 1.0, 0.0];
//! let prediction = predictor.predict(&features).unwrap();
//! println!("{} ({:.3}, {} risk)", prediction.prediction, prediction.probability, prediction.risk);
//! ```

pub mod cli;
pub mod data;
pub mod model;
pub mod predict;
pub mod server;
pub mod training;
pub mod utils;

use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Backend used while training
pub type TrainingBackend = burn::backend::Autodiff<DefaultBackend>;

/// Re-export commonly used types
pub use data::loader::DataLoader;
pub use data::{Dataset, PatientRecord};
pub use model::{architecture::DiabetesNet, ModelConfig};
pub use predict::predictor::Predictor;
pub use predict::{BatchPredictionResult, Prediction};
pub use training::{TrainingConfig, TrainingResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{} - diabetes risk classifier", NAME, VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info() {
        let info = info();
        assert!(info.contains(NAME));
        assert!(info.contains(VERSION));
    }
}
