use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use crate::data::preprocessing::StandardScaler;
use crate::model::architecture::{init_model, DiabetesNet};
use crate::model::metrics::EvaluationReport;
use crate::model::ModelConfig;
use crate::training::{EpochMetrics, TrainingConfig};
use crate::utils::ensure_dir;

/// Model weights, without extension; the recorder appends `.mpk`
pub const MODEL_STEM: &str = "model";
/// Run metadata
pub const METADATA_FILE: &str = "model.json";
/// Fitted standardization parameters
pub const SCALER_FILE: &str = "scaler.json";
/// Ordered input feature names
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
/// Per-epoch training history
pub const HISTORY_FILE: &str = "history.json";

/// Metadata saved next to the weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Crate version that produced the artifacts
    pub version: String,
    /// Epochs actually run
    pub epochs_trained: usize,
    /// Epoch whose weights were kept
    pub best_epoch: usize,
    /// Validation loss at `best_epoch`
    pub best_val_loss: Option<f64>,
    /// Whether early stopping ended the run
    pub stopped_early: bool,
    /// Network topology needed to rebuild the model
    pub model_config: ModelConfig,
    /// Hyperparameters of the run
    pub training_config: TrainingConfig,
    /// Held-out test results
    pub test_metrics: Option<EvaluationReport>,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ModelMetadata {
    pub fn new(model_config: ModelConfig, training_config: TrainingConfig) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            epochs_trained: 0,
            best_epoch: 0,
            best_val_loss: None,
            stopped_early: false,
            model_config,
            training_config,
            test_metrics: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Directory holding everything inference needs
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Create the directory if needed
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    /// Open an existing directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            bail!("Artifact directory not found: {:?}", dir);
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(format!("{}.mpk", MODEL_STEM))
    }

    /// Save weights and metadata
    pub fn save_model<B: Backend>(
        &self,
        model: &DiabetesNet<B>,
        metadata: &ModelMetadata,
    ) -> Result<PathBuf> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(self.dir.join(MODEL_STEM), &recorder)
            .map_err(|e| anyhow!("Failed to save model weights: {}", e))?;

        write_json(&self.path(METADATA_FILE), metadata)?;
        info!("Saved model to {:?}", self.model_path());
        Ok(self.model_path())
    }

    /// Rebuild the network from metadata and load its weights
    pub fn load_model<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(DiabetesNet<B>, ModelMetadata)> {
        let metadata: ModelMetadata = read_json(&self.path(METADATA_FILE))?;
        let model_path = self.model_path();
        if !model_path.is_file() {
            bail!("Model weights not found: {:?}", model_path);
        }

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = init_model::<B>(&metadata.model_config, device)
            .load_file(self.dir.join(MODEL_STEM), &recorder, device)
            .map_err(|e| anyhow!("Failed to load model weights: {}", e))?;

        info!(
            "Loaded model from {:?} (best epoch {}, {} inputs)",
            model_path, metadata.best_epoch, metadata.model_config.input_size
        );
        Ok((model, metadata))
    }

    pub fn save_scaler(&self, scaler: &StandardScaler) -> Result<()> {
        scaler.save(self.path(SCALER_FILE))
    }

    pub fn load_scaler(&self) -> Result<StandardScaler> {
        StandardScaler::load(self.path(SCALER_FILE))
    }

    pub fn save_feature_names(&self, names: &[String]) -> Result<()> {
        write_json(&self.path(FEATURE_NAMES_FILE), &names)
    }

    pub fn load_feature_names(&self) -> Result<Vec<String>> {
        read_json(&self.path(FEATURE_NAMES_FILE))
    }

    pub fn save_history(&self, history: &[EpochMetrics]) -> Result<()> {
        write_json(&self.path(HISTORY_FILE), &history)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {:?}", path))?;
    fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_model_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::create(temp_dir.path()).unwrap();

        let device = <TestBackend as Backend>::Device::default();
        let config = ModelConfig::diabetes_default();
        let model = init_model::<TestBackend>(&config, &device);

        let mut metadata = ModelMetadata::new(config, TrainingConfig::default());
        metadata.best_epoch = 7;
        let path = store.save_model(&model, &metadata).unwrap();
        assert!(path.exists());

        let (loaded, loaded_metadata) = store.load_model::<TestBackend>(&device).unwrap();
        assert_eq!(loaded_metadata.best_epoch, 7);

        let input = Tensor::<TestBackend, 2>::ones([1, 10], &device);
        let before: Vec<f32> = model.predict_proba(input.clone()).into_data().to_vec().unwrap();
        let after: Vec<f32> = loaded.predict_proba(input).into_data().to_vec().unwrap();
        assert!((before[0] - after[0]).abs() < 1e-6);
    }

    #[test]
    fn test_feature_names_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::create(temp_dir.path()).unwrap();

        let names = vec!["AGE".to_string(), "Gender_F".to_string()];
        store.save_feature_names(&names).unwrap();
        assert_eq!(store.load_feature_names().unwrap(), names);
    }

    #[test]
    fn test_history_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::create(temp_dir.path().join("nested/run")).unwrap();

        let history = vec![
            EpochMetrics { epoch: 1, loss: 0.9, val_loss: 0.8, ..Default::default() },
            EpochMetrics { epoch: 2, loss: 0.7, val_loss: 0.75, ..Default::default() },
        ];
        store.save_history(&history).unwrap();
        let saved: Vec<EpochMetrics> = read_json(&store.path(HISTORY_FILE)).unwrap();
        assert_eq!(saved, history);
    }

    #[test]
    fn test_open_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ArtifactStore::open(temp_dir.path().join("nope")).is_err());

        let store = ArtifactStore::open(temp_dir.path()).unwrap();
        assert!(store.load_model::<TestBackend>(&Default::default()).is_err());
    }
}
