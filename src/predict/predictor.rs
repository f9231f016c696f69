use crate::data::feature_engineering::FeatureSchema;
use crate::data::loader::{DataLoader, RawTable};
use crate::data::preprocessing::StandardScaler;
use crate::model::architecture::DiabetesNet;
use crate::model::checkpoint::{ArtifactStore, ModelMetadata};
use crate::model::metrics::EvaluationReport;
use crate::predict::{BatchPredictionResult, Prediction, RowPrediction};
use crate::DefaultBackend;
use anyhow::{bail, Context, Result};
use burn::prelude::*;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from a single prediction
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Expected {expected} features, got {got}")]
    FeatureCount { expected: usize, got: usize },

    #[error("Feature {index} ({name}) is not a finite number")]
    NonFinite { index: usize, name: String },

    #[error("{0}")]
    Inference(String),
}

impl PredictError {
    /// Caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::FeatureCount { .. } | Self::NonFinite { .. })
    }
}

/// Prediction context built once from an artifact directory
///
/// Holds the trained network, the fitted scaler and the ordered feature
/// names. Shared read-only across threads; the model sits behind a mutex.
pub struct Predictor<B: Backend = DefaultBackend> {
    model: Mutex<DiabetesNet<B>>,
    scaler: StandardScaler,
    schema: FeatureSchema,
    metadata: ModelMetadata,
    device: B::Device,
    batch_size: usize,
}

impl<B: Backend> Predictor<B> {
    /// Load model, scaler and feature names from `dir`
    pub fn from_artifacts<P: AsRef<Path>>(dir: P, device: B::Device) -> Result<Self> {
        let store = ArtifactStore::open(dir.as_ref())?;
        let (model, metadata) = store.load_model::<B>(&device)?;
        let scaler = store.load_scaler()?;
        let feature_names = store.load_feature_names()?;

        let expected = metadata.model_config.input_size;
        if feature_names.len() != expected || scaler.num_features() != expected {
            bail!(
                "Inconsistent artifacts in {:?}: model expects {} features, feature list has {}, scaler has {}",
                store.dir(),
                expected,
                feature_names.len(),
                scaler.num_features()
            );
        }
        info!("Predictor ready with features {:?}", feature_names);

        Ok(Self {
            model: Mutex::new(model),
            scaler,
            schema: FeatureSchema::from_feature_names(feature_names),
            metadata,
            device,
            batch_size: 256,
        })
    }

    /// Set batch size used for file predictions
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn feature_names(&self) -> &[String] {
        self.schema.feature_names()
    }

    pub fn num_features(&self) -> usize {
        self.schema.len()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Predict from one raw (unscaled) feature vector in persisted order
    pub fn predict(&self, features: &[f64]) -> Result<Prediction, PredictError> {
        let expected = self.num_features();
        if features.len() != expected {
            return Err(PredictError::FeatureCount {
                expected,
                got: features.len(),
            });
        }
        // Values beyond the f32 range become infinite here
        let row: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        if let Some(index) = row.iter().position(|v| !v.is_finite()) {
            return Err(PredictError::NonFinite {
                index,
                name: self.feature_names()[index].clone(),
            });
        }

        let probabilities = self.probabilities(&[row])?;
        let probability = probabilities
            .first()
            .copied()
            .ok_or_else(|| PredictError::Inference("Model returned no output".to_string()))?;

        let prediction = Prediction::from_probability(probability as f64);
        debug!(
            "Predicted {} (p={:.4}, risk {})",
            prediction.prediction, prediction.probability, prediction.risk
        );
        Ok(prediction)
    }

    /// Scale rows and run them through the network
    fn probabilities(&self, rows: &[Vec<f32>]) -> Result<Vec<f32>, PredictError> {
        let n = rows.len();
        let d = self.num_features();
        let mut flat = Vec::with_capacity(n * d);
        for row in rows {
            let scaled = self
                .scaler
                .transform_row(row)
                .map_err(|e| PredictError::Inference(e.to_string()))?;
            flat.extend(scaled);
        }

        let input = Tensor::<B, 2>::from_data(TensorData::new(flat, [n, d]), &self.device);
        let model = self
            .model
            .lock()
            .map_err(|_| PredictError::Inference("Model lock poisoned".to_string()))?;
        let probabilities = model
            .predict_proba(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PredictError::Inference(format!("Failed to read model output: {:?}", e)))?;

        if let Some(row) = probabilities.iter().position(|p| !p.is_finite()) {
            return Err(PredictError::Inference(format!(
                "Model produced a non-finite probability for row {}",
                row
            )));
        }
        Ok(probabilities)
    }

    /// Predict every row of a parsed table
    ///
    /// Columns are matched to the persisted feature names; a `CLASS` column,
    /// if present, is carried through as the actual label.
    pub fn predict_table(&self, raw: &RawTable) -> Result<BatchPredictionResult> {
        let table = self.schema.encode(raw, false)?;
        let mut predictions = Vec::with_capacity(table.len());

        for (chunk_idx, chunk) in table.records.chunks(self.batch_size).enumerate() {
            let rows: Vec<Vec<f32>> = chunk.iter().map(|r| r.features.clone()).collect();
            let probabilities = self.probabilities(&rows)?;

            for (offset, (record, p)) in chunk.iter().zip(probabilities).enumerate() {
                predictions.push(RowPrediction {
                    row: chunk_idx * self.batch_size + offset,
                    prediction: Prediction::from_probability(p as f64),
                    actual: record.target,
                });
            }
        }

        info!("Predicted {} rows", predictions.len());
        Ok(BatchPredictionResult::new(predictions))
    }

    /// Load a CSV/TSV file and predict every row
    pub fn predict_from_file<P: AsRef<Path>>(&self, path: P) -> Result<BatchPredictionResult> {
        let path = path.as_ref();
        let raw = DataLoader::new()
            .load(path)
            .with_context(|| format!("Failed to load {:?}", path))?;
        self.predict_table(&raw)
    }

    /// Score a labeled file: log loss, accuracy, F1 and the full report
    pub fn evaluate_file<P: AsRef<Path>>(&self, path: P) -> Result<EvaluationReport> {
        let batch = self.predict_from_file(path)?;
        let Some(actual) = batch.actual_classes() else {
            bail!("Evaluation needs a label in every row");
        };
        let probabilities: Vec<f64> = batch
            .predictions
            .iter()
            .map(|p| p.prediction.probability)
            .collect();

        Ok(EvaluationReport::from_labels(
            &batch.predicted_classes(),
            &actual,
            Some(log_loss(&probabilities, &actual)),
        ))
    }
}

/// Mean binary cross-entropy of probabilities, clipped away from 0 and 1
pub fn log_loss(probabilities: &[f64], labels: &[u8]) -> f64 {
    const EPS: f64 = 1e-7;
    if probabilities.is_empty() {
        return 0.0;
    }
    let total: f64 = probabilities
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / probabilities.len() as f64
}

/// Writers for batch results
pub mod utils {
    use crate::predict::BatchPredictionResult;
    use anyhow::{Context, Result};
    use std::path::Path;

    pub fn save_predictions_to_csv<P: AsRef<Path>>(
        result: &BatchPredictionResult,
        path: P,
    ) -> Result<()> {
        std::fs::write(path.as_ref(), result.to_csv())
            .with_context(|| format!("Failed to write predictions to {:?}", path.as_ref()))
    }

    pub fn save_predictions_to_json<P: AsRef<Path>>(
        result: &BatchPredictionResult,
        path: P,
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(result).context("Failed to serialize predictions")?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write predictions to {:?}", path.as_ref()))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{sample_features, write_artifacts};
    use super::*;
    use crate::predict::{DiabetesLabel, RiskTier};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn predictor(dir: &TempDir) -> Predictor {
        write_artifacts(dir.path());
        Predictor::from_artifacts(dir.path(), Default::default()).unwrap()
    }

    #[test]
    fn test_predict_probability_and_labels() {
        let dir = TempDir::new().unwrap();
        let predictor = predictor(&dir);

        let prediction = predictor.predict(&sample_features()).unwrap();
        assert!((0.0..=1.0).contains(&prediction.probability));
        assert_eq!(
            prediction.prediction,
            DiabetesLabel::from_probability(prediction.probability)
        );
        assert_eq!(prediction.risk, RiskTier::from_probability(prediction.probability));
    }

    #[test]
    fn test_predict_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let predictor = predictor(&dir);

        let a = predictor.predict(&sample_features()).unwrap();
        let b = predictor.predict(&sample_features()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_feature_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let predictor = predictor(&dir);

        let err = predictor.predict(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Expected 10 features, got 3");

        let err = predictor.predict(&[]).unwrap_err();
        assert_eq!(err.to_string(), "Expected 10 features, got 0");
    }

    #[test]
    fn test_non_finite_feature_rejected() {
        let dir = TempDir::new().unwrap();
        let predictor = predictor(&dir);

        let mut features = sample_features();
        features[3] = f64::NAN;
        let err = predictor.predict(&features).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("HbA1c"));
    }

    #[test]
    fn test_out_of_f32_range_feature_rejected() {
        let dir = TempDir::new().unwrap();
        let predictor = predictor(&dir);

        let mut features = sample_features();
        features[0] = 1e300;
        features[1] = -1e300;
        let err = predictor.predict(&features).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("AGE"));

        features[0] = 1.0e20;
        features[1] = 4.7;
        let prediction = predictor.predict(&features).unwrap();
        assert!((0.0..=1.0).contains(&prediction.probability));
        assert_eq!(prediction.risk, RiskTier::from_probability(prediction.probability));
    }

    #[test]
    fn test_non_finite_output_is_inference_error() {
        let dir = TempDir::new().unwrap();
        write_artifacts(dir.path());

        // A degenerate scale pushes standardized inputs to infinity
        let store = ArtifactStore::open(dir.path()).unwrap();
        let mut scaler = store.load_scaler().unwrap();
        scaler.scale[0] = 1e-300;
        scaler.scale[1] = 1e-300;
        store.save_scaler(&scaler).unwrap();

        let predictor: Predictor = Predictor::from_artifacts(dir.path(), Default::default()).unwrap();
        let err = predictor.predict(&sample_features()).unwrap_err();
        assert!(matches!(err, PredictError::Inference(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_scaler_is_applied() {
        let dir = TempDir::new().unwrap();
        let predictor = predictor(&dir);

        let store = ArtifactStore::open(dir.path()).unwrap();
        let scaler = store.load_scaler().unwrap();
        let (model, _) = store.load_model::<DefaultBackend>(&Default::default()).unwrap();

        let raw: Vec<f32> = sample_features().iter().map(|&v| v as f32).collect();
        let scaled = scaler.transform_row(&raw).unwrap();
        let input = Tensor::<DefaultBackend, 2>::from_data(TensorData::new(scaled, [1, 10]), &Default::default());
        let expected: Vec<f32> = model.predict_proba(input).into_data().to_vec().unwrap();

        let prediction = predictor.predict(&sample_features()).unwrap();
        assert!((prediction.probability - expected[0] as f64).abs() < 1e-6);
    }

    #[test]
    fn test_predict_table_by_column_name() {
        let dir = TempDir::new().unwrap();
        let predictor = predictor(&dir);

        // Column order differs from the persisted feature order
        let csv = "ID,Gender,AGE,Urea,Cr,HbA1c,Chol,TG,HDL,BMI,CLASS\n\
                   1,F,50,4.7,46,4.9,4.2,0.9,2.4,24,N\n\
                   2,M,60,5.0,60,8.1,5.0,2.0,1.0,31,Y\n";
        let raw = DataLoader::new()
            .parse_records(Cursor::new(csv), crate::data::loader::FileFormat::Csv)
            .unwrap();
        let result = predictor.predict_table(&raw).unwrap();

        assert_eq!(result.predictions.len(), 2);
        assert_eq!(result.actual_classes(), Some(vec![0, 1]));

        let direct = predictor.predict(&sample_features()).unwrap();
        assert!((result.predictions[0].prediction.probability - direct.probability).abs() < 1e-6);
    }

    #[test]
    fn test_inconsistent_artifacts_rejected() {
        let dir = TempDir::new().unwrap();
        write_artifacts(dir.path());
        ArtifactStore::open(dir.path())
            .unwrap()
            .save_feature_names(&["AGE".to_string()])
            .unwrap();

        assert!(Predictor::<DefaultBackend>::from_artifacts(dir.path(), Default::default()).is_err());
    }

    #[test]
    fn test_log_loss() {
        let loss = log_loss(&[0.5, 0.5], &[1, 0]);
        assert!((loss - 2.0f64.ln()).abs() < 1e-12);
        assert!(log_loss(&[1.0], &[0]).is_finite());
    }
}
