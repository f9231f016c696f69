//! End-to-end training run: CSV in, artifact directory out

use crate::data::feature_engineering::FeatureSchema;
use crate::data::loader::{DataLoader, LoaderConfig};
use crate::data::preprocessing::{stratified_split, validation_split, ClassWeights, StandardScaler};
use crate::data::SplitConfig;
use crate::model::checkpoint::{ArtifactStore, ModelMetadata, HISTORY_FILE};
use crate::model::metrics::EvaluationReport;
use crate::model::ModelConfig;
use crate::training::plots::{plot_confusion_matrix, plot_training_history, CONFUSION_PLOT, HISTORY_PLOT};
use crate::training::trainer::{evaluate, Trainer};
use crate::training::{PipelineSummary, TrainingConfig};
use crate::utils::format_duration;
use crate::TrainingBackend;
use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use std::path::PathBuf;
use tracing::{info, warn};

/// Inputs of a training run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Labeled CSV/TSV (optionally gzipped)
    pub data_path: PathBuf,
    /// Where artifacts are written
    pub artifact_dir: PathBuf,
    pub loader: LoaderConfig,
    pub training: TrainingConfig,
    /// Hidden layer sizes, dropout and regularization; input size is set from the data
    pub model: ModelConfig,
    /// Render SVG plots
    pub plots: bool,
    /// Draw the epoch progress bar
    pub show_progress: bool,
}

impl PipelineOptions {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(data_path: P, artifact_dir: Q) -> Self {
        Self {
            data_path: data_path.into(),
            artifact_dir: artifact_dir.into(),
            loader: LoaderConfig::default(),
            training: TrainingConfig::default(),
            model: ModelConfig::diabetes_default(),
            plots: true,
            show_progress: true,
        }
    }
}

/// Run the full training pipeline and persist every artifact inference needs
pub fn run_training(options: &PipelineOptions) -> Result<PipelineSummary> {
    let config = &options.training;
    config.validate().context("Invalid training configuration")?;

    info!("Loading data from {:?}", options.data_path);
    let raw = DataLoader::with_config(options.loader.clone())
        .load(&options.data_path)
        .with_context(|| format!("Failed to load data from {:?}", options.data_path))?;

    let schema = FeatureSchema::fit(&raw)?;
    let table = schema.encode(&raw, true)?;
    info!(
        "Encoded {} rows with {} features: {:?}",
        table.len(),
        table.num_features(),
        schema.feature_names()
    );

    let split = SplitConfig {
        test_size: config.test_size,
        seed: config.seed,
    };
    let mut dataset = stratified_split(table, &split)?;
    info!(
        "{} samples ({} diabetic), {} features",
        dataset.total_samples(),
        dataset.positive_count(),
        dataset.num_features()
    );

    let scaler = StandardScaler::fit_transform(&mut dataset.train)?;
    scaler.transform(&mut dataset.test)?;

    let train_labels: Vec<u8> = dataset.train.iter().filter_map(|r| r.target).collect();
    let class_weights = if config.class_weighting {
        ClassWeights::balanced(&train_labels)?
    } else {
        ClassWeights::uniform()
    };

    let (fit_rows, val_rows) = validation_split(&dataset.train, config.validation_split);
    let model_config = options.model.clone().with_input_size(dataset.num_features());

    let store = ArtifactStore::create(&options.artifact_dir)?;
    let device = <TrainingBackend as Backend>::Device::default();
    let trainer = Trainer::<TrainingBackend>::new(config.clone(), model_config.clone(), device.clone())
        .with_history_file(store.path(HISTORY_FILE))
        .with_progress(options.show_progress);
    let result = trainer.train(fit_rows, val_rows, &class_weights)?;
    info!(
        "Trained {} epochs in {}; best epoch {} with val_loss {:.4}",
        result.state.epoch,
        format_duration(result.duration_secs),
        result.state.best_epoch,
        result.state.best_val_loss
    );

    let test_eval = evaluate(&result.model, &dataset.test, config.batch_size, &device)?;
    let test_labels: Vec<u8> = dataset.test.iter().filter_map(|r| r.target).collect();
    let test_report =
        EvaluationReport::from_labels(&test_eval.predictions(), &test_labels, Some(test_eval.loss));
    test_report.print();

    if options.plots {
        if let Err(e) = plot_training_history(&result.state.history, &store.path(HISTORY_PLOT)) {
            warn!("Failed to render training history plot: {}", e);
        }
        if let Err(e) = plot_confusion_matrix(&test_report.confusion_matrix, &store.path(CONFUSION_PLOT)) {
            warn!("Failed to render confusion matrix plot: {}", e);
        }
    }

    let mut metadata = ModelMetadata::new(model_config, config.clone());
    metadata.epochs_trained = result.state.epoch;
    metadata.best_epoch = result.state.best_epoch;
    metadata.best_val_loss = Some(result.state.best_val_loss).filter(|l| l.is_finite());
    metadata.stopped_early = result.state.stopped_early;
    metadata.test_metrics = Some(test_report.clone());

    store.save_model(&result.model, &metadata)?;
    store.save_scaler(&scaler)?;
    store.save_feature_names(schema.feature_names())?;
    store.save_history(&result.state.history)?;
    info!("Artifacts written to {:?}", store.dir());

    Ok(PipelineSummary {
        state: result.state,
        test_report,
        artifact_dir: store.dir().to_path_buf(),
        duration_secs: result.duration_secs,
    })
}
