use crate::data::DEFAULT_DATASET;
use crate::server::DEFAULT_BIND;
use crate::training::TrainingConfig;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// diabrisk: diabetes risk classifier
#[derive(Parser, Debug)]
#[command(name = "diabrisk")]
#[command(about = "Train a diabetes risk classifier and serve its predictions")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a new model and write its artifacts
    Train(TrainArgs),

    /// Serve POST /predict from a trained model
    Serve(ServeArgs),

    /// Make predictions using a trained model
    Predict(PredictArgs),

    /// Evaluate model performance on a labeled file
    Evaluate(EvaluateArgs),
}

/// Training arguments
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Input data file (CSV or TSV, optionally gzipped)
    #[arg(short, long, default_value = DEFAULT_DATASET)]
    pub input: PathBuf,

    /// Output directory for the model artifacts
    #[arg(short, long, default_value = "artifacts")]
    pub output: PathBuf,

    /// Training configuration file (JSON); flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of training epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Held-out test fraction
    #[arg(long)]
    pub test_size: Option<f64>,

    /// Early stopping patience (0 disables)
    #[arg(long)]
    pub patience: Option<usize>,

    /// Column to drop before encoding (repeatable)
    #[arg(long = "drop-column")]
    pub drop_columns: Vec<String>,

    /// Skip the SVG plots
    #[arg(long)]
    pub no_plots: bool,

    /// Quick test mode (fewer epochs); applied on top of --config
    #[arg(long)]
    pub quick: bool,
}

impl TrainArgs {
    /// Config file (or defaults) with command-line overrides applied
    pub fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_file(path)?,
            None => TrainingConfig::default(),
        };
        if self.quick {
            let quick = TrainingConfig::quick_test();
            config.epochs = quick.epochs;
            config.batch_size = quick.batch_size;
            config.learning_rate = quick.learning_rate;
        }

        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(test_size) = self.test_size {
            config.test_size = test_size;
        }
        if let Some(patience) = self.patience {
            config.early_stopping_patience = patience;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Server arguments
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Artifact directory written by `train`
    #[arg(short, long, default_value = "artifacts")]
    pub model: PathBuf,

    /// Listen address
    #[arg(long, default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,
}

/// Output format for batch predictions
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Prediction arguments
#[derive(Parser, Debug)]
pub struct PredictArgs {
    /// Input data file (CSV or TSV)
    #[arg(short, long, required_unless_present = "features")]
    pub input: Option<PathBuf>,

    /// Predict a single comma-separated feature vector instead of a file
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, conflicts_with = "input")]
    pub features: Option<Vec<f64>>,

    /// Artifact directory written by `train`
    #[arg(short, long, default_value = "artifacts")]
    pub model: PathBuf,

    /// Output file for predictions
    #[arg(short, long, default_value = "predictions.csv")]
    pub output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "csv")]
    pub format: OutputFormat,

    /// Batch size for prediction
    #[arg(short, long, default_value = "256")]
    pub batch_size: usize,
}

/// Evaluation arguments
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Input data file with ground truth labels
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Artifact directory written by `train`
    #[arg(short, long, default_value = "artifacts")]
    pub model: PathBuf,

    /// Output file for the evaluation report (JSON)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Batch size for evaluation
    #[arg(short, long, default_value = "256")]
    pub batch_size: usize,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity; `RUST_LOG` takes precedence
pub fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
