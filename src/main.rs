use anyhow::{Context, Result};
use diabrisk::cli::{parse_args, setup_logging, Commands, EvaluateArgs, OutputFormat, PredictArgs, ServeArgs, TrainArgs};
use diabrisk::data::loader::LoaderConfig;
use diabrisk::predict::predictor::{utils as predict_utils, Predictor};
use diabrisk::training::pipeline::{run_training, PipelineOptions};
use diabrisk::utils::format_duration;
use std::sync::Arc;
use tracing::{error, info};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", diabrisk::info());

    let result = match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Serve(args) => run_serve(args),
        Commands::Predict(args) => run_predict(args),
        Commands::Evaluate(args) => run_evaluate(args),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_predictor(dir: &std::path::Path, batch_size: usize) -> Result<Predictor> {
    info!("Loading model from {:?}", dir);
    let predictor = Predictor::from_artifacts(dir, Default::default())
        .with_context(|| format!("Failed to load model from {:?}", dir))?;
    Ok(predictor.with_batch_size(batch_size))
}

fn run_train(args: TrainArgs) -> Result<()> {
    info!("Starting training...");
    info!("Input file: {:?}", args.input);
    info!("Output directory: {:?}", args.output);

    let mut options = PipelineOptions::new(&args.input, &args.output);
    options.training = args.training_config()?;
    options.loader = LoaderConfig {
        drop_columns: args.drop_columns.clone(),
        ..LoaderConfig::default()
    };
    options.plots = !args.no_plots;

    let summary = run_training(&options).context("Training failed")?;

    info!("=== Training Results ===");
    info!("Epochs run: {}", summary.state.epoch);
    info!(
        "Best epoch: {} (val_loss {:.4})",
        summary.state.best_epoch, summary.state.best_val_loss
    );
    if summary.state.stopped_early {
        info!("Stopped early");
    }
    info!("Test accuracy: {:.4}", summary.test_report.accuracy);
    info!("Test F1: {:.4}", summary.test_report.f1);
    info!("Training time: {}", format_duration(summary.duration_secs));
    info!("Artifacts: {:?}", summary.artifact_dir);

    Ok(())
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let predictor = load_predictor(&args.model, 256)?;
    info!(
        "Model expects {} features: {:?}",
        predictor.num_features(),
        predictor.feature_names()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(diabrisk::server::serve(Arc::new(predictor), args.bind))
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let predictor = load_predictor(&args.model, args.batch_size)?;

    if let Some(features) = &args.features {
        let prediction = predictor.predict(features)?;
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    let Some(input) = &args.input else {
        anyhow::bail!("Either --input or --features is required");
    };
    info!("Input file: {:?}", input);

    let predictions = predictor
        .predict_from_file(input)
        .context("Prediction failed")?;

    predictions.summary.print();

    match args.format {
        OutputFormat::Csv => predict_utils::save_predictions_to_csv(&predictions, &args.output)?,
        OutputFormat::Json => predict_utils::save_predictions_to_json(&predictions, &args.output)?,
    }

    info!("Predictions saved to: {:?}", args.output);

    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    info!("Input file: {:?}", args.input);

    let predictor = load_predictor(&args.model, args.batch_size)?;

    info!("Running evaluation...");
    let report = predictor
        .evaluate_file(&args.input)
        .context("Evaluation failed")?;

    report.print();

    if let Some(output) = args.output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&output, json)
            .with_context(|| format!("Failed to write {:?}", output))?;
        info!("Evaluation report saved to: {:?}", output);
    }

    Ok(())
}
