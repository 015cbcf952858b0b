//! MRI Cross-Validation CLI
//!
//! Entry point for cross-validated training of the binary MS/NON-MS MRI
//! classifier with the Burn framework.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use mri_crossval::backend::{backend_name, default_device, TrainingBackend};
use mri_crossval::training::{
    prepare_folds, run_cross_validation, FanoutSink, JsonlMetricSink, TracingSink,
};
use mri_crossval::utils::logging::{init_logging, LogConfig};
use mri_crossval::{CrossValidationConfig, LocalBlobStore, VitImageProcessor};

/// Cross-validated MS vs. NON-MS MRI classification
#[derive(Parser, Debug)]
#[command(name = "mri_crossval")]
#[command(version)]
#[command(about = "Stratified k-fold training of a ViT-based binary MRI classifier", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run k-fold cross-validation and save the final model
    Train {
        /// TOML configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root directory holding the class folders
        #[arg(short, long)]
        data_root: Option<PathBuf>,

        /// Number of folds
        #[arg(long)]
        folds: Option<usize>,

        /// Maximum epochs per fold
        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Directory for the model artifact and report
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Pretrained backbone record (burn full-precision .bin)
        #[arg(long)]
        pretrained: Option<PathBuf>,

        /// Append every logged scalar to this JSON-lines file
        #[arg(long)]
        metrics_file: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,

        /// Hide progress bars
        #[arg(long, default_value = "false")]
        no_progress: bool,
    },

    /// Show class counts before and after balancing, and fold sizes
    Stats {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        data_root: Option<PathBuf>,
    },

    /// Write the default configuration as TOML
    InitConfig {
        #[arg(short, long, default_value = "crossval.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train {
            config,
            data_root,
            folds,
            epochs,
            batch_size,
            learning_rate,
            output_dir,
            pretrained,
            metrics_file,
            seed,
            no_progress,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(root) = data_root {
                config.data.root = root;
            }
            if let Some(folds) = folds {
                config.training.n_folds = folds;
            }
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = batch_size;
            }
            if let Some(lr) = learning_rate {
                config.training.learning_rate = lr;
            }
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            if pretrained.is_some() {
                config.model.pretrained = pretrained;
            }
            if metrics_file.is_some() {
                config.output.metrics_file = metrics_file;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if no_progress {
                config.output.progress = false;
            }
            cmd_train(&config)?;
        }

        Commands::Stats { config, data_root } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(root) = data_root {
                config.data.root = root;
            }
            cmd_stats(&config)?;
        }

        Commands::InitConfig { output } => {
            CrossValidationConfig::default()
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("{} {}", "Wrote default configuration to".green(), output.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<CrossValidationConfig> {
    match path {
        Some(path) => CrossValidationConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(CrossValidationConfig::default()),
    }
}

fn print_banner() {
    println!();
    println!("{}", "MRI Cross-Validation".green().bold());
    println!("  ViT backbone + binary head, stratified k-fold, Burn + Rust");
    println!("  Backend: {}", backend_name());
    println!();
}

fn cmd_train(config: &CrossValidationConfig) -> Result<()> {
    print_banner();

    let params = &config.training;
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Data root:        {}", config.data.root.display());
    println!("  Folds:            {}", params.n_folds);
    println!("  Epochs per fold:  {}", params.epochs);
    println!("  Batch size:       {}", params.batch_size);
    println!("  Learning rate:    {}", params.learning_rate);
    println!("  Weight decay:     {}", params.weight_decay);
    println!("  Patience:         {}", params.patience);
    println!("  Image size:       {}", config.data.image_size);
    println!("  Seed:             {}", config.seed);
    println!();

    let store = Arc::new(LocalBlobStore::new(&config.data.root));
    let processor = Arc::new(VitImageProcessor::new(config.data.image_size));

    let mut sink = FanoutSink::new().with(Box::new(TracingSink));
    if let Some(path) = &config.output.metrics_file {
        let jsonl = JsonlMetricSink::create(path)
            .with_context(|| format!("opening metrics file {}", path.display()))?;
        sink = sink.with(Box::new(jsonl));
    }

    let device = default_device();
    info!("Using device {:?}", device);

    let outcome =
        run_cross_validation::<TrainingBackend>(config, store, processor, &sink, &device)?;

    println!();
    println!("{}", "Cross-Validation Results:".cyan().bold());
    for fold in &outcome.report.folds {
        println!(
            "  Fold {}: accuracy {:.4} | F1 {:.4} | {} validation samples",
            fold.fold, fold.accuracy, fold.weighted_f1, fold.validation_size
        );
    }
    println!(
        "  {} accuracy {:.4} | F1 {:.4}",
        "Average:".bold(),
        outcome.report.mean_accuracy,
        outcome.report.mean_f1
    );
    for class in &outcome.report.per_class {
        println!(
            "  {:<8} precision {:.4} | recall {:.4} | f1-score {:.4}",
            class.class_name, class.precision, class.recall, class.f1
        );
    }
    println!();
    println!("  Model saved to: {}", outcome.artifact.display());
    if let Some(report) = &outcome.report_path {
        println!("  Report saved to: {}", report.display());
    }
    println!("{}", "Training Complete!".green().bold());

    Ok(())
}

fn cmd_stats(config: &CrossValidationConfig) -> Result<()> {
    let store = Arc::new(LocalBlobStore::new(&config.data.root));
    let prepared = prepare_folds(config, store)?;

    prepared.dataset.summary().print();
    println!();
    println!("{}", "Folds:".cyan().bold());
    let labels = prepared.dataset.labels();
    for fold in &prepared.folds {
        let positives = fold.validation.iter().filter(|&&i| labels[i] == 1).count();
        println!(
            "  Fold {}: {} train / {} validation ({} {})",
            fold.number(),
            fold.train.len(),
            fold.validation.len(),
            positives,
            prepared.dataset.class_names()[1]
        );
    }

    Ok(())
}
