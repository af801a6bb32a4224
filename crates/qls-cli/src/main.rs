//! CLI for QLS: score density matrices, predict from parameters, recalibrate,
//! train, serve, and explore in a terminal dashboard.

mod commands;
mod tui;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qls")]
#[command(about = "qls: Quantum Life Score scoring, prediction and calibration")]
#[command(version = qls_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a .npz/.npy file of density matrices
    Score {
        /// Path to the .npz archive or .npy array
        file: String,

        /// Service config JSON (score range, half-width)
        #[arg(long)]
        config: Option<String>,

        /// Lower end of the raw score range
        #[arg(long)]
        score_min: Option<f64>,

        /// Upper end of the raw score range
        #[arg(long)]
        score_max: Option<f64>,

        /// Fixed interval half-width
        #[arg(long)]
        half_width: Option<f64>,

        /// Include the unnormalized score
        #[arg(long)]
        debug: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict QLS from physical parameters
    Predict {
        /// Network topology (line, ring, smallworld, ...)
        #[arg(long)]
        topology: String,

        /// Coupling strength J
        #[arg(long = "j")]
        j: f64,

        /// Dephasing rate
        #[arg(long)]
        gamma: f64,

        /// Static disorder
        #[arg(long)]
        sigma: f64,

        /// Recalibrate the interval from this reference CSV first
        #[arg(long)]
        reference: Option<String>,

        #[command(flatten)]
        model: ModelArgs,

        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute a recalibrated half-width from a reference CSV.
    /// Nothing on disk is modified.
    Recalibrate {
        /// CSV with topology,J,gamma,sigma and optionally QLS
        csv: String,

        #[command(flatten)]
        model: ModelArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Train model.json and metadata.json from a labeled CSV
    Train {
        /// CSV with topology,J,gamma,sigma,QLS
        #[arg(long)]
        csv: String,

        /// Output directory (default: current directory)
        #[arg(long, default_value = ".")]
        out_dir: String,

        /// Boosting rounds
        #[arg(long, default_value = "300")]
        rounds: usize,

        /// Maximum tree depth
        #[arg(long, default_value = "5")]
        max_depth: usize,

        /// Shrinkage per round
        #[arg(long, default_value = "0.06")]
        learning_rate: f64,

        /// Fraction of rows held out to compute the stored half-width
        #[arg(long, default_value = "0.2")]
        holdout: f64,

        /// Shuffle seed for the holdout split
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Run an HTTP server for scoring and prediction
    Server {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,

        #[command(flatten)]
        model: ModelArgs,

        /// Train from this CSV when the model files are missing
        #[arg(long)]
        train_from: Option<String>,

        /// Serve /compute-qls only; no model is loaded
        #[arg(long)]
        scoring_only: bool,
    },

    /// Interactive prediction dashboard (TUI)
    Dashboard {
        #[command(flatten)]
        model: ModelArgs,

        /// Train from this CSV when the model files are missing
        #[arg(long)]
        train_from: Option<String>,
    },
}

/// Where to find the trained artifacts.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Service config JSON
    #[arg(long)]
    config: Option<String>,

    /// Trained pipeline artifact (default: model.json)
    #[arg(long)]
    model: Option<String>,

    /// Calibration metadata (default: metadata.json)
    #[arg(long)]
    metadata: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Score {
            file,
            config,
            score_min,
            score_max,
            half_width,
            debug,
            json,
        } => commands::score::run(commands::score::ScoreCommandConfig {
            file: &file,
            config_path: config.as_deref(),
            score_min,
            score_max,
            half_width,
            debug,
            json,
        }),
        Commands::Predict {
            topology,
            j,
            gamma,
            sigma,
            reference,
            model,
            json,
        } => commands::predict::run(
            qls_core::ParameterRecord::new(topology, j, gamma, sigma),
            reference.as_deref(),
            &model,
            json,
        ),
        Commands::Recalibrate { csv, model, json } => {
            commands::recalibrate::run(&csv, &model, json)
        }
        Commands::Train {
            csv,
            out_dir,
            rounds,
            max_depth,
            learning_rate,
            holdout,
            seed,
        } => commands::train::run(commands::train::TrainCommandConfig {
            csv: &csv,
            out_dir: &out_dir,
            rounds,
            max_depth,
            learning_rate,
            holdout,
            seed,
        }),
        Commands::Server {
            host,
            port,
            model,
            train_from,
            scoring_only,
        } => commands::server::run(&host, port, &model, train_from.as_deref(), scoring_only),
        Commands::Dashboard { model, train_from } => {
            commands::dashboard::run(&model, train_from.as_deref())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
