//! CLI for assetguard: protection assessment of a monitored asset.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "assetguard")]
#[command(about = "assetguard: how well does a sensor network protect an asset?")]
#[command(version = assetguard_core::VERSION)]
struct Cli {
    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one assessment and print safety and sustainability
    Run {
        /// Assessment configuration (JSON)
        #[arg(long)]
        config: String,

        /// Record series, detection table and metadata under the output folder
        #[arg(long)]
        draw: bool,

        /// Override pipeline.max_retries
        #[arg(long)]
        max_retries: Option<usize>,

        /// Override simulation.seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the output folder
        #[arg(long)]
        output: Option<String>,

        /// Keep solver staging directories after the solve finishes
        #[arg(long)]
        keep_staging: bool,

        /// Print the assessment as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sensitivity sweep over the variables listed in the configuration
    Sweep {
        /// Assessment configuration (JSON) with a "sweep" section
        #[arg(long)]
        config: String,

        /// Sampling mode: mc (Monte-Carlo) or oat (one-at-a-time)
        #[arg(long, default_value = "mc", value_parser = ["mc", "oat"])]
        mode: String,

        /// Configurations (mc) or grid points per variable (oat)
        #[arg(long, default_value = "100")]
        samples: usize,

        /// Results CSV path
        #[arg(long, default_value = "sweep.csv")]
        out: String,

        /// Seed for sampling the sweep variables
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List the registered stochastic-model topologies
    Models,

    /// Validate a configuration and show the topology it selects
    Check {
        /// Assessment configuration (JSON)
        #[arg(long)]
        config: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Run {
            config,
            draw,
            max_retries,
            seed,
            output,
            keep_staging,
            json,
        } => commands::run::run(commands::run::RunCommandConfig {
            config_path: &config,
            draw,
            max_retries,
            seed,
            output: output.as_deref(),
            keep_staging,
            json,
        }),
        Commands::Sweep {
            config,
            mode,
            samples,
            out,
            seed,
        } => commands::sweep::run(&config, &mode, samples, &out, seed),
        Commands::Models => commands::models::run(),
        Commands::Check { config } => commands::check::run(&config),
    }
}
