//! CLI for benchscope: inspect telemetry devices, preview launch
//! environments, observe a cluster through a benchmark lap and replay
//! recorded metrics.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "benchscope")]
#[command(about = "benchscope - pluggable telemetry for a cluster under benchmark")]
#[command(version = benchscope_core::VERSION)]
struct Cli {
    /// Log filter used when RUST_LOG is not set (e.g. "debug", "benchscope_core=trace")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every built-in telemetry device
    Devices {
        /// Only show optional devices (those enabled by command)
        #[arg(long)]
        optional: bool,
    },

    /// Preview the environment telemetry devices add to a node launch
    Env {
        /// Telemetry configuration (JSON)
        #[arg(long)]
        config: Option<String>,

        /// Node to instrument
        #[arg(long, default_value = "rally0")]
        node: String,

        /// Launch configuration name
        #[arg(long, default_value = "defaults")]
        target: String,
    },

    /// Observe a running cluster for one benchmark lap
    Run {
        /// Telemetry configuration (JSON)
        #[arg(long)]
        config: Option<String>,

        /// Comma-separated optional devices to enable in addition to the config
        #[arg(long)]
        devices: Option<String>,

        /// Lap duration in seconds (default: until Ctrl+C)
        #[arg(long)]
        duration: Option<f64>,

        /// Serve stats from a fixture directory instead of the live cluster
        #[arg(long)]
        fixtures: Option<String>,

        /// Write records as JSON lines to this file
        #[arg(long, default_value = "benchscope-metrics.jsonl")]
        output: String,

        /// Print records to stdout instead of writing a file
        #[arg(long)]
        stdout: bool,
    },

    /// Summarize a JSON lines metrics file
    Replay {
        /// Metrics file written by `run`
        path: String,

        /// Only include records of this run id
        #[arg(long)]
        run_id: Option<String>,

        /// Print every metric record, not only the summary
        #[arg(long)]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let result = match cli.command {
        Commands::Devices { optional } => commands::devices::run(optional),
        Commands::Env {
            config,
            node,
            target,
        } => commands::env::run(config.as_deref(), &node, &target),
        Commands::Run {
            config,
            devices,
            duration,
            fixtures,
            output,
            stdout,
        } => commands::run::run(commands::run::RunCommandConfig {
            config_path: config.as_deref(),
            devices: devices.as_deref(),
            duration_secs: duration,
            fixtures_dir: fixtures.as_deref(),
            output_path: (!stdout).then_some(output.as_str()),
        }),
        Commands::Replay {
            path,
            run_id,
            verbose,
        } => commands::replay::run(&path, run_id.as_deref(), verbose),
    };

    if let Err(e) = result {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
