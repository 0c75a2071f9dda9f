//! ecs-gen entry point.

use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use tokio::signal;

use ecs_gen::config::{Config, ConfigOverrides};
use ecs_gen::error::ConfigError;
use ecs_gen::provider::{metadata::MetadataClient, AwsProvider};
use ecs_gen::Reconciler;

/// docker-gen for AWS ECS.
#[derive(Parser)]
#[command(name = "ecs-gen", version, about, long_about = None)]
struct Cli {
    /// AWS region.
    #[arg(short, long)]
    region: Option<String>,

    /// ECS cluster name.
    #[arg(short, long)]
    cluster: Option<String>,

    /// Path to template file.
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Path to output file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Name of ECS task containing nginx.
    #[arg(long)]
    task: Option<String>,

    /// Which ENV var to use for the hostname.
    #[arg(long)]
    host_var: Option<String>,

    /// Command to run to signal change.
    #[arg(short, long)]
    signal: Option<String>,

    /// Time in seconds between polling. Must be >0.
    #[arg(short, long)]
    frequency: Option<u64>,

    /// Only execute one cycle and exit.
    #[arg(long)]
    once: bool,

    /// Where the last applied fingerprint is kept.
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// TOML configuration file (defaults to ./ecs-gen.toml and ./ecs-gen.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            region: self.region.clone(),
            cluster: self.cluster.clone(),
            template: self.template.clone(),
            output: self.output.clone(),
            task: self.task.clone(),
            host_var: self.host_var.clone(),
            signal: self.signal.clone(),
            frequency: self.frequency,
            once: self.once.then_some(true),
            state_file: self.state_file.clone(),
        }
    }
}

fn discovery_error(what: &'static str, err: anyhow::Error) -> ConfigError {
    ConfigError::Discovery {
        what,
        flag: what,
        reason: format!("{:#}", err),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    // Load configuration
    let config = Config::load(cli.config.as_deref(), &cli.overrides())?;
    config.validate()?;

    let metadata = MetadataClient::new()?;
    let region = match config.region.clone() {
        Some(region) => region,
        None => metadata
            .region()
            .await
            .map_err(|e| discovery_error("region", e))?,
    };
    let cluster = match config.cluster.clone() {
        Some(cluster) => cluster,
        None => metadata
            .cluster()
            .await
            .map_err(|e| discovery_error("cluster", e))?,
    };

    let settings = config.into_settings(region, cluster)?;
    info!("Starting ecs-gen with settings: {:?}", settings);

    let provider = AwsProvider::connect(&settings.region).await;
    let reconciler = Reconciler::new(provider, settings);

    // Graceful Shutdown
    tokio::select! {
        result = reconciler.run() => result?,
        res = signal::ctrl_c() => match res {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
                reconciler.run().await?;
            }
        },
    }

    info!("Shutdown complete.");
    Ok(())
}
