//! Arrebol Worker - node agent for containerized task execution

use arrebol_worker::{
    agent::WorkerAgent, config::Settings, config::WorkerConfig, defaults,
    dispatcher::HttpDispatcher, docker::DockerDriver, error::WorkerError,
};
use arrebol_crypto::Keystore;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "arrebol-worker")]
#[command(version, about = "Arrebol worker node agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker agent
    Daemon,

    /// Generate the worker key pair and print the public key
    Keygen,
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("arrebol_worker={log_level},arrebol_crypto={log_level},warn"))
        .with_target(false)
        .init();

    info!("starting arrebol worker v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Daemon => run_daemon().await,
        Commands::Keygen => run_keygen().await,
    }
}

async fn run_daemon() -> Result<(), WorkerError> {
    let settings = Settings::from_env()?;
    let config = WorkerConfig::load(&settings.conf_file_path)?;
    info!(worker_id = %config.id, vcpu = config.vcpu, ram_mb = config.ram_mb, "loaded worker configuration");

    let keystore = Keystore::new(&settings.keys_path);
    let keypair = keystore.ensure_keypair(&config.id.to_string())?;
    let dispatcher_key = keystore.load_public_key(defaults::DISPATCHER_KEY_NAME)?;

    let driver = Arc::new(DockerDriver::connect(settings.node_address.as_deref())?);
    let dispatcher = Arc::new(HttpDispatcher::new(&settings.server_endpoint, dispatcher_key.clone()));

    let agent = WorkerAgent::new(
        &config,
        keypair,
        dispatcher_key,
        dispatcher,
        driver,
        &settings.bin_path,
    );

    agent.setup().await?;
    agent.run().await
}

async fn run_keygen() -> Result<(), WorkerError> {
    let config = WorkerConfig::load(&arrebol_worker::config::conf_file_path()?)?;
    let keystore = Keystore::new(arrebol_worker::config::keys_path());
    let keypair = keystore.ensure_keypair(&config.id.to_string())?;

    println!("{}", keypair.public_key().to_base64());
    Ok(())
}
