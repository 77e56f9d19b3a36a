use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use msgloop::bus::{BusRouter, LoggingBus};
use msgloop::options::RawOptions;
use msgloop::signal::{SqliteSignalStore, StopHandle};
use msgloop::transport::{Envelope, SqliteTransport, queue_locator};
use msgloop::worker::{RateLimiter, WorkerController, WorkerSetup};

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, WorkerArgs};
use config::Config;

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("msgloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("msgloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter()))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_transport(config: &Config) -> Result<Arc<SqliteTransport>> {
    let transport = SqliteTransport::open(&config.store.dir)
        .context("Failed to open queue database")?
        .with_redeliver_timeout(Duration::from_secs(config.store.redeliver_timeout_secs));
    Ok(Arc::new(transport))
}

fn build_router(config: &Config) -> BusRouter {
    let mut router = BusRouter::new().with_fallback(config.buses.default.as_str());
    let mut names = config.buses.names.clone();
    if !names.contains(&config.buses.default) {
        names.push(config.buses.default.clone());
    }
    for name in names {
        router = router.with_bus(name.as_str(), Arc::new(LoggingBus::new(name.as_str())));
    }
    for (message_type, bus) in &config.buses.routes {
        router = router.route(message_type.as_str(), bus.as_str());
    }
    router
}

/// Build a controller over the SQLite queue for the given receivers and flags.
fn build_controller(config: &Config, receivers: &[String], args: &WorkerArgs) -> Result<WorkerController> {
    let receiver_names = if receivers.is_empty() {
        config.worker.receivers.clone()
    } else {
        receivers.to_vec()
    };

    let mut options: RawOptions = config.worker.options.clone();
    options.merge(args.to_options());

    let transport = open_transport(config)?;
    let signal_store =
        SqliteSignalStore::open(&config.store.dir).context("Failed to open restart signal store")?;

    let mut controller = WorkerController::new(WorkerSetup {
        receiver_locator: Arc::new(queue_locator(&transport, &receiver_names)),
        receiver_names,
        bus: Arc::new(build_router(config)),
        signal_store: Arc::new(signal_store),
        options,
    });

    for (receiver, limit) in &config.worker.rate_limits {
        controller = controller.with_rate_limiter(
            receiver.as_str(),
            RateLimiter::new(limit.permits, Duration::from_millis(limit.interval_ms)),
        );
    }

    Ok(controller)
}

/// Stop the worker on the first Ctrl-C / SIGTERM.
fn spawn_interrupt_listener(handle: StopHandle) {
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_ok() {
            info!("Shutdown signal received, stopping after the current message");
            handle.shutdown();
        }
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

async fn run_application(cli: &Cli, config: &Config) -> Result<i32> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Consume { receivers, options } => handle_consume_command(receivers, options, config).await,
        Commands::StopWorkers => handle_stop_workers_command(config),
        Commands::Metadata { receivers, options } => handle_metadata_command(receivers, options, config),
        Commands::Send {
            queue,
            message_type,
            body,
            bus,
        } => handle_send_command(queue, message_type, body, bus.as_deref(), config),
    }
}

async fn handle_consume_command(receivers: &[String], args: &WorkerArgs, config: &Config) -> Result<i32> {
    let mut controller = build_controller(config, receivers, args)?;
    spawn_interrupt_listener(controller.stop_handle());

    let report = controller.run().await.context("Worker failed")?;
    if controller.stop_handle().is_requested() {
        println!("{}", "Worker interrupted".yellow());
    }
    info!("Worker exited with code {}", report.exit_code);
    Ok(report.exit_code)
}

fn handle_stop_workers_command(config: &Config) -> Result<i32> {
    let mut controller = build_controller(config, &[], &WorkerArgs::default())?;
    let code = controller.stop_workers().context("Failed to send stop signal")?;
    Ok(code)
}

fn handle_metadata_command(receivers: &[String], args: &WorkerArgs, config: &Config) -> Result<i32> {
    let mut controller = build_controller(config, receivers, args)?;
    let metadata = controller.get_metadata().context("Failed to resolve worker")?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(0)
}

fn handle_send_command(
    queue: &str,
    message_type: &str,
    body: &str,
    bus: Option<&str>,
    config: &Config,
) -> Result<i32> {
    let body: serde_json::Value = serde_json::from_str(body).context("Message body must be valid JSON")?;
    let mut envelope = Envelope::new(message_type, body);
    if let Some(bus) = bus {
        envelope = envelope.on_bus(bus);
    }

    open_transport(config)?
        .send(queue, &envelope)
        .context("Failed to queue message")?;
    println!("{} {} on {}", "Queued".green(), envelope.id, queue);
    Ok(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging at the configured level
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    let code = match run_application(&cli, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            1
        }
    };

    info!("Application completed with code {}", code);
    std::process::exit(code);
}
