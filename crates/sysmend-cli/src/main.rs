use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sysmend_core::{
    PollerOptions, SensorPoller, SensorStream, SensorStreamOptions, TaskRunner,
};
use sysmend_types::{OperationParams, ParamValue, TaskEvent};

mod config;
mod ops;
mod probe;

use config::Config;
use probe::ThermalProbe;

#[derive(Parser)]
#[command(name = "sysmend")]
#[command(author, version, about = "System maintenance and telemetry toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true, default_value = "sysmend.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available maintenance operations
    Ops,

    /// Run a maintenance operation and stream its events
    Run {
        /// Operation identifier (see `sysmend ops`)
        operation: String,

        /// Operation parameter as key=value; repeatable
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Emit events as JSON lines instead of text
        #[arg(short, long)]
        json: bool,
    },

    /// Watch host sensor readings
    Sensors {
        /// Poll interval in seconds (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Number of readings to print (0 for unlimited)
        #[arg(short, long, default_value = "0")]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Ops => {
            let catalog = ops::build_catalog();
            for id in catalog.ids() {
                if let Some(op) = catalog.get(id) {
                    println!("{:<16} [{}]", id, op.surface());
                }
            }
            Ok(())
        }
        Commands::Run {
            operation,
            params,
            json,
        } => run_operation(&operation, &params, json, cli.quiet).await,
        Commands::Sensors { interval, count } => watch_sensors(&config, interval, count).await,
    }
}

/// Parse repeated `key=value` flags into operation parameters.
///
/// The literals `true` and `false` become booleans; everything else is
/// kept as a string.
fn parse_params(raw: &[String]) -> Result<OperationParams> {
    let mut params = OperationParams::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid parameter '{pair}', expected key=value"))?;
        let value = match value {
            "true" => ParamValue::Bool(true),
            "false" => ParamValue::Bool(false),
            other => ParamValue::Str(other.to_string()),
        };
        params.insert(key, value);
    }
    Ok(params)
}

async fn run_operation(operation: &str, raw_params: &[String], json: bool, quiet: bool) -> Result<()> {
    let params = parse_params(raw_params)?;
    let catalog = Arc::new(ops::build_catalog());
    let runner = TaskRunner::new(catalog);

    let handle = runner
        .launch(operation, params)
        .with_context(|| format!("failed to start operation '{operation}'"))?;
    if !quiet {
        tracing::info!("started {} (task {})", operation, handle.id());
    }

    // First Ctrl-C requests cancellation; the worker then winds down on
    // its own and the event stream closes.
    let cancel_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancellation requested");
            cancel_handle.cancel();
        }
    });

    let mut events = handle.subscribe();
    let mut succeeded = false;
    while let Ok(envelope) = events.recv().await {
        if json {
            println!("{}", serde_json::to_string(&envelope)?);
        } else {
            print_event(&envelope.event);
        }
        if let TaskEvent::Completed { success, .. } = &envelope.event {
            succeeded = *success;
        }
    }

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn print_event(event: &TaskEvent) {
    match event {
        TaskEvent::Log { line } => println!("{line}"),
        TaskEvent::ProgressUpdate { percent } => println!("  {percent}%"),
        TaskEvent::ThreatFound { path, category } => {
            println!("threat: {path} ({category})");
        }
        TaskEvent::Completed {
            success,
            message,
            counts,
            cancelled,
        } => {
            let outcome = if *cancelled {
                "cancelled"
            } else if *success {
                "done"
            } else {
                "failed"
            };
            println!("{outcome}: {message}");
            for (key, value) in counts {
                println!("  {key}: {value}");
            }
        }
        // TaskEvent is non-exhaustive; render unknown kinds in debug form
        // rather than dropping them.
        other => println!("{other:?}"),
    }
}

async fn watch_sensors(config: &Config, interval: Option<u64>, count: u32) -> Result<()> {
    let mut poller_options = PollerOptions::default().backoff(config.backoff_policy());
    poller_options.preferred_key = config.preferred_sensor.clone();
    poller_options.validate()?;

    let stream_options = SensorStreamOptions {
        poll_interval: interval
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| config.poll_interval()),
        ..Default::default()
    };
    stream_options.validate()?;

    let poller = SensorPoller::with_options(ThermalProbe, poller_options);
    let mut stream = SensorStream::new(poller, stream_options);

    let mut printed = 0u32;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            reading = stream.recv() => {
                let Some(reading) = reading else { break };
                println!("{reading}");
                printed += 1;
                if count != 0 && printed >= count {
                    break;
                }
            }
        }
    }
    stream.close();
    Ok(())
}
