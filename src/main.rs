//! ==============================================================================
//! main.rs - telemetry dashboard entry point
//! ==============================================================================
//!
//! purpose:
//!     one binary, several roles. each role is a process in the pipeline:
//!
//!     ┌─────────────┐  POST /messages/output1  ┌─────────────┐
//!     │  simulate   │ ───────────────────────▶ │   ingest    │
//!     │ (25s ticks) │                          │ (port 3001) │
//!     └─────────────┘                          └──────┬──────┘
//!                                                     │ Body=base64, _ts
//!                                               ┌─────┴─────┐
//!                                               │   store   │
//!                                               └─────┬─────┘
//!     ┌─────────────┐  GET /latest-data        ┌──────┴──────┐
//!     │   watch     │ ───────────────────────▶ │   serve     │
//!     │ (25s polls) │  GET /data-between       │ (port 3000) │
//!     └─────────────┘                          └─────────────┘
//!
//!     all-in-one runs simulate + ingest + serve over a single store.
//!
//! relationships:
//!     - uses: config.rs (telemetry.toml + env overrides)
//!     - uses: simulator.rs, sink.rs, ingest.rs, api.rs, dashboard.rs
//!     - uses: store (connection string -> RecordStore)
//!
//! ==============================================================================

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use telemetry_dashboard::{
    api,
    config::TelemetryConfig,
    dashboard::{self, Dashboard},
    ingest, logging,
    simulator::{self, SimulatorSettings},
    sink::{HttpSink, StoreSink},
    store::{self, RecordStore},
};

#[derive(Debug, Parser)]
#[command(name = "telemetry-dashboard", version, about)]
struct Cli {
    /// path to telemetry.toml (defaults to ./config or ../config)
    #[arg(long, short, env = "TELEMETRY_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Debug, Subcommand)]
enum Role {
    /// run the mock sensor module and publish to an ingest node
    Simulate {
        #[arg(long)]
        hub_url: Option<String>,
    },
    /// accept published messages and land them in the store
    Ingest {
        #[arg(long)]
        port: Option<u16>,
    },
    /// serve /latest-data and /data-between over the store
    Serve,
    /// poll the backend like the dashboard does
    Watch {
        #[arg(long)]
        backend_url: Option<String>,
        /// history start, local time, YYYY-MM-DDTHH:MM
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// history end, local time, YYYY-MM-DDTHH:MM
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
    /// simulator, ingest route and backend in one process
    AllInOne,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = run().await {
        eprintln!("[ERROR] Fatal: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // step 1: load configuration
    let mut config = TelemetryConfig::load_or_default(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok())?;

    // step 2: logging
    logging::init(&config.logging.level)?;

    println!("===========================================================");
    println!("  IoT Telemetry Dashboard");
    println!("  role: {:?}", cli.role);
    println!("===========================================================");
    config.log_summary();

    // step 3: ctrl+c stops future scheduling everywhere
    let shutdown = shutdown_channel();

    // step 4: role
    match cli.role {
        Role::Simulate { hub_url } => {
            let hub_url = hub_url.unwrap_or_else(|| config.simulator.hub_url.clone());
            let sink = HttpSink::connect(&hub_url)
                .await
                .context("failed to open message transport")?;
            tracing::info!("IoT module client initialized, publishing to {}", hub_url);
            simulator::run(simulator_settings(&config), &sink, shutdown).await;
        }
        Role::Ingest { port } => {
            let listener = api::bind(port.unwrap_or(config.ingest.port)).await?;
            let store = open_store(&config)?;
            let app = ingest::router(store, &config.simulator.channel);
            api::serve(listener, app, stopped(shutdown)).await?;
        }
        Role::Serve => {
            let listener = api::bind(config.backend.port).await?;
            let store = open_store(&config)?;
            api::health_check(store.as_ref()).await;
            api::serve(listener, api::router(store), stopped(shutdown)).await?;
        }
        Role::Watch { backend_url, from, to } => {
            let url = backend_url.unwrap_or_else(|| config.dashboard.backend_url.clone());
            let mut client = Dashboard::new(&url, config.dashboard.window)?;

            if let (Some(from), Some(to)) = (from, to) {
                let series = client
                    .fetch_history(&from, &to)
                    .await
                    .context("Data is not available")?;
                for s in series {
                    println!("{}", serde_json::to_string(s)?);
                }
                return Ok(());
            }

            let period = Duration::from_secs(config.dashboard.poll_interval_seconds.max(1));
            dashboard::run(&mut client, period, shutdown).await;
        }
        Role::AllInOne => {
            // nothing starts ticking unless the port is ours
            let listener = api::bind(config.backend.port).await?;
            let store = open_store(&config)?;
            api::health_check(store.as_ref()).await;

            let sink = StoreSink::new(store.clone(), &config.simulator.channel);
            let settings = simulator_settings(&config);
            let sim_shutdown = shutdown.clone();
            let sim = tokio::spawn(async move {
                simulator::run(settings, &sink, sim_shutdown).await;
            });

            let app = api::router(store.clone()).merge(ingest::router(store, &config.simulator.channel));
            let served = api::serve(listener, app, stopped(shutdown)).await;
            if served.is_err() {
                sim.abort();
            }
            if let Err(e) = sim.await {
                if e.is_panic() {
                    return Err(anyhow::Error::new(e).context("simulator task panicked"));
                }
            }
            served?;
        }
    }

    Ok(())
}

fn simulator_settings(config: &TelemetryConfig) -> SimulatorSettings {
    SimulatorSettings {
        sensor_id: config.simulator.sensor_id.clone(),
        channel: config.simulator.channel.clone(),
        interval: Duration::from_secs(config.simulator.interval_seconds.max(1)),
        show_sensor_data: config.logging.show_sensor_data,
    }
}

fn open_store(config: &TelemetryConfig) -> Result<Arc<dyn RecordStore>> {
    let store = store::connect(&config.store.connection_string)
        .context("failed to open record store")?;
    tracing::info!("using store {}", store.describe());
    Ok(store)
}

fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received ctrl+c, shutting down");
                let _ = tx.send(true);
            }
            Err(e) => {
                // keep the sender alive so nothing reads this as a shutdown
                tracing::warn!("ctrl+c handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

/// resolves once shutdown is signalled
async fn stopped(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
