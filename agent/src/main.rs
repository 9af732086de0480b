//! FleetView Agent - live vehicle tracker
//!
//! Subscribes to a vehicle's location topics over zenoh and animates its
//! marker in the terminal. Type `replay` or `show` (then Enter) for the two
//! map buttons, `quit` to leave.

mod terminal;
mod zenoh_transport;

use anyhow::{Context, Result};
use clap::Parser;
use fleetview_core::{LinkState, TrackerAgent, TrackerConfig, UserCommand};
use fleetview_env::{ClientId, FleetViewContext, TokioContext};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use terminal::TerminalSurface;
use zenoh_transport::ZenohTransport;

/// FleetView live tracker
#[derive(Parser, Debug)]
#[command(name = "fleetview-agent")]
#[command(about = "Track a vehicle's live location feed", long_about = None)]
struct Args {
    /// Tracker configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker endpoint, e.g. tcp/127.0.0.1:7447
    #[arg(short, long)]
    broker: Option<String>,

    /// Vehicle whose bulk topic to follow
    #[arg(long)]
    vehicle: Option<String>,

    /// Print status readouts as JSON lines
    #[arg(long)]
    json_status: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<TrackerConfig> {
    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(broker) = &args.broker {
        config.broker_uri = broker.clone();
    }
    if let Some(vehicle) = &args.vehicle {
        config.vehicle_id = vehicle.clone();
    }
    if config.client_id.is_none() {
        config.client_id = Some(ClientId::random().to_string());
    }
    config.validate()?;
    Ok(config)
}

/// Forwards typed commands until stdin closes or `quit`.
async fn read_commands(tx: mpsc::Sender<UserCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<UserCommand>() {
            Ok(command) => {
                if tx.send(command).await.is_err() || command == UserCommand::Quit {
                    break;
                }
            }
            Err(e) => warn!("{} (try replay, show or quit)", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting tracing subscriber")?;

    let config = load_config(&args)?;
    let client_id = ClientId(config.client_id.clone().unwrap_or_default());

    info!("FleetView Agent v0.1.0");
    info!("  broker:  {}", config.broker_uri);
    info!("  client:  {}", client_id);
    info!("  topics:  {:?}", config.topics().all());

    let context = TokioContext::shared();
    let transport = Arc::new(ZenohTransport::new(client_id));
    let surface = if args.json_status {
        TerminalSurface::json(config.vehicle_id.clone())
    } else {
        TerminalSurface::new()
    };
    let mut agent = TrackerAgent::new(context.clone(), transport, config, surface);

    let (tx, rx) = mpsc::channel(16);
    context.spawn("stdin-commands", read_commands(tx.clone()));
    context.spawn("ctrl-c", async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(UserCommand::Quit).await;
        }
    });

    if agent.start().await != LinkState::Connected {
        warn!("no broker connection; replay and show still work on the recorded route");
    }

    agent.run(rx).await?;

    let diagnostics = agent.session().diagnostics();
    info!(
        "bye: {} legs, {} diagnostics recorded",
        agent.session().driver().legs_completed(),
        diagnostics.total_recorded()
    );
    Ok(())
}
