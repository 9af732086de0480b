//! FleetView Simulator CLI
//!
//! Run deterministic tracker scenarios, or play back a recorded route.

use clap::Parser;
use fleetview_core::{Coordinate, TrackerConfig};
use fleetview_sim::scenarios::ScenarioId;
use fleetview_sim::{ScenarioResult, ScenarioRunner, SimError, SimExport};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// FleetView deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "fleetview-sim")]
#[command(about = "Run deterministic simulation tests for the FleetView tracker", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (chained_legs, burst_during_animation, bulk_backfill,
    /// malformed_payloads, replay_mid_leg, double_replay, connect_retry,
    /// connection_lost, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Tracker configuration file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Play back a recorded route (JSON array of coordinates) instead of scenarios
    #[arg(long)]
    route: Option<String>,

    /// Frame sampling interval in milliseconds for --export
    #[arg(long, default_value = "100")]
    frame_ms: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export sampled frames of a single run to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn load_route(path: &str) -> Result<Vec<Coordinate>, SimError> {
    let text = std::fs::read_to_string(Path::new(path))?;
    let points: Vec<Coordinate> = serde_json::from_str(&text)?;
    if points.is_empty() {
        return Err(SimError::EmptyRoute);
    }
    Ok(points)
}

fn export_result(result: &ScenarioResult, path: &str) {
    let mut export = SimExport::new(&result.scenario, result.seed);
    for frame in &result.frames {
        export.add_frame(frame.clone());
    }
    export.finalize(result.passed, result.failure_reason.clone(), result.route.clone());

    match export.write_to_file(path) {
        Ok(()) => info!("Exported {} frames to {}", export.frames.len(), path),
        Err(e) => error!("Failed to write export: {}", e),
    }
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!("PASS {} (seed={})", result.scenario, result.seed);
    } else {
        error!(
            "FAIL {} (seed={}): {}",
            result.scenario,
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn init_logging(verbose: bool) {
    // RUST_LOG wins over --verbose
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: tracing subscriber already installed");
    }
}

fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(42)
}

fn parse_scenarios(name: &str) -> Result<Vec<ScenarioId>, String> {
    if name == "all" {
        return Ok(ScenarioId::all());
    }
    name.parse::<ScenarioId>().map(|id| vec![id]).map_err(|e| {
        let known: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
        format!("{} (known: {}, all)", e, known.join(", "))
    })
}

/// Runs one scenario or route with frame sampling, optionally exporting it.
fn run_single(runner: ScenarioRunner, target: Single, export: Option<&str>) -> bool {
    let result = match target {
        Single::Route(points) => runner.replay_route(points),
        Single::Scenario(id) => runner.run(id),
    };
    report(&result);
    if let Some(path) = export {
        export_result(&result, path);
    }
    result.passed
}

enum Single {
    Route(Vec<Coordinate>),
    Scenario(ScenarioId),
}

fn print_json_summary(results: &[ScenarioResult]) {
    let failed = results.iter().filter(|r| !r.passed).count();
    let rows: Vec<_> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "scenario": r.scenario,
                "seed": r.seed,
                "passed": r.passed,
                "time_secs": r.final_time_secs,
                "legs": r.metrics.legs_completed,
                "diagnostics": r.metrics.diagnostics,
                "failure_reason": r.failure_reason,
            })
        })
        .collect();
    let summary = serde_json::json!({
        "total": results.len(),
        "passed": results.len() - failed,
        "failed": failed,
        "results": rows,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Failed to render summary: {}", e),
    }
}

fn print_text_summary(results: &[ScenarioResult]) {
    let failures: Vec<&ScenarioResult> = results.iter().filter(|r| !r.passed).collect();
    if failures.is_empty() {
        info!("all {} scenario runs passed", results.len());
        return;
    }
    error!("{}/{} scenario runs failed", failures.len(), results.len());
    for r in failures {
        error!(
            "  {} seed={}: {}",
            r.scenario,
            r.seed,
            r.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => match TrackerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => TrackerConfig::default(),
    };
    let base_seed = resolve_seed(args.seed);
    let frames = Duration::from_millis(args.frame_ms);

    if let Some(route_path) = &args.route {
        let points = match load_route(route_path) {
            Ok(points) => points,
            Err(e) => {
                eprintln!("Error: {}: {}", route_path, e);
                return ExitCode::FAILURE;
            }
        };
        let mut runner = ScenarioRunner::new(base_seed).with_config(config);
        if args.export.is_some() {
            runner = runner.with_frames(frames);
        }
        let ok = run_single(runner, Single::Route(points), args.export.as_deref());
        return if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    let scenarios = match parse_scenarios(&args.scenario) {
        Ok(list) => list,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 || args.seeds > 1 {
            eprintln!("Error: --export only supports a single scenario and seed");
            return ExitCode::FAILURE;
        }
        let runner = ScenarioRunner::new(base_seed)
            .with_config(config)
            .with_frames(frames);
        let ok = run_single(runner, Single::Scenario(scenarios[0]), Some(export_path.as_str()));
        return if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    if !args.json {
        info!("fleetview-sim: {} scenario(s) x {} seed(s) from {}", scenarios.len(), args.seeds, base_seed);
    }

    let mut results = Vec::with_capacity(scenarios.len() * args.seeds);
    for offset in 0..args.seeds as u64 {
        let runner = ScenarioRunner::new(base_seed.wrapping_add(offset)).with_config(config.clone());
        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            results.push(result);
        }
    }

    if args.json {
        print_json_summary(&results);
    } else {
        print_text_summary(&results);
    }

    if results.iter().all(|r| r.passed) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
