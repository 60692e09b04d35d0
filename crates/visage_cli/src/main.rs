use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use visage_core::{Channel, ManualClock, MemoryActor, Millis, VisageConfig};
use visage_engine::{ExpressionEngine, TickOutcome, TickReport};

mod script;

use script::{Runner, Script};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long, env = "VISAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Timed script of pushes, overrides, resets and flag changes
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Stop after this many milliseconds (default: last step + 1000)
    #[arg(long)]
    until_ms: Option<Millis>,

    /// Tick interval in milliseconds (default: [tick] interval_ms)
    #[arg(long)]
    tick_ms: Option<Millis>,

    /// Tick on the wall clock instead of simulated time
    #[arg(long)]
    realtime: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let config = match &args.config {
        Some(path) => VisageConfig::load(path)?,
        None => VisageConfig::load_or_default("visage.toml"),
    };
    let script = match &args.script {
        Some(path) => Script::load(path)?,
        None => Script::default(),
    };

    let tick_ms = args.tick_ms.unwrap_or(config.tick.interval_ms).max(1);
    let until_ms = args
        .until_ms
        .unwrap_or_else(|| script.end_ms().saturating_add(1_000));
    info!(
        "Visage starting: {} step(s), tick {}ms, until {}ms ({})",
        script.steps.len(),
        tick_ms,
        until_ms,
        if args.realtime { "realtime" } else { "simulated" }
    );

    let mut actor = MemoryActor::new();
    let runner = script.runner();
    if args.realtime {
        run_realtime(&config, runner, &mut actor, tick_ms, until_ms).await?;
    } else {
        run_simulated(&config, runner, &mut actor, tick_ms, until_ms)?;
    }

    for channel in Channel::ALL {
        info!("{}: {}", channel, actor.shown(channel).unwrap_or("-"));
    }
    info!("Pose: {}", actor.pose);
    Ok(())
}

/// Step a simulated clock from 0 to `until_ms`, as fast as possible.
fn run_simulated(
    config: &VisageConfig,
    mut runner: Runner,
    actor: &mut MemoryActor,
    tick_ms: Millis,
    until_ms: Millis,
) -> Result<()> {
    let clock = ManualClock::new();
    let mut engine = ExpressionEngine::new(config, Arc::new(clock.clone()));
    let mut now = 0;
    loop {
        clock.set(now);
        runner.apply_due(now, &mut engine, actor)?;
        let report = engine.tick(actor);
        emit(&report)?;
        if now >= until_ms {
            break;
        }
        now = now.saturating_add(tick_ms).min(until_ms);
    }
    Ok(())
}

/// Tick on a tokio interval against the monotonic clock, like a host
/// animation loop would.
async fn run_realtime(
    config: &VisageConfig,
    mut runner: Runner,
    actor: &mut MemoryActor,
    tick_ms: Millis,
    until_ms: Millis,
) -> Result<()> {
    let mut engine = ExpressionEngine::realtime(config);
    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = engine.now();
                runner.apply_due(now, &mut engine, actor)?;
                let report = engine.tick(actor);
                emit(&report)?;
                if now >= until_ms {
                    break;
                }
            }
            _ = &mut interrupted => {
                warn!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}

/// Print each mutation as one JSON line on stdout.
fn emit(report: &TickReport) -> Result<()> {
    if let TickOutcome::Skipped(e) = &report.outcome {
        warn!("Tick at {}ms skipped: {}", report.now, e);
    }
    for mutation in &report.mutations {
        let mut line = serde_json::to_value(mutation).context("Failed to encode mutation")?;
        if let Some(fields) = line.as_object_mut() {
            fields.insert("at_ms".to_string(), report.now.into());
        }
        println!("{line}");
    }
    Ok(())
}
