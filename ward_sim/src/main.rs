//! Ward Simulator CLI
//!
//! Runs the vitals pipeline against the real clock (seed 0) or a seeded
//! virtual environment, with a console subscriber attached.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use ward_core::{
    BroadcastHub, MemoryStore, PersistenceGateway, Scenario, ScenarioPlan, Scheduler, SledStore,
    WardConfig,
};
use ward_env::{TokioContext, WardContext};
use ward_sim::{console_subscriber, run_ticks, RunError, SimContext, TickExport};

/// Ward vitals simulator
#[derive(Parser, Debug)]
#[command(name = "ward-sim")]
#[command(about = "Simulate a hospital ward's vitals, triage and live updates", long_about = None)]
struct Args {
    /// Milliseconds between the end of one tick and the start of the next
    #[arg(short, long, default_value = "3000")]
    interval_ms: u64,

    /// Number of simulated patients
    #[arg(short, long, default_value = "30")]
    patients: usize,

    /// Scripted scenario as <position>=<name> (repeatable; replaces the default plan)
    #[arg(short = 'S', long, value_parser = ScenarioPlan::parse_assignment)]
    scenario: Vec<(usize, Scenario)>,

    /// Run without any scripted patients
    #[arg(long, conflicts_with = "scenario")]
    no_scenarios: bool,

    /// Master seed for a reproducible run (0 = OS entropy, real clock)
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Stop after this many ticks instead of waiting for Ctrl-C
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Persist to a sled database at this path (in-memory otherwise)
    #[arg(long)]
    store: Option<String>,

    /// Export per-tick summaries to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Seeded runs only: do not wait in real time between ticks
    #[arg(long)]
    fast: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON summary on stdout
    #[arg(long)]
    json: bool,
}

fn build_config(args: &Args) -> WardConfig {
    let scenarios = if args.no_scenarios {
        ScenarioPlan::none()
    } else if args.scenario.is_empty() {
        ScenarioPlan::default()
    } else {
        args.scenario
            .iter()
            .fold(ScenarioPlan::none(), |plan, (pos, s)| plan.assign(*pos, *s))
    };

    WardConfig::default()
        .with_tick_interval(Duration::from_millis(args.interval_ms))
        .with_cohort_size(args.patients)
        .with_scenarios(scenarios)
        .with_seed(args.seed)
}

fn open_store(path: Option<&str>) -> Result<Arc<dyn PersistenceGateway>, RunError> {
    let store: Arc<dyn PersistenceGateway> = match path {
        Some(path) => {
            info!("Opening sled store at {}", path);
            Arc::new(SledStore::open(path)?)
        }
        None => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

async fn run<Ctx: WardContext>(
    ctx: Arc<Ctx>,
    args: &Args,
    config: &WardConfig,
) -> Result<TickExport, RunError> {
    let gateway = open_store(args.store.as_deref())?;
    let hub = Arc::new(BroadcastHub::new(config.subscriber_buffer));
    let scheduler = Scheduler::bootstrap(ctx, config, hub, gateway)?;

    let console = (!args.json).then(|| tokio::spawn(console_subscriber(scheduler.hub().subscribe())));

    let mut export = TickExport::new(
        config.seed,
        scheduler.cohort().len(),
        config.tick_interval.as_millis() as u64,
    );

    match args.ticks {
        Some(ticks) => {
            let (stop, mut shutdown) = watch::channel(false);
            let interrupt = tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("Interrupted, finishing the current tick");
                        stop.send_replace(true);
                    }
                    Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
                }
            });
            run_ticks(&scheduler, config, ticks, &mut export, &mut shutdown).await;
            interrupt.abort();
            scheduler.stop().await;
        }
        None => {
            scheduler.start()?;
            info!("Press Ctrl-C to stop");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            scheduler.stop().await;
        }
    }

    let status = scheduler.status();
    let stats = scheduler.hub().stats();
    info!(
        ticks = status.ticks_completed,
        delivered = stats.messages_delivered,
        dropped = stats.subscribers_dropped,
        "Run finished"
    );
    export.finalize(status);

    // Dropping the scheduler drops the hub, which ends the console subscriber
    drop(scheduler);
    if let Some(console) = console {
        if let Err(e) = console.await {
            error!("Console subscriber ended abnormally: {}", e);
        }
    }

    if let Some(path) = &args.export {
        export.write_to_file(path)?;
        info!("Exported {} frames to {}", export.frames.len(), path);
    }
    Ok(export)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else if args.json {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = build_config(&args);
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    info!("Ward Simulator v0.1.0");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        patients = config.cohort_size,
        scripted = config.scenarios.len(),
        seed = config.seed,
        "Configuration"
    );

    let result = if config.seed == 0 {
        run(TokioContext::shared(), &args, &config).await
    } else {
        let ctx = Arc::new(SimContext::new(config.seed).with_pacing(!args.fast));
        run(ctx, &args, &config).await
    };

    let export = match result {
        Ok(export) => export,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        let summary = serde_json::json!({
            "seed": export.seed,
            "patients": export.cohort_size,
            "ticks": export.frames.len(),
            "failed_ticks": export.failed_ticks,
            "persistence_failures": export.persistence_failures(),
            "last_tiers": export.frames.last().map(|f| f.report.tiers),
            "status": export.final_status,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    }

    if export.failed_ticks > 0 {
        std::process::exit(1);
    }
}
