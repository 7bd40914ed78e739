use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
mod config;
mod error;
mod services;
mod types;
mod utils;

use config::Config;
use error::ErrorKind;
use services::detection_worker::WorkerState;
use services::{
    create_capture_backend, create_detector_factory, create_display_surface, create_window_resolver,
    Collaborators, Orchestrator, SessionSettings,
};
use utils::ModelFinder;

#[derive(Parser, Debug)]
#[command(name = "regionscope")]
#[command(about = "Real-time object detection over a live application window, split into parallel regions")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "regionscope.toml", global = true)]
    config: String,

    /// Use emulated window, capture and detector backends
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log level (overrides the configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a detection session (default)
    Run(RunArgs),
    /// Print the windows the resolver can see
    ListWindows,
    /// Print model files found in the working directory and the models folder
    ListModels,
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Title keyword of the window to monitor
    #[arg(short, long)]
    window: Option<String>,

    /// Detector model file
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Number of regions the window is split into
    #[arg(short, long)]
    divisions: Option<u32>,

    /// Minimum detection confidence
    #[arg(long)]
    confidence: Option<f32>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    let run_args = match &args.command {
        Some(Command::Run(run)) => Some(run),
        _ => None,
    };
    apply_overrides(&mut config, &args, run_args)?;

    init_tracing(&config)?;

    info!("Starting regionscope v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config);

    if args.dry_run {
        warn!("Dry-run mode: emulated window, capture and detector");
    }

    match args.command {
        Some(Command::ListWindows) => list_windows(&config, args.dry_run).await,
        Some(Command::ListModels) => list_models(&config),
        Some(Command::Run(run)) => run_session(config, args.dry_run, run).await,
        None => run_session(config, args.dry_run, RunArgs::default()).await,
    }
}

fn apply_overrides(config: &mut Config, args: &Args, run: Option<&RunArgs>) -> Result<()> {
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
        config.logging.filter = format!("regionscope={}", level);
    }

    if let Some(run) = run {
        if let Some(window) = &run.window {
            config.window.keyword = window.clone();
        }
        if let Some(model) = &run.model {
            config.detector.model_path = model.clone();
        }
        if let Some(divisions) = run.divisions {
            config.regions.divisions = divisions;
        }
        if let Some(confidence) = run.confidence {
            config.detector.confidence_threshold = confidence;
        }
    }

    config.validate()
}

async fn run_session(config: Config, dry_run: bool, run: RunArgs) -> Result<()> {
    let collaborators = Collaborators {
        resolver: create_window_resolver(&config, dry_run)?,
        capture: create_capture_backend(dry_run)?,
        detectors: create_detector_factory(&config, dry_run)?,
        surface: create_display_surface(&config.render),
    };
    info!(
        "Backends: resolver={}, capture={}, detector={}",
        collaborators.resolver.name(),
        collaborators.capture.name(),
        collaborators.detectors.name()
    );

    let orchestrator = Arc::new(Orchestrator::new(
        collaborators,
        SessionSettings::from_config(&config),
    ));

    let session = match orchestrator.start(&config.window.keyword).await {
        Ok(session) => session,
        Err(e) => {
            match e.kind() {
                ErrorKind::Configuration => {
                    error!("Cannot start a session, check the window keyword and model: {}", e)
                }
                _ => error!("Session start failed: {}", e),
            }
            return Err(e.into());
        }
    };
    info!("Monitoring '{}' at {}", session.window.title, session.window.geometry);
    for region in &session.regions {
        info!("  {}", region);
    }

    let summary_handle = (config.session.summary_interval_ms > 0).then(|| {
        let orchestrator = Arc::clone(&orchestrator);
        let interval = Duration::from_millis(config.session.summary_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                log_summary(&orchestrator);
            }
        })
    });

    let duration = run.duration.map(Duration::from_secs);
    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl+C"),
            Err(err) => error!("Failed to wait for the shutdown signal: {}", err),
        },
        _ = sleep_for(duration) => info!("Run duration elapsed"),
    }

    if let Some(handle) = summary_handle {
        handle.abort();
    }

    info!("Shutting down...");
    let report = match orchestrator.stop().await {
        Ok(report) => report,
        Err(e) if e.kind() == ErrorKind::Lifecycle => {
            warn!("Nothing to stop: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    for (region_id, state) in &report.workers {
        info!("  region #{}: {:?}", region_id, state);
    }

    if report.all_terminated() && report.renderer_exited {
        info!("regionscope finished");
    } else {
        warn!("regionscope finished with threads still running");
    }
    Ok(())
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

fn log_summary(orchestrator: &Orchestrator) {
    let (Some(activity), Some(table)) = (orchestrator.activity(), orchestrator.result_table()) else {
        return;
    };

    info!(
        "'{}': {} detections, {} frames rendered ({} failed)",
        activity.window.title,
        table.total_detections(),
        activity.frames,
        activity.render_errors
    );
    for worker in &activity.workers {
        info!(
            "  region #{}: {} cycles, {} boxes published, last cycle {:?}",
            worker.region_id, worker.iterations, worker.published, worker.last_cycle
        );
    }
    for (_, slot) in table.read_all() {
        for detection in slot.iter() {
            info!("  {}", detection);
        }
    }

    let failed: Vec<u32> = activity
        .workers
        .iter()
        .filter(|w| matches!(w.state, WorkerState::Failed(_)))
        .map(|w| w.region_id)
        .collect();
    if !failed.is_empty() {
        warn!("Regions with stopped workers (showing stale results): {:?}", failed);
    }
    if !activity.renderer_running {
        warn!("Renderer is no longer running");
    }
}

async fn list_windows(config: &Config, dry_run: bool) -> Result<()> {
    let resolver = create_window_resolver(config, dry_run)?;
    let windows = resolver.list_windows().await?;

    if windows.is_empty() {
        println!("No windows found");
    }
    for window in windows {
        println!("{}", window);
    }
    Ok(())
}

fn list_models(config: &Config) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let models = ModelFinder::discover(&cwd, &config.detector.models_folder)?;

    if models.is_empty() {
        println!("No model files found");
    }
    for model in models {
        println!("{}", model);
    }
    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let directives = format!("{},{}", config.logging.level, config.logging.filter);
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directives))?;

    let compact = config.logging.format == "compact";
    tracing_subscriber::registry()
        .with(filter)
        .with(compact.then(|| tracing_subscriber::fmt::layer().compact()))
        .with((!compact).then(|| tracing_subscriber::fmt::layer()))
        .init();

    Ok(())
}
