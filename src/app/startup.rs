//! Process startup: arguments, configuration, logging, then the command

use crate::app::cli::{Args, Command, RunArgs};
use crate::app::{AppError, AppResult, Pipeline};
use crate::config::PipelineConfig;
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::{init_logging, spawn_debug_toggle};
use crate::core::shutdown::ShutdownCoordinator;
use crate::core::version;
use crate::state::RunState;
use crate::worker::StatsSnapshot;
use clap::Parser;
use log::{debug, info, warn};
use std::process::ExitCode;

/// Final figures of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub state: RunState,
    pub stats: StatsSnapshot,
    pub stored_results: Option<u64>,
    pub drained: bool,
}

pub async fn startup() -> ExitCode {
    let args = Args::parse();
    let use_color = args.use_color();

    let (mut config, source) = match PipelineConfig::load(args.config_file.as_deref()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            let _ = init_logging(args.log_level.as_deref(), None, None, use_color);
            log_error_with_context(&e, "Loading configuration");
            return ExitCode::FAILURE;
        }
    };
    args.apply_to(&mut config);

    let log_file = config
        .logging
        .file
        .as_ref()
        .map(|p| p.to_string_lossy().to_string());
    if let Err(e) = init_logging(
        Some(&config.logging.level),
        Some(&config.logging.format),
        log_file.as_deref(),
        use_color,
    ) {
        eprintln!("Failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    debug!(
        "jobpacer {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        version::git_hash(),
        version::build_time()
    );
    match &source {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => debug!("No configuration file, using defaults"),
    }

    if let Err(e) = config.validate() {
        log_error_with_context(&e, "Validating configuration");
        return ExitCode::FAILURE;
    }

    match args.command {
        Command::ShowConfig => match config.to_toml() {
            Ok(rendered) => {
                print!("{}", rendered);
                ExitCode::SUCCESS
            }
            Err(e) => {
                log_error_with_context(&e, "Rendering configuration");
                ExitCode::FAILURE
            }
        },
        Command::Run(run) => {
            let shutdown = ShutdownCoordinator::with_signal_handlers();
            spawn_debug_toggle();
            match run_pipeline(config, &run, shutdown).await {
                Ok(summary) => {
                    report(&summary);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    log_error_with_context(&e, "Running pipeline");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Execute one run end to end
///
/// Admission lasts for `run.duration` or until shutdown is requested. After
/// a timed stop the queue is drained for up to `run.drain_timeout`; after a
/// signal it is not.
pub async fn run_pipeline(
    config: PipelineConfig,
    run: &RunArgs,
    shutdown: ShutdownCoordinator,
) -> AppResult<RunSummary> {
    if run.target == 0 || !run.window.is_finite() || run.window <= 0.0 {
        return Err(AppError::InvalidArgument {
            field: "target/window",
            message: "--target and --window must both be greater than 0".to_string(),
        });
    }

    let mut shutdown_rx = shutdown.subscribe();
    let mut pipeline = Pipeline::build(config, shutdown.clone()).await?;
    pipeline.start().await?;

    let mut progress = pipeline.fanout().connect_listener("console", "cli")?;
    let console = tokio::spawn(async move {
        while let Some(snapshot) = progress.recv().await {
            debug!(
                "Progress: {} enqueued, {} processed, {} in flight",
                snapshot.enqueued,
                snapshot.processed,
                snapshot.in_flight()
            );
        }
    });

    if let Err(e) = pipeline.control().start(run.target, run.window).await {
        let _ = pipeline.fanout().disconnect_listener("console");
        pipeline.shutdown().await;
        let _ = console.await;
        return Err(e.into());
    }

    match run.duration() {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => info!("Run duration elapsed"),
                _ = shutdown_rx.recv() => {}
            }
        }
        None => {
            let _ = shutdown_rx.recv().await;
        }
    }

    let stopped = pipeline.control().stop().await;
    let drained = if shutdown.is_shutdown_requested() {
        false
    } else {
        info!("Draining queued jobs (up to {:?})", run.drain_timeout());
        pipeline.drain(run.drain_timeout()).await
    };
    if !drained {
        warn!("Jobs still queued at shutdown; they stay on the broker");
    }

    let summary = RunSummary {
        state: pipeline.control().status().await,
        stats: pipeline.worker_stats(),
        stored_results: pipeline.sink().count().await.ok(),
        drained,
    };

    let _ = pipeline.fanout().disconnect_listener("console");
    pipeline.shutdown().await;
    let _ = console.await;

    stopped?;
    Ok(summary)
}

fn report(summary: &RunSummary) {
    info!(
        "Run finished: {} enqueued, {} processed ({} acked, {} requeued, {} rejected)",
        summary.state.enqueued,
        summary.state.processed,
        summary.stats.acked,
        summary.stats.requeued,
        summary.stats.rejected
    );
    if let Some(count) = summary.stored_results {
        info!("{} result document(s) stored", count);
    }
}
