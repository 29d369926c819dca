//! Command line arguments
//!
//! Global flags override the logging section of the configuration file;
//! `run` flags override the worker and scheduler sections.

use crate::config::PipelineConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobpacer")]
#[command(about = "Rate-controlled batch job pipeline")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Color output control:
    /// --color true forces color, --color false disables it, unspecified = auto (TTY)
    #[arg(short = 'g', long = "color", value_name = "BOOL", global = true)]
    pub color: Option<bool>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", global = true, value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", global = true, value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start a run, admit jobs at the target rate and process them
    Run(RunArgs),

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Units to admit per window
    #[arg(short = 'x', long = "target", value_name = "UNITS")]
    pub target: u64,

    /// Window length in minutes
    #[arg(short = 'y', long = "window", value_name = "MINUTES")]
    pub window: f64,

    /// Stop admitting after this many seconds (runs until interrupted if omitted)
    #[arg(short = 'd', long = "duration", value_name = "SECONDS")]
    pub duration: Option<f64>,

    /// Number of worker instances
    #[arg(short = 'w', long = "workers", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Unacknowledged deliveries allowed per worker
    #[arg(short = 'p', long = "prefetch", value_name = "COUNT")]
    pub prefetch: Option<u16>,

    /// Rate controller tick in milliseconds
    #[arg(long = "tick-interval", value_name = "MILLIS")]
    pub tick_interval_ms: Option<u64>,

    /// Result sink: memory:// or the base URL of a document store
    #[arg(long = "sink-url", value_name = "URL")]
    pub sink_url: Option<String>,

    /// Seconds to wait for queued jobs after admission stops
    #[arg(long = "drain-timeout", value_name = "SECONDS", default_value_t = 30.0)]
    pub drain_timeout: f64,
}

impl Args {
    /// Apply command line overrides on top of file values
    pub fn apply_to(&self, config: &mut PipelineConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = if file.as_os_str() == "none" {
                None
            } else {
                Some(file.clone())
            };
        }

        if let Command::Run(run) = &self.command {
            if let Some(workers) = run.workers {
                config.worker.instances = workers;
            }
            if let Some(prefetch) = run.prefetch {
                config.worker.prefetch = prefetch;
            }
            if let Some(tick) = run.tick_interval_ms {
                config.scheduler.tick_interval_ms = tick;
            }
            if let Some(sink_url) = &run.sink_url {
                config.worker.sink_url = sink_url.clone();
            }
        }
    }

    /// Color on when forced, otherwise when stdout is a terminal
    pub fn use_color(&self) -> bool {
        use std::io::IsTerminal;

        self.color
            .unwrap_or_else(|| std::io::stdout().is_terminal())
    }
}

impl RunArgs {
    pub fn duration(&self) -> Option<Duration> {
        self.duration.and_then(seconds)
    }

    pub fn drain_timeout(&self) -> Duration {
        seconds(self.drain_timeout).unwrap_or(Duration::ZERO)
    }
}

fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}
