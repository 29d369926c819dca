use crate::app::cli::{Args, Command};
use crate::config::PipelineConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

fn parse(args: &[&str]) -> Args {
    Args::try_parse_from(std::iter::once("jobpacer").chain(args.iter().copied()))
        .expect("arguments should parse")
}

#[test]
fn test_run_requires_target_and_window() {
    assert!(Args::try_parse_from(["jobpacer", "run", "--target", "10"]).is_err());
    assert!(Args::try_parse_from(["jobpacer", "run", "--window", "1"]).is_err());

    let args = parse(&["run", "--target", "100", "--window", "1.5"]);
    match args.command {
        Command::Run(run) => {
            assert_eq!(run.target, 100);
            assert_eq!(run.window, 1.5);
            assert_eq!(run.duration(), None);
            assert_eq!(run.drain_timeout(), Duration::from_secs(30));
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_short_flags_and_duration() {
    let args = parse(&["run", "-x", "60", "-y", "2", "-d", "1.5", "-w", "3"]);

    let Command::Run(run) = &args.command else {
        panic!("expected run command");
    };
    assert_eq!(run.duration(), Some(Duration::from_millis(1500)));
    assert_eq!(run.workers, Some(3));
}

#[test]
fn test_negative_duration_is_ignored() {
    let args = parse(&["run", "-x", "1", "-y", "1", "--duration=-5"]);

    let Command::Run(run) = &args.command else {
        panic!("expected run command");
    };
    assert_eq!(run.duration(), None);
}

#[test]
fn test_global_flags_after_subcommand() {
    let args = parse(&["show-config", "--log-level", "debug", "-c", "/tmp/x.toml"]);

    assert!(matches!(args.command, Command::ShowConfig));
    assert_eq!(args.log_level.as_deref(), Some("debug"));
    assert_eq!(args.config_file, Some(PathBuf::from("/tmp/x.toml")));
}

#[test]
fn test_invalid_log_format_rejected() {
    assert!(Args::try_parse_from(["jobpacer", "--log-format", "xml", "show-config"]).is_err());
}

#[test]
fn test_overrides_applied_to_config() {
    let args = parse(&[
        "--log-level",
        "warn",
        "--log-file",
        "none",
        "run",
        "-x",
        "10",
        "-y",
        "1",
        "--workers",
        "4",
        "--prefetch",
        "2",
        "--tick-interval",
        "200",
        "--sink-url",
        "http://localhost:9200",
    ]);
    let mut config = PipelineConfig::default();
    config.logging.file = Some(PathBuf::from("old.log"));

    args.apply_to(&mut config);

    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.file, None);
    assert_eq!(config.worker.instances, 4);
    assert_eq!(config.worker.prefetch, 2);
    assert_eq!(config.scheduler.tick_interval_ms, 200);
    assert_eq!(config.worker.sink_url, "http://localhost:9200");
    config.validate().unwrap();
}

#[test]
fn test_show_config_leaves_worker_settings() {
    let args = parse(&["show-config"]);
    let mut config = PipelineConfig::default();

    args.apply_to(&mut config);

    assert_eq!(config, PipelineConfig::default());
}

#[test]
fn test_explicit_color_wins() {
    assert!(parse(&["--color", "true", "show-config"]).use_color());
    assert!(!parse(&["--color", "false", "show-config"]).use_color());
}
