// plugsync/src/main.rs
use std::fs;
use std::process;

use clap::Parser;
use colored::Colorize;
use plugsync_common::config::default_config_path;
use plugsync_common::Config;
use plugsync_core::CancelToken;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{CliArgs, Command, InitArgs};

fn level_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

async fn run_init_command(cli_args: &CliArgs, init_args: &InitArgs) -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_filter(cli_args.verbose))
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .without_time()
        .try_init();

    let path = match &cli_args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    init_args.run(&path).await
}

fn init_logging(config: &Config, verbose: u8) {
    let level_filter = level_filter(verbose);
    let max_log_level = level_filter.into_level().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("PLUGSYNC_LOG")
        .from_env_lossy();

    let log_dir = config.logs_dir();
    if verbose == 0 {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .without_time()
            .try_init();
        return;
    }
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!(
            "{} Failed to create log directory {}: {} (run 'plugsync init' first)",
            "Error:".red().bold(),
            log_dir.display(),
            e
        );
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .without_time()
            .try_init();
        return;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "plugsync.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let stderr_writer = std::io::stderr.with_max_level(max_log_level);
    let file_writer = non_blocking_appender.with_max_level(max_log_level);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr_writer.and(file_writer))
        .with_ansi(true)
        .try_init();

    // The daemon runs until killed, so the guard lives as long as the process.
    Box::leak(Box::new(guard));
    debug!(
        "Verbose logging enabled. Writing logs to: {}/plugsync.log",
        log_dir.display()
    );
}

/// Cancels `cancel` on the first Ctrl-C or SIGTERM. The running cycle then
/// stops at the next artifact boundary.
fn spawn_signal_listener(cancel: CancelToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown requested, finishing the current artifact");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Cannot listen for SIGTERM ({}); only Ctrl-C will stop", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C");
    }
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    if let Command::Init(ref init_args) = cli_args.command {
        if let Err(e) = run_init_command(&cli_args, init_args).await {
            eprintln!("{}: Init command failed: {:#}", "Error".red().bold(), e);
            process::exit(1);
        }
        return;
    }

    let config = match Config::load(cli_args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{}: Could not load config (have you run 'plugsync init'?): {}",
                "Error".red().bold(),
                e
            );
            process::exit(1);
        }
    };
    init_logging(&config, cli_args.verbose);

    let cancel = CancelToken::new();
    if cli_args.command.wants_signals() {
        spawn_signal_listener(cancel.clone());
    }

    if let Err(e) = cli_args.command.run(&config, cancel).await {
        error!("Command failed: {:#}", e);
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        process::exit(1);
    }
    debug!("Command completed successfully.");
}
