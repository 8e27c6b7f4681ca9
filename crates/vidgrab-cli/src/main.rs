//! VidGrab updater CLI.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ColorChoice, Parser};
use tracing::{Level, info, warn};

use vidgrab_updater::{
    CancelToken, CheckOutcome, CheckTrigger, UpdateCoordinator, UpdateEvent, UpdateOutcome,
    UpdateSettings,
};

mod cli;
mod logging;

use crate::cli::{Cli, Command, CommonArgs, LogFormatArg};
use crate::logging::{LogConfig, LogFormat, init_logging};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = run(cli);
    std::process::exit(exit_code);
}

#[tokio::main]
async fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Check(args) => {
            let coordinator = match build_coordinator(settings_from_args(&args.common)) {
                Ok(coordinator) => coordinator,
                Err(error) => {
                    eprintln!("error: {error}");
                    return 1;
                }
            };
            match coordinator.check(CheckTrigger::Manual).await {
                Ok(CheckOutcome::UpdateAvailable(manifest)) => {
                    println!("Update available: {}", manifest.display_name);
                    if !manifest.release_notes.is_empty() {
                        println!("\n{}", manifest.release_notes);
                    }
                    0
                }
                Ok(CheckOutcome::NoUpdate) => {
                    println!("Already up to date.");
                    0
                }
                Ok(CheckOutcome::RateLimited) => 0,
                Err(error) => {
                    eprintln!("error: {}", error.user_message());
                    1
                }
            }
        }
        Command::Update(args) => {
            let mut settings = settings_from_args(&args.common);
            settings.auto_install = !args.no_install;
            settings.auto_restart = !args.no_restart;
            settings.relaunch_executable = args.relaunch;

            let coordinator = match build_coordinator(settings) {
                Ok(coordinator) => coordinator,
                Err(error) => {
                    eprintln!("error: {error}");
                    return 1;
                }
            };

            let cancel = CancelToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling update");
                    ctrl_c_cancel.cancel();
                }
            });

            match coordinator.update(CheckTrigger::Manual, &cancel).await {
                Ok(UpdateOutcome::Installed { version, .. }) => {
                    println!("Updated to version {version}. Restart VidGrab to apply.");
                    0
                }
                Ok(UpdateOutcome::AlreadyUpToDate) => {
                    println!("Already up to date.");
                    0
                }
                Ok(UpdateOutcome::InstallPending(manifest)) => {
                    println!(
                        "Version {} is available. Run again without --no-install to install it.",
                        manifest.latest_version
                    );
                    0
                }
                Ok(UpdateOutcome::Cancelled) => {
                    println!("Update cancelled.");
                    130
                }
                Ok(UpdateOutcome::RateLimited) => 0,
                Err(error) => {
                    eprintln!("error: {}", error.user_message());
                    1
                }
            }
        }
    }
}

fn settings_from_args(args: &CommonArgs) -> UpdateSettings {
    let install_root = args
        .install_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let mut settings = UpdateSettings::new(install_root);
    if let Some(url) = &args.manifest_url {
        settings.manifest_url = url.clone();
    }
    if let Some(work_dir) = &args.work_dir {
        settings.work_dir = work_dir.clone();
    }
    settings
}

fn build_coordinator(settings: UpdateSettings) -> vidgrab_updater::Result<UpdateCoordinator> {
    let coordinator = UpdateCoordinator::new(settings, progress_sink())?;
    let running: vidgrab_updater::Version = vidgrab_updater::VERSION
        .parse()
        .unwrap_or_else(|_| vidgrab_updater::Version::baseline());
    if let Some(pending) = coordinator.store().pending_update_notice(&running) {
        info!(%pending, "an installed update is waiting for a restart");
    }
    Ok(coordinator)
}

/// Renders coordinator events into the log stream.
fn progress_sink() -> vidgrab_updater::EventSink {
    Arc::new(|event| match event {
        UpdateEvent::Progress(progress) => {
            info!(
                stage = progress.stage.label(),
                percent = progress.percent,
                "{}",
                progress.message
            );
        }
        UpdateEvent::Finished { success, message } => {
            if success {
                info!("{message}");
            } else {
                warn!("{message}");
            }
        }
    })
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level: cli
            .verbosity
            .tracing_level_filter()
            .into_level()
            .unwrap_or(Level::ERROR),
        ..LogConfig::default()
    };
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_timestamps = cli.log_file.is_some();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
