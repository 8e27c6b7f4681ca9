//! CLI argument definitions for the updater.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "vidgrab-update",
    version,
    about = "VidGrab updater - check for and install application updates",
    long_about = "Check the VidGrab update manifest for a newer release,\n\
                  download and install it over the current installation,\n\
                  and optionally relaunch the application."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for warnings only).
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check for a newer version without installing anything.
    Check(CheckArgs),

    /// Download and install the latest version.
    Update(UpdateArgs),
}

#[derive(Parser)]
pub struct CheckArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Report an available version without installing it.
    #[arg(long = "no-install")]
    pub no_install: bool,

    /// Do not relaunch the application after installing.
    #[arg(long = "no-restart")]
    pub no_restart: bool,

    /// Executable to relaunch after a successful install.
    #[arg(long = "relaunch", value_name = "PATH")]
    pub relaunch: Option<PathBuf>,
}

#[derive(Parser)]
pub struct CommonArgs {
    /// URL of the update manifest.
    #[arg(long = "manifest-url", value_name = "URL")]
    pub manifest_url: Option<String>,

    /// Directory the update is installed into (default: current directory).
    #[arg(long = "install-root", value_name = "DIR")]
    pub install_root: Option<PathBuf>,

    /// Directory for the downloaded archive and scratch space
    /// (default: the install root).
    #[arg(long = "work-dir", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable output with colors.
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON output for machine parsing.
    Json,
}
