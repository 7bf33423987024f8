//! Command-line options for devpackd

use clap::Parser;
use std::path::PathBuf;

/// Unset values fall back to the settings file, then to built-in defaults
#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "Devpack daemon - locate an installation, pack device diagnostics and stream them to peers"
)]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long)]
    pub bind: Option<String>,

    /// Settings file (defaults to <config dir>/devpack.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Artifact file name searched for on device requests
    #[arg(long)]
    pub artifact: Option<String>,

    /// Give up on each locate pass after this many seconds (0 = never)
    #[arg(long)]
    pub scan_timeout_secs: Option<u64>,

    /// Append archive job records to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}
