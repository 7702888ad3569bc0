use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::{Path, PathBuf};

/// pebs-sentry: hardware-assisted memory access watchdog
///
/// pebs-sentry samples cache-miss and branch-miss events on every core,
/// correlates misses that land close together in space and time, and
/// snapshots the implicated memory of the offending process for
/// inspection.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/pebs-sentry/config.toml` and `/etc/pebs-sentry/config.d/*.toml`,
    /// where the latter being a glob pattern. If they don't exist, the
    /// default configuration is used.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Number of cores to monitor. Overrides the configuration file.
    #[arg(long)]
    #[arg(value_parser = validate_cores)]
    pub cores: Option<usize>,

    /// Disable sampling passes; the process idles but still serves
    /// status dumps.
    #[arg(long)]
    pub no_sample: bool,

    /// Disable the background inspector; findings stay queued on the
    /// rings.
    #[arg(long)]
    pub no_inspect: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

/// Validate the monitored core count.
#[inline(always)]
fn validate_cores(cores: &str) -> Result<usize, String> {
    let cores: usize = cores
        .parse()
        .map_err(|_| format!("`{cores}` is not a valid core count"))?;
    if (1..=4096).contains(&cores) {
        Ok(cores)
    } else {
        Err("Core count must be between 1 and 4096".to_string())
    }
}
