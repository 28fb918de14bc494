//! Common utilities for the binaries
//!
//! Shared initialization, CLI parsing, and setup code.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Common CLI arguments
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Engine configuration file
    #[arg(short, long, default_value = "config.json")]
    pub config: String,

    /// Action-policy configuration file (overrides the config's `filters`)
    #[arg(long)]
    pub actions: Option<String>,

    /// CPU core to pin the feed thread to
    #[arg(short = 'C', long)]
    pub cpu_core: Option<usize>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    pub json_logs: bool,
}

/// Initialize tracing/logging
pub fn init_logging(level: &str, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
    }
    Ok(())
}

/// Pin the current thread to a core when requested.
pub fn setup_performance(cpu_core: Option<usize>) -> Result<()> {
    if let Some(core) = cpu_core {
        let ids = core_affinity::get_core_ids().unwrap_or_default();
        match ids.into_iter().find(|c| c.id == core) {
            Some(id) if core_affinity::set_for_current(id) => {
                tracing::info!("pinned to CPU core {}", core);
            }
            _ => tracing::warn!("could not pin to CPU core {}", core),
        }
    }
    Ok(())
}
