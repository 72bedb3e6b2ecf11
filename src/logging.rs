//! Opt-in diagnostics for the preload library and tracer processes.
//!
//! Off unless `STDERR_COLOR_LOG` holds an EnvFilter directive. Output goes to
//! a file, never to the terminal being colored.

use std::fs::OpenOptions;
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

static INIT: OnceCell<()> = OnceCell::new();

/// Install the file subscriber once. Returns true when this call installed it.
pub fn init(cfg: &Config) -> bool {
    if INIT.get().is_some() {
        return false;
    }
    let Some(directive) = cfg.log_filter.as_deref() else {
        return false;
    };

    let path = cfg.log_path();
    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let env_filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file));

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        // A subscriber is already installed (host program or tests).
        return false;
    }
    let _ = INIT.set(());
    tracing::debug!(pid = std::process::id(), log = %path.display(), "logging initialised");
    true
}
