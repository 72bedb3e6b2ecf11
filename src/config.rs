//! Process-wide configuration, computed once when the library is loaded.
//!
//! Every component reads the same immutable [`Config`]; the only
//! runtime-mutable bit (terminal readiness) lives in `intercept`.

use std::env;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::color::{ColorCode, COLOR_ENV};
use crate::shell::{self, DEFAULT_SHELL_NAME};

pub const SHELL_ENV: &str = "STDERR_COLOR_SHELL";
pub const OUTPUT_ENV: &str = "STDERR_COLOR_OUTPUT";
pub const GATE_TIMEOUT_ENV: &str = "STDERR_COLOR_GATE_TIMEOUT_MS";
pub const DISABLE_ENV: &str = "STDERR_COLOR_DISABLE";
pub const LOG_ENV: &str = "STDERR_COLOR_LOG";
pub const LOG_FILE_ENV: &str = "STDERR_COLOR_LOG_FILE";

pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Stream the tracer writes escape sequences to.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum OutputStream {
    #[default]
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn fd(&self) -> RawFd {
        match self {
            OutputStream::Stdout => libc::STDOUT_FILENO,
            OutputStream::Stderr => libc::STDERR_FILENO,
        }
    }
}

fn parse_output_stream(s: &str) -> Option<OutputStream> {
    match s.trim().to_ascii_lowercase().as_str() {
        "stdout" | "out" | "1" => Some(OutputStream::Stdout),
        "stderr" | "err" | "2" => Some(OutputStream::Stderr),
        _ => None,
    }
}

fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Clone, Debug)]
pub struct Config {
    pub color: ColorCode,
    pub is_shell: bool,
    pub shell_name: String,
    pub output: OutputStream,
    pub gate_timeout: Duration,
    /// False when NO_COLOR or STDERR_COLOR_DISABLE is set.
    pub enabled: bool,
    pub log_filter: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Build from the process environment and `/proc/self/comm`.
    pub fn from_env() -> Self {
        Self::from_vars(|k| env::var(k).ok(), shell::current_process_is)
    }

    /// Build from an arbitrary variable source and shell probe.
    pub fn from_vars<F, S>(var: F, probe_shell: S) -> Self
    where
        F: Fn(&str) -> Option<String>,
        S: FnOnce(&str) -> bool,
    {
        let color = ColorCode::resolve(var(COLOR_ENV).as_deref());

        let shell_name = var(SHELL_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SHELL_NAME.to_string());
        let is_shell = probe_shell(&shell_name);

        let output = var(OUTPUT_ENV)
            .and_then(|s| parse_output_stream(&s))
            .unwrap_or_default();

        let gate_timeout = var(GATE_TIMEOUT_ENV)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_GATE_TIMEOUT);

        let disabled = var("NO_COLOR").is_some() || var(DISABLE_ENV).is_some_and(|v| parse_flag(&v));

        let log_filter = var(LOG_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let log_file = var(LOG_FILE_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Config {
            color,
            is_shell,
            shell_name,
            output,
            gate_timeout,
            enabled: !disabled,
            log_filter,
            log_file,
        }
    }

    /// Log file path, defaulting to a per-user file under the temp dir.
    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            let uid = nix::unistd::getuid();
            env::temp_dir().join(format!("stderr-color-{uid}.log"))
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars(|_| None, |_| false)
    }
}

static CONFIG: OnceCell<Config> = OnceCell::new();

/// Compute the process configuration once; later calls return the same value.
pub fn init() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

pub fn get() -> Option<&'static Config> {
    CONFIG.get()
}
