//! stderr-color: color a shell's stderr by tracing its `write` syscalls.
//!
//! The preload library (`preload/`) calls into this crate from its `fwrite`
//! and `execve` overrides. For each command the shell launches after its
//! first prompt, [`intercept::intercept_exec`] forks a tracer that attaches
//! to the about-to-exec process and wraps every `write(2, ...)` in the
//! configured escape sequences.

pub mod color;
pub mod config;
pub mod errors;
pub mod gate;
pub mod intercept;
pub mod launch;
pub mod logging;
pub mod shell;
pub mod tracer;

pub use color::{
    color_enabled_stderr, color_enabled_stdout, log_error_stderr, log_info_stderr,
    log_warn_stderr, paint, Color, ColorCode, COLOR_ENV, RESET,
};
pub use config::{Config, OutputStream};
pub use errors::{exit_code_for_io_error, exit_code_for_trace_error, GateError, TraceError};
pub use gate::SyncGate;
pub use intercept::{decide, intercept_exec, Decision, SkipReason, TerminalReady};
pub use shell::{is_target_shell, DEFAULT_SHELL_NAME};
pub use tracer::{Outcome, Stop, SyscallArgs, TraceSession, Tracee};

/// Environment variable the launcher honours for the preload library path.
pub const PRELOAD_ENV: &str = "STDERR_COLOR_PRELOAD";

/// File name of the built preload library.
pub const PRELOAD_LIB_NAME: &str = "libstderr_color_preload.so";
