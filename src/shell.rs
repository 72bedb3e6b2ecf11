//! Shell identity check against the kernel-reported command name.

use std::fs;
use std::path::Path;

/// Target command name when `STDERR_COLOR_SHELL` is unset.
pub const DEFAULT_SHELL_NAME: &str = "bash";

const SELF_COMM: &str = "/proc/self/comm";

/// Exact comparison of a raw comm value (trailing newline tolerated) to `target`.
pub fn is_target_shell(comm: &str, target: &str) -> bool {
    let name = comm.strip_suffix('\n').unwrap_or(comm);
    !target.is_empty() && name == target
}

/// Read a comm file; unreadable or missing sources report `None`.
pub fn read_comm(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

/// Whether this process is the target shell. Missing `/proc` means "not the shell".
pub fn current_process_is(target: &str) -> bool {
    match read_comm(Path::new(SELF_COMM)) {
        Some(comm) => is_target_shell(&comm, target),
        None => {
            tracing::debug!("{} unreadable; tracing disabled for this process", SELF_COMM);
            false
        }
    }
}
