//! Error mapping guide:
//! - Tracer and gate failures are fatal to the tracer process only; every
//!   `TraceError` maps to exit status 1, a clean session to 0.
//! - Delegated libc failures (execve, fwrite) are never wrapped here; the
//!   caller sees the original return value and errno.
//! - The launcher maps io::ErrorKind::NotFound to 127 and everything else to 1.
use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Failures inside one trace session.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("ptrace attach to pid {pid} failed: {errno}")]
    Attach { pid: i32, errno: Errno },
    #[error("waitpid on tracee failed: {0}")]
    Wait(Errno),
    #[error("reading tracee registers failed: {0}")]
    Registers(Errno),
    #[error("resuming tracee failed: {0}")]
    Resume(Errno),
    #[error("writing color sequence failed: {0}")]
    Output(#[from] io::Error),
}

/// Failures of the attach handshake between launcher and tracer.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("mapping shared gate memory failed: {0}")]
    Map(Errno),
    #[error("initialising gate semaphore failed: {0}")]
    Init(Errno),
    #[error("waiting on gate semaphore failed: {0}")]
    Wait(Errno),
    #[error("tracer did not signal within {0:?}")]
    Timeout(std::time::Duration),
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// Tracer exit status for a failed session.
pub fn exit_code_for_trace_error(_e: &TraceError) -> i32 {
    1
}
