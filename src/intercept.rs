//! Execution interceptor: decides per `execve` whether to fork a tracer,
//! waits for it to attach, then hands control back to the real call.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{fork, getpid, getppid, ForkResult, Pid};

use crate::config::Config;
use crate::gate::SyncGate;
use crate::tracer::{self, regs};

/// Set by the first buffered write of the target shell, i.e. once the prompt
/// has been drawn. Inherited by every child the shell forks afterwards.
#[derive(Debug, Default)]
pub struct TerminalReady(AtomicBool);

impl TerminalReady {
    pub const fn new() -> Self {
        TerminalReady(AtomicBool::new(false))
    }

    pub fn note_buffered_write(&self, cfg: &Config) {
        if cfg.is_shell && !self.0.load(Ordering::Relaxed) {
            self.0.store(true, Ordering::Release);
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub static TERMINAL_READY: TerminalReady = TerminalReady::new();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Trace,
    PassThrough(SkipReason),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NotShell,
    TerminalNotReady,
    UnsupportedArch,
}

pub fn decide(cfg: &Config, ready: &TerminalReady) -> Decision {
    if !cfg.enabled {
        Decision::PassThrough(SkipReason::Disabled)
    } else if !cfg.is_shell {
        Decision::PassThrough(SkipReason::NotShell)
    } else if !ready.is_set() {
        Decision::PassThrough(SkipReason::TerminalNotReady)
    } else if !regs::SUPPORTED {
        Decision::PassThrough(SkipReason::UnsupportedArch)
    } else {
        Decision::Trace
    }
}

/// Run `real_exec` (the real `execve`), optionally behind a freshly attached
/// tracer. The return value of `real_exec` is passed through untouched, and
/// nothing runs after it, so errno is that of the real call.
pub fn intercept_exec<F>(cfg: &Config, ready: &TerminalReady, real_exec: F) -> libc::c_int
where
    F: FnOnce() -> libc::c_int,
{
    match decide(cfg, ready) {
        Decision::Trace => {
            if let Some(child) = launch_with_tracer(cfg) {
                tracing::debug!(tracer = child.as_raw(), "tracer attached; exec");
            }
        }
        Decision::PassThrough(reason) => {
            tracing::trace!(?reason, "exec without tracer");
        }
    }
    real_exec()
}

/// Fork a tracer against this process and wait until it reports attached.
/// Failures are logged; the caller execs regardless.
pub fn launch_with_tracer(cfg: &Config) -> Option<Pid> {
    let gate = match SyncGate::new() {
        Ok(g) => g,
        Err(e) => {
            tracing::warn!("gate setup failed, exec uncolored: {e}");
            return None;
        }
    };

    allow_descendant_tracer();

    // SAFETY: called from the shell's single-threaded pre-exec child; the
    // forked tracer never returns into shell code.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            ignore_job_control_signals();
            let status = tracer::run_tracer(cfg, getppid(), &gate);
            // SAFETY: `_exit` skips atexit handlers and stdio flushing, which
            // belong to the shell.
            unsafe { libc::_exit(status) }
        }
        Ok(ForkResult::Parent { child }) => {
            match gate.wait_then_release(cfg.gate_timeout) {
                Ok(()) => Some(child),
                Err(e) => {
                    tracing::warn!(tracer = child.as_raw(), "{e}; exec proceeds");
                    None
                }
            }
        }
        Err(errno) => {
            tracing::warn!("fork for tracer failed: {errno}; exec uncolored");
            None
        }
    }
}

/// Under Yama ptrace_scope=1 only declared tracers (and their descendants)
/// may attach. Declaring ourselves lets our own forked child attach to us.
fn allow_descendant_tracer() {
    // SAFETY: plain prctl with integer arguments.
    let rc = unsafe {
        libc::prctl(
            libc::PR_SET_PTRACER,
            getpid().as_raw() as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };
    if rc != 0 {
        // EINVAL when Yama is not built in.
        tracing::trace!("PR_SET_PTRACER: {}", nix::errno::Errno::last());
    }
}

/// The tracer shares the shell's process group; ^C and friends aimed at the
/// foreground job must not end it before the tracee.
fn ignore_job_control_signals() {
    for sig in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGPIPE,
    ] {
        // SAFETY: installing SIG_IGN has no handler-safety requirements.
        unsafe {
            let _ = signal(sig, SigHandler::SigIgn);
        }
    }
}
