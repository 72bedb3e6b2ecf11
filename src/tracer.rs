//! Syscall tracer: steps an attached shell through its syscalls and brackets
//! every `write(2, ...)` with the configured color start/reset sequences.
//!
//! States: attaching -> tracing -> (color pending <-> tracing) -> exited.
//! A start sequence is emitted at the syscall-entry stop of a stderr write;
//! the reset is emitted at the very next stop of any kind, before that stop
//! is classified. Only entries are classified, so starts and resets strictly
//! alternate.

mod ptrace;
pub mod regs;

use std::io::{self, Write};
use std::os::fd::{BorrowedFd, RawFd};

use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::color::ColorCode;
use crate::config::Config;
use crate::errors::{exit_code_for_trace_error, TraceError};
use crate::gate::SyncGate;

pub use self::ptrace::PtraceTracee;
pub use self::regs::SyscallArgs;

/// One observed stop of the tracee.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stop {
    /// Syscall entry or exit boundary.
    Syscall,
    /// The tracee replaced its image; the next boundary is the exit of `execve`.
    Exec,
    /// Signal-delivery stop; the signal is re-injected on resume.
    Signal(Signal),
    /// Group-stop (job control); the tracee is parked until SIGCONT.
    GroupStop(Signal),
    /// Any other ptrace event or group stop.
    Event,
    Exited(i32),
    Killed(Signal),
}

/// How a session ended when the trace loop itself did not fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Exited(i32),
    Killed(Signal),
}

/// Control surface over a stopped/running tracee.
pub trait Tracee {
    fn pid(&self) -> Pid;
    /// First resume after attach.
    fn start(&mut self) -> Result<(), TraceError>;
    fn wait_stop(&mut self) -> Result<Stop, TraceError>;
    fn syscall_args(&mut self) -> Result<SyscallArgs, TraceError>;
    /// Continue to the next syscall boundary, optionally delivering `signal`.
    fn resume(&mut self, signal: Option<Signal>) -> Result<(), TraceError>;
    /// Leave the tracee stopped in its group-stop while still reporting
    /// later stops (`PTRACE_LISTEN`).
    fn listen(&mut self) -> Result<(), TraceError>;
    /// Best-effort detach on error paths.
    fn detach(&mut self);
}

pub struct TraceSession<'a, T: Tracee, W: Write> {
    tracee: T,
    out: W,
    color: &'a ColorCode,
    pending_reset: bool,
    in_syscall: bool,
}

impl<'a, T: Tracee, W: Write> TraceSession<'a, T, W> {
    pub fn new(tracee: T, out: W, color: &'a ColorCode) -> Self {
        TraceSession {
            tracee,
            out,
            color,
            pending_reset: false,
            in_syscall: false,
        }
    }

    pub fn pending_reset(&self) -> bool {
        self.pending_reset
    }

    pub fn into_parts(self) -> (T, W) {
        (self.tracee, self.out)
    }

    /// Drive the tracee until it terminates. On any loop error the tracee is
    /// detached and a pending reset is still emitted.
    pub fn run(&mut self) -> Result<Outcome, TraceError> {
        let result = self.tracee.start().and_then(|_| self.trace());
        if let Err(e) = &result {
            let _ = self.emit_reset_if_pending();
            tracing::debug!(pid = self.tracee.pid().as_raw(), "detaching: {e}");
            self.tracee.detach();
        }
        result
    }

    fn trace(&mut self) -> Result<Outcome, TraceError> {
        loop {
            let stop = self.tracee.wait_stop()?;
            self.emit_reset_if_pending()?;
            match stop {
                Stop::Exited(code) => return Ok(Outcome::Exited(code)),
                Stop::Killed(sig) => return Ok(Outcome::Killed(sig)),
                Stop::Syscall => {
                    self.on_syscall_stop()?;
                    self.tracee.resume(None)?;
                }
                Stop::Exec => {
                    self.in_syscall = true;
                    self.tracee.resume(None)?;
                }
                Stop::Signal(sig) => self.tracee.resume(Some(sig))?,
                Stop::GroupStop(_) => self.tracee.listen()?,
                Stop::Event => self.tracee.resume(None)?,
            }
        }
    }

    fn on_syscall_stop(&mut self) -> Result<(), TraceError> {
        let args = self.tracee.syscall_args()?;
        let entering = args.at_entry.unwrap_or(!self.in_syscall);
        self.in_syscall = entering;
        if entering && args.is_stderr_write() {
            self.out.write_all(self.color.start)?;
            self.out.flush()?;
            self.pending_reset = true;
        }
        Ok(())
    }

    fn emit_reset_if_pending(&mut self) -> Result<(), TraceError> {
        if self.pending_reset {
            self.pending_reset = false;
            self.out.write_all(self.color.end)?;
            self.out.flush()?;
        }
        Ok(())
    }
}

/// Unbuffered writer over an inherited descriptor.
pub struct FdWriter {
    fd: RawFd,
}

impl FdWriter {
    pub fn new(fd: RawFd) -> Self {
        FdWriter { fd }
    }
}

impl Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: fd is one of the standard descriptors inherited from the tracee.
        let fd = unsafe { BorrowedFd::borrow_raw(self.fd) };
        nix::unistd::write(fd, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Tracer process body. Attaches to `tracee_pid`, releases the gate on every
/// path, traces until the tracee is gone, and returns the tracer exit status.
pub fn run_tracer(cfg: &Config, tracee_pid: Pid, gate: &SyncGate) -> i32 {
    let attached = PtraceTracee::attach(tracee_pid);
    gate.signal();
    let tracee = match attached {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(pid = tracee_pid.as_raw(), "{e}");
            return exit_code_for_trace_error(&e);
        }
    };
    tracing::debug!(pid = tracee_pid.as_raw(), color = %cfg.color.color, "attached");

    let mut session = TraceSession::new(tracee, FdWriter::new(cfg.output.fd()), &cfg.color);
    match session.run() {
        Ok(Outcome::Exited(code)) => {
            tracing::debug!(pid = tracee_pid.as_raw(), code, "tracee exited");
            0
        }
        Ok(Outcome::Killed(sig)) => {
            tracing::debug!(pid = tracee_pid.as_raw(), signal = %sig, "tracee killed");
            0
        }
        Err(e) => {
            tracing::error!(pid = tracee_pid.as_raw(), "trace aborted: {e}");
            exit_code_for_trace_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use nix::errno::Errno;
    use std::collections::VecDeque;

    const WRITE: u64 = libc::SYS_write as u64;
    const READ: u64 = libc::SYS_read as u64;

    #[derive(Default)]
    struct Scripted {
        stops: VecDeque<Result<Stop, TraceError>>,
        args: VecDeque<SyscallArgs>,
        resumed: Vec<Option<Signal>>,
        listened: usize,
        started: bool,
        detached: bool,
    }

    impl Scripted {
        fn stop(mut self, s: Stop) -> Self {
            self.stops.push_back(Ok(s));
            self
        }
        fn syscall(mut self, nr: u64, fd: u64) -> Self {
            self.stops.push_back(Ok(Stop::Syscall));
            self.args.push_back(SyscallArgs {
                nr,
                arg0: fd,
                at_entry: None,
            });
            self
        }
        fn fail(mut self, e: TraceError) -> Self {
            self.stops.push_back(Err(e));
            self
        }
    }

    impl Tracee for Scripted {
        fn pid(&self) -> Pid {
            Pid::from_raw(4242)
        }
        fn start(&mut self) -> Result<(), TraceError> {
            self.started = true;
            Ok(())
        }
        fn wait_stop(&mut self) -> Result<Stop, TraceError> {
            self.stops
                .pop_front()
                .unwrap_or(Err(TraceError::Wait(Errno::ECHILD)))
        }
        fn syscall_args(&mut self) -> Result<SyscallArgs, TraceError> {
            self.args
                .pop_front()
                .ok_or(TraceError::Registers(Errno::ESRCH))
        }
        fn resume(&mut self, signal: Option<Signal>) -> Result<(), TraceError> {
            self.resumed.push(signal);
            Ok(())
        }
        fn listen(&mut self) -> Result<(), TraceError> {
            self.listened += 1;
            Ok(())
        }
        fn detach(&mut self) {
            self.detached = true;
        }
    }

    fn run(script: Scripted, color: Color) -> (Result<Outcome, TraceError>, Scripted, Vec<u8>) {
        let code = ColorCode::new(color);
        let mut s = TraceSession::new(script, Vec::new(), &code);
        let res = s.run();
        assert!(!s.pending_reset());
        let (t, out) = s.into_parts();
        (res, t, out)
    }

    #[test]
    fn test_stderr_write_bracketed_once() {
        // entry + exit of write(2, ...), then exit
        let script = Scripted::default()
            .syscall(WRITE, 2)
            .syscall(WRITE, 2)
            .stop(Stop::Exited(0));
        let (res, t, out) = run(script, Color::Green);
        assert_eq!(res.unwrap(), Outcome::Exited(0));
        assert_eq!(out, b"\x1b[32m\x1b[0m".to_vec());
        assert!(t.started);
        assert_eq!(t.resumed, vec![None, None]);
    }

    #[test]
    fn test_stdout_write_not_colored() {
        let script = Scripted::default()
            .syscall(WRITE, 1)
            .syscall(WRITE, 1)
            .syscall(READ, 2)
            .syscall(READ, 2)
            .stop(Stop::Exited(0));
        let (_, _, out) = run(script, Color::Red);
        assert!(out.is_empty());
    }

    #[test]
    fn test_no_writes_no_sequences_and_clean_exit() {
        let script = Scripted::default().stop(Stop::Exited(3));
        let (res, t, out) = run(script, Color::Blue);
        assert_eq!(res.unwrap(), Outcome::Exited(3));
        assert!(out.is_empty());
        assert!(!t.detached);
    }

    #[test]
    fn test_consecutive_stderr_writes_never_nest() {
        let script = Scripted::default()
            .syscall(WRITE, 2)
            .syscall(WRITE, 2)
            .syscall(WRITE, 1)
            .syscall(WRITE, 1)
            .syscall(WRITE, 2)
            .syscall(WRITE, 2)
            .stop(Stop::Exited(0));
        let (_, _, out) = run(script, Color::Yellow);
        let expected = [b"\x1b[33m".as_slice(), b"\x1b[0m", b"\x1b[33m", b"\x1b[0m"].concat();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_reset_on_next_stop_even_if_signal() {
        let script = Scripted::default()
            .syscall(WRITE, 2)
            .stop(Stop::Signal(Signal::SIGWINCH))
            .syscall(WRITE, 2)
            .stop(Stop::Exited(0));
        let (_, t, out) = run(script, Color::Cyan);
        // reset lands at the signal stop; the exit boundary is not an entry
        assert_eq!(out, b"\x1b[36m\x1b[0m".to_vec());
        assert_eq!(t.resumed, vec![None, Some(Signal::SIGWINCH), None]);
    }

    #[test]
    fn test_group_stop_is_parked_not_restarted() {
        // ^Z during a stderr write: the job must stay suspended until SIGCONT
        let script = Scripted::default()
            .syscall(WRITE, 2)
            .stop(Stop::GroupStop(Signal::SIGTSTP))
            .stop(Stop::Signal(Signal::SIGCONT))
            .syscall(WRITE, 2)
            .stop(Stop::Exited(0));
        let (res, t, out) = run(script, Color::Red);
        assert_eq!(res.unwrap(), Outcome::Exited(0));
        assert_eq!(out, b"\x1b[31m\x1b[0m".to_vec());
        assert_eq!(t.listened, 1);
        assert_eq!(t.resumed, vec![None, Some(Signal::SIGCONT), None]);
    }

    #[test]
    fn test_pending_reset_flushed_when_tracee_killed() {
        let script = Scripted::default()
            .syscall(WRITE, 2)
            .stop(Stop::Killed(Signal::SIGKILL));
        let (res, _, out) = run(script, Color::Magenta);
        assert_eq!(res.unwrap(), Outcome::Killed(Signal::SIGKILL));
        assert_eq!(out, b"\x1b[35m\x1b[0m".to_vec());
    }

    #[test]
    fn test_exec_event_resyncs_entry_parity() {
        // execve entry, exec event, execve exit, then a real stderr write
        let script = Scripted::default()
            .syscall(libc::SYS_execve as u64, 0)
            .stop(Stop::Exec)
            .syscall(libc::SYS_execve as u64, 0)
            .syscall(WRITE, 2)
            .syscall(WRITE, 2)
            .stop(Stop::Exited(0));
        let (_, _, out) = run(script, Color::White);
        assert_eq!(out, b"\x1b[37m\x1b[0m".to_vec());
    }

    #[test]
    fn test_entry_hint_overrides_parity() {
        let code = ColorCode::new(Color::Red);
        let mut script = Scripted::default();
        // Attached mid-syscall: first observed stop is an exit
        script.stops.push_back(Ok(Stop::Syscall));
        script.args.push_back(SyscallArgs { nr: READ, arg0: 0, at_entry: Some(false) });
        script.stops.push_back(Ok(Stop::Syscall));
        script.args.push_back(SyscallArgs { nr: WRITE, arg0: 2, at_entry: Some(true) });
        script.stops.push_back(Ok(Stop::Exited(0)));
        let mut s = TraceSession::new(script, Vec::new(), &code);
        s.run().expect("run");
        let (_, out) = s.into_parts();
        assert_eq!(out, b"\x1b[31m\x1b[0m".to_vec());
    }

    #[test]
    fn test_wait_error_detaches_and_resets() {
        let script = Scripted::default()
            .syscall(WRITE, 2)
            .fail(TraceError::Wait(Errno::EINTR));
        let (res, t, out) = run(script, Color::Red);
        assert!(matches!(res, Err(TraceError::Wait(Errno::EINTR))));
        assert!(t.detached);
        assert_eq!(out, b"\x1b[31m\x1b[0m".to_vec());
    }
}
