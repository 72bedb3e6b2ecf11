use nix::errno::Errno;
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use super::regs::{self, SyscallArgs};
use super::{Stop, Tracee};
use crate::errors::TraceError;

/// Real tracee driven through `ptrace(2)`.
///
/// Attached with `PTRACE_SEIZE`, so group-stops arrive as
/// `PTRACE_EVENT_STOP` carrying the stopping signal and can be parked with
/// `PTRACE_LISTEN` instead of being restarted.
#[derive(Debug)]
pub struct PtraceTracee {
    pid: Pid,
    /// Signal that arrived ahead of the interrupt stop, delivered on start.
    initial_signal: Option<Signal>,
}

impl PtraceTracee {
    /// `PTRACE_SEIZE` with syscall-stop marking and exec events, then
    /// `PTRACE_INTERRUPT` and wait for the tracee to stop. The tracee is
    /// left stopped.
    pub fn attach(pid: Pid) -> Result<Self, TraceError> {
        let attach_err = |errno| TraceError::Attach {
            pid: pid.as_raw(),
            errno,
        };
        let opts = Options::PTRACE_O_TRACESYSGOOD | Options::PTRACE_O_TRACEEXEC;
        ptrace::seize(pid, opts).map_err(attach_err)?;
        if let Err(errno) = ptrace::interrupt(pid) {
            let _ = ptrace::detach(pid, None);
            return Err(attach_err(errno));
        }

        let initial_signal = loop {
            match waitpid(pid, Some(WaitPidFlag::__WALL)) {
                Ok(WaitStatus::PtraceEvent(..)) | Ok(WaitStatus::PtraceSyscall(_)) => break None,
                // The interrupt stop follows once this signal is delivered.
                Ok(WaitStatus::Stopped(_, sig)) => break Some(sig),
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => {
                    return Err(attach_err(Errno::ESRCH))
                }
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    let _ = ptrace::detach(pid, None);
                    return Err(TraceError::Wait(errno));
                }
            }
        };

        Ok(PtraceTracee {
            pid,
            initial_signal,
        })
    }
}

/// Map a wait status of a seized tracee to a [`Stop`].
fn classify(status: WaitStatus) -> Stop {
    match status {
        WaitStatus::PtraceSyscall(_) => Stop::Syscall,
        WaitStatus::PtraceEvent(_, _, ev) if ev == libc::PTRACE_EVENT_EXEC => Stop::Exec,
        // Interrupt and SIGCONT traps report SIGTRAP; group-stops report the stop signal.
        WaitStatus::PtraceEvent(_, sig, ev)
            if ev == libc::PTRACE_EVENT_STOP && sig != Signal::SIGTRAP =>
        {
            Stop::GroupStop(sig)
        }
        WaitStatus::PtraceEvent(..) => Stop::Event,
        WaitStatus::Stopped(_, sig) => Stop::Signal(sig),
        WaitStatus::Exited(_, code) => Stop::Exited(code),
        WaitStatus::Signaled(_, sig, _) => Stop::Killed(sig),
        _ => Stop::Event,
    }
}

impl Tracee for PtraceTracee {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn start(&mut self) -> Result<(), TraceError> {
        let sig = self.initial_signal.take();
        ptrace::syscall(self.pid, sig).map_err(TraceError::Resume)
    }

    fn wait_stop(&mut self) -> Result<Stop, TraceError> {
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::__WALL)) {
                Ok(status) => return Ok(classify(status)),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(TraceError::Wait(errno)),
            }
        }
    }

    fn syscall_args(&mut self) -> Result<SyscallArgs, TraceError> {
        regs::read(self.pid).map_err(TraceError::Registers)
    }

    fn resume(&mut self, signal: Option<Signal>) -> Result<(), TraceError> {
        match ptrace::syscall(self.pid, signal) {
            Ok(()) => Ok(()),
            // Tracee vanished; the next wait reports how.
            Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(TraceError::Resume(errno)),
        }
    }

    fn listen(&mut self) -> Result<(), TraceError> {
        // nix has no wrapper for PTRACE_LISTEN.
        // SAFETY: PTRACE_LISTEN takes no address or data.
        let rc = unsafe {
            libc::ptrace(
                libc::PTRACE_LISTEN,
                self.pid.as_raw(),
                std::ptr::null_mut::<libc::c_void>(),
                std::ptr::null_mut::<libc::c_void>(),
            )
        };
        if rc == -1 {
            return match Errno::last() {
                Errno::ESRCH => Ok(()),
                errno => Err(TraceError::Resume(errno)),
            };
        }
        Ok(())
    }

    fn detach(&mut self) {
        if let Err(errno) = ptrace::detach(self.pid, None) {
            tracing::debug!(pid = self.pid.as_raw(), "detach failed: {errno}");
        }
    }
}
