#![allow(dead_code)]

use std::os::fd::{AsRawFd, OwnedFd};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

/// Whether this host lets a process ptrace-attach to a child it forked.
pub fn ptrace_available() -> bool {
    if stderr_color::launch::ptrace_scope().is_some_and(|s| s >= 2) {
        return false;
    }
    // SAFETY: the child only pauses until killed.
    let child = match unsafe { fork() } {
        Ok(ForkResult::Child) => loop {
            nix::unistd::pause();
        },
        Ok(ForkResult::Parent { child }) => child,
        Err(_) => return false,
    };
    let ok = ptrace::attach(child).is_ok();
    let _ = kill(child, Signal::SIGKILL);
    let _ = waitpid(child, None);
    ok
}

/// Poll `pid` until it exits or `timeout` elapses; kills it on timeout.
pub fn wait_child(pid: Pid, timeout: Duration) -> Option<WaitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {}
            Ok(status) => return Some(status),
            Err(_) => return None,
        }
        if Instant::now() >= deadline {
            let _ = kill(pid, Signal::SIGKILL);
            let _ = waitpid(pid, None);
            return None;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Read a pipe until every writer has closed it.
pub fn read_to_end(fd: OwnedFd) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match nix::unistd::read(fd.as_raw_fd(), &mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
    out
}

/// Position of `needle` in `hay`, if present.
pub fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    hay.windows(needle.len()).position(|w| w == needle)
}

pub fn printable(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\x1b', "\\e")
}
