//! Per-architecture syscall register decoding.

use nix::unistd::Pid;

/// Syscall number and first argument captured at a syscall stop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SyscallArgs {
    pub nr: u64,
    pub arg0: u64,
    /// `Some` when the registers themselves reveal entry vs exit.
    pub at_entry: Option<bool>,
}

impl SyscallArgs {
    pub fn is_stderr_write(&self) -> bool {
        self.nr == libc::SYS_write as u64 && self.arg0 == libc::STDERR_FILENO as u64
    }
}

/// Whether this build can decode syscall registers at all.
pub const SUPPORTED: bool = cfg!(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
));

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub fn read(pid: Pid) -> nix::Result<SyscallArgs> {
    let regs = nix::sys::ptrace::getregs(pid)?;
    // The kernel preloads rax with -ENOSYS on syscall entry.
    let entry = regs.rax as i64 == -(libc::ENOSYS as i64);
    Ok(SyscallArgs {
        nr: regs.orig_rax,
        arg0: regs.rdi,
        at_entry: Some(entry),
    })
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
const PTRACE_GET_SYSCALL_INFO: libc::c_uint = 0x420e;
const SYSCALL_INFO_ENTRY: u8 = 1;
const SYSCALL_INFO_EXIT: u8 = 2;

/// `struct ptrace_syscall_info` from `<linux/ptrace.h>`; only `op` is read.
#[repr(C)]
#[allow(dead_code)]
struct SyscallInfo {
    op: u8,
    pad: [u8; 3],
    arch: u32,
    instruction_pointer: u64,
    stack_pointer: u64,
    data: [u64; 8],
}

/// Entry/exit hint from a `ptrace_syscall_info.op` value.
#[cfg_attr(not(target_arch = "aarch64"), allow(dead_code))]
fn entry_hint(op: u8) -> Option<bool> {
    match op {
        SYSCALL_INFO_ENTRY => Some(true),
        SYSCALL_INFO_EXIT => Some(false),
        _ => None,
    }
}

/// Ask the kernel (5.3+) which side of the syscall the tracee stopped on.
/// `None` on older kernels, where callers fall back to stop parity.
#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
fn syscall_stop_side(pid: Pid) -> Option<bool> {
    use std::mem;

    // SAFETY: SyscallInfo is plain data; the kernel writes at most the size passed.
    let mut info: SyscallInfo = unsafe { mem::zeroed() };
    let rc = unsafe {
        libc::ptrace(
            PTRACE_GET_SYSCALL_INFO as _,
            pid.as_raw(),
            mem::size_of::<SyscallInfo>() as *mut libc::c_void,
            &mut info as *mut SyscallInfo as *mut libc::c_void,
        )
    };
    if rc <= 0 {
        return None;
    }
    entry_hint(info.op)
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
pub fn read(pid: Pid) -> nix::Result<SyscallArgs> {
    use std::mem;

    // SAFETY: user_regs_struct is plain data; the kernel fills at most iov_len bytes.
    let mut regs: libc::user_regs_struct = unsafe { mem::zeroed() };
    let mut iov = libc::iovec {
        iov_base: &mut regs as *mut libc::user_regs_struct as *mut libc::c_void,
        iov_len: mem::size_of::<libc::user_regs_struct>(),
    };
    let rc = unsafe {
        libc::ptrace(
            libc::PTRACE_GETREGSET,
            pid.as_raw(),
            libc::NT_PRSTATUS as usize as *mut libc::c_void,
            &mut iov as *mut libc::iovec as *mut libc::c_void,
        )
    };
    if rc == -1 {
        return Err(nix::errno::Errno::last());
    }
    // x8 holds the syscall number; x0 is arg0 on entry and the result on exit,
    // so without the kernel's hint a failed execve can leave parity guessing.
    Ok(SyscallArgs {
        nr: regs.regs[8],
        arg0: regs.regs[0],
        at_entry: syscall_stop_side(pid),
    })
}

#[cfg(not(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
)))]
pub fn read(_pid: Pid) -> nix::Result<SyscallArgs> {
    Err(nix::errno::Errno::ENOSYS)
}
