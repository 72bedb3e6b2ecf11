//! `LD_PRELOAD` entry points for stderr-color.
//!
//! Exports `fwrite` (arms tracing once the shell draws its prompt) and
//! `execve` (forks the tracer before the real exec). Both always forward to
//! the next definition in link order with the caller's arguments.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};

use stderr_color::config;
use stderr_color::intercept::{intercept_exec, TERMINAL_READY};

type ExecveFn = unsafe extern "C" fn(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int;

type FwriteFn = unsafe extern "C" fn(
    ptr: *const c_void,
    size: libc::size_t,
    nitems: libc::size_t,
    stream: *mut libc::FILE,
) -> libc::size_t;

static ORIGINAL_EXECVE: AtomicUsize = AtomicUsize::new(0);
static ORIGINAL_FWRITE: AtomicUsize = AtomicUsize::new(0);

unsafe fn resolve_next(slot: &AtomicUsize, symbol: &CStr) -> usize {
    let cached = slot.load(Ordering::Acquire);
    if cached != 0 {
        return cached;
    }
    let p = libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr()) as usize;
    slot.store(p, Ordering::Release);
    p
}

unsafe fn original_execve() -> Option<ExecveFn> {
    match resolve_next(&ORIGINAL_EXECVE, c"execve") {
        0 => None,
        p => Some(core::mem::transmute::<usize, ExecveFn>(p)),
    }
}

unsafe fn original_fwrite() -> Option<FwriteFn> {
    match resolve_next(&ORIGINAL_FWRITE, c"fwrite") {
        0 => None,
        p => Some(core::mem::transmute::<usize, FwriteFn>(p)),
    }
}

unsafe fn set_errno(code: c_int) {
    *libc::__errno_location() = code;
}

#[ctor::ctor]
unsafe fn stderr_color_init() {
    let cfg = config::init();
    stderr_color::logging::init(cfg);
    let _ = original_execve();
    let _ = original_fwrite();
    tracing::debug!(
        pid = std::process::id(),
        is_shell = cfg.is_shell,
        color = %cfg.color.color,
        "preload initialised"
    );
}

/// # Safety
/// Same contract as libc `fwrite`.
#[no_mangle]
pub unsafe extern "C" fn fwrite(
    ptr: *const c_void,
    size: libc::size_t,
    nitems: libc::size_t,
    stream: *mut libc::FILE,
) -> libc::size_t {
    let Some(real) = original_fwrite() else {
        set_errno(libc::ENOSYS);
        return 0;
    };
    let written = real(ptr, size, nitems, stream);
    if let Some(cfg) = config::get() {
        TERMINAL_READY.note_buffered_write(cfg);
    }
    written
}

/// # Safety
/// Same contract as libc `execve`.
#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let Some(real) = original_execve() else {
        set_errno(libc::ENOSYS);
        return -1;
    };
    match config::get() {
        Some(cfg) => intercept_exec(cfg, &TERMINAL_READY, || real(path, argv, envp)),
        None => real(path, argv, envp),
    }
}
