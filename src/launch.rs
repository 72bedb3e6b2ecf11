//! Launcher helpers: locate the preload library and build the shell command
//! that loads it.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::color::{Color, COLOR_ENV};
use crate::config::SHELL_ENV;
use crate::{PRELOAD_ENV, PRELOAD_LIB_NAME};

const YAMA_PTRACE_SCOPE: &str = "/proc/sys/kernel/yama/ptrace_scope";

/// Candidate preload paths in priority order: explicit flag, env override,
/// next to the running executable, then its parent (cargo `target/<profile>/deps` layouts).
pub fn preload_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = explicit {
        out.push(p.to_path_buf());
    }
    if let Some(p) = env::var_os(PRELOAD_ENV).filter(|v| !v.is_empty()) {
        out.push(PathBuf::from(p));
    }
    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            out.push(dir.join(PRELOAD_LIB_NAME));
            if let Some(up) = dir.parent() {
                out.push(up.join(PRELOAD_LIB_NAME));
            }
        }
    }
    out
}

pub fn find_preload(explicit: Option<&Path>) -> Option<PathBuf> {
    preload_candidates(explicit).into_iter().find(|p| p.is_file())
}

/// Prepend `lib` to an existing colon-separated `LD_PRELOAD`, without duplicating it.
pub fn prepend_ld_preload(existing: Option<&OsStr>, lib: &Path) -> OsString {
    let lib_s = lib.as_os_str().to_string_lossy().to_string();
    let rest: Vec<String> = existing
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
        .split([':', ' '])
        .filter(|s| !s.is_empty() && *s != lib_s)
        .map(str::to_string)
        .collect();
    let mut parts = vec![lib_s];
    parts.extend(rest);
    OsString::from(parts.join(":"))
}

/// Resolve the shell binary: explicit path/name, else `bash` from PATH.
pub fn resolve_shell(explicit: Option<&Path>) -> io::Result<PathBuf> {
    let wanted = explicit.unwrap_or_else(|| Path::new("bash"));
    if wanted.components().count() > 1 {
        if wanted.is_file() {
            return Ok(wanted.to_path_buf());
        }
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("shell not found: {}", wanted.display()),
        ));
    }
    which::which(wanted).map_err(|e| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("shell '{}' not found in PATH: {e}", wanted.display()),
        )
    })
}

/// Kernel comm name for an executable path (truncated to 15 bytes like `TASK_COMM_LEN`).
pub fn comm_name_for(shell: &Path) -> String {
    let name = shell
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    name.chars().take(15).collect()
}

/// Build the command that starts `shell` with the preload library armed.
pub fn build_shell_command(
    shell: &Path,
    preload: &Path,
    color: Option<Color>,
    args: &[String],
) -> Command {
    let mut cmd = Command::new(shell);
    cmd.args(args);
    let existing = env::var_os("LD_PRELOAD");
    cmd.env("LD_PRELOAD", prepend_ld_preload(existing.as_deref(), preload));
    cmd.env(SHELL_ENV, comm_name_for(shell));
    if let Some(c) = color {
        cmd.env(COLOR_ENV, c.as_str());
    }
    cmd
}

/// Human-readable preview of what would be exec'd.
pub fn preview(cmd: &Command) -> String {
    let mut parts: Vec<String> = cmd
        .get_envs()
        .filter_map(|(k, v)| v.map(|v| format!("{}={}", k.to_string_lossy(), v.to_string_lossy())))
        .collect();
    parts.push(cmd.get_program().to_string_lossy().to_string());
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

pub fn parse_ptrace_scope(s: &str) -> Option<u8> {
    s.trim().parse::<u8>().ok()
}

/// Yama ptrace_scope, `None` when Yama is absent.
pub fn ptrace_scope() -> Option<u8> {
    fs::read_to_string(YAMA_PTRACE_SCOPE)
        .ok()
        .and_then(|s| parse_ptrace_scope(&s))
}

/// Whether a process may attach to its own parent under the given scope.
/// Scope 1 is fine because the preload declares the tracer via PR_SET_PTRACER.
pub fn scope_allows_tracing(scope: Option<u8>) -> bool {
    matches!(scope, None | Some(0) | Some(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_ld_preload() {
        let lib = Path::new("/opt/lib/libstderr_color_preload.so");
        assert_eq!(prepend_ld_preload(None, lib), OsString::from(lib));
        assert_eq!(
            prepend_ld_preload(Some(OsStr::new("/a.so:/b.so")), lib),
            OsString::from("/opt/lib/libstderr_color_preload.so:/a.so:/b.so")
        );
        assert_eq!(
            prepend_ld_preload(
                Some(OsStr::new("/opt/lib/libstderr_color_preload.so /a.so")),
                lib
            ),
            OsString::from("/opt/lib/libstderr_color_preload.so:/a.so")
        );
    }

    #[test]
    fn test_comm_name_truncates() {
        assert_eq!(comm_name_for(Path::new("/bin/bash")), "bash");
        assert_eq!(
            comm_name_for(Path::new("/x/a-very-long-shell-name")),
            "a-very-long-she"
        );
    }

    #[test]
    fn test_ptrace_scope_parsing() {
        assert_eq!(parse_ptrace_scope("1\n"), Some(1));
        assert_eq!(parse_ptrace_scope("x"), None);
        assert!(scope_allows_tracing(None));
        assert!(scope_allows_tracing(Some(1)));
        assert!(!scope_allows_tracing(Some(2)));
        assert!(!scope_allows_tracing(Some(3)));
    }

    #[test]
    fn test_explicit_preload_first() {
        let td = tempfile::tempdir().expect("tmpdir");
        let lib = td.path().join(PRELOAD_LIB_NAME);
        std::fs::write(&lib, b"").expect("write");
        assert_eq!(preload_candidates(Some(&lib))[0], lib);
        assert_eq!(find_preload(Some(&lib)), Some(lib));
    }

    #[test]
    fn test_resolve_shell_missing_path() {
        let err = resolve_shell(Some(Path::new("/nonexistent/dir/bash"))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
