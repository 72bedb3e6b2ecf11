use std::os::unix::process::CommandExt;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use stderr_color::launch;

mod cli;
mod doctor;

use cli::{Cli, Cmd};

fn run_shell(cli: &Cli) -> Result<ExitCode> {
    let shell = launch::resolve_shell(cli.shell.as_deref()).context("cannot start shell")?;
    let preload = launch::find_preload(cli.preload.as_deref()).ok_or_else(|| {
        anyhow!(
            "{} not found; build the preload crate or pass --preload (see `stderr-color doctor`)",
            stderr_color::PRELOAD_LIB_NAME
        )
    })?;

    let use_err = stderr_color::color_enabled_stderr();
    let scope = launch::ptrace_scope();
    if !launch::scope_allows_tracing(scope) {
        stderr_color::log_warn_stderr(
            use_err,
            &format!(
                "stderr-color: kernel.yama.ptrace_scope={} blocks tracing; stderr stays uncolored",
                scope.unwrap_or_default()
            ),
        );
    }

    let mut cmd = launch::build_shell_command(&shell, &preload, cli.color, &cli.args);
    if cli.verbose || cli.dry_run {
        stderr_color::log_info_stderr(use_err, &format!("stderr-color: {}", launch::preview(&cmd)));
    }
    if cli.dry_run {
        return Ok(ExitCode::from(0));
    }

    // Only returns on failure.
    let err = cmd.exec();
    Err(err).with_context(|| format!("failed to exec {}", shell.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match &cli.command {
        Some(Cmd::Doctor) => {
            let ok = doctor::run_doctor(cli.preload.as_deref(), cli.verbose);
            return ExitCode::from(if ok { 0 } else { 1 });
        }
        Some(Cmd::Colors) => {
            doctor::print_colors();
            return ExitCode::from(0);
        }
        None => {}
    }

    match run_shell(&cli) {
        Ok(code) => code,
        Err(e) => {
            let use_err = stderr_color::color_enabled_stderr();
            stderr_color::log_error_stderr(use_err, &format!("stderr-color: {e:#}"));
            let code = e
                .downcast_ref::<std::io::Error>()
                .map(stderr_color::exit_code_for_io_error)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
