use std::path::PathBuf;

use clap::{Parser, Subcommand};

use stderr_color::Color;

#[derive(Parser, Debug)]
#[command(
    name = "stderr-color",
    version,
    about = "Start an interactive shell whose stderr is colored by a syscall tracer.",
    override_usage = "stderr-color [OPTIONS] [COMMAND] [-- [SHELL-ARGS]]",
    after_long_help = "Examples:\n  stderr-color\n  stderr-color --color green -- --norc\n  stderr-color doctor\n  LD_PRELOAD=/path/libstderr_color_preload.so STDERR_COLOR=cyan bash\n\n",
    args_conflicts_with_subcommands = true
)]
pub(crate) struct Cli {
    /// Color for stderr output (overrides STDERR_COLOR)
    #[arg(long, value_enum)]
    pub(crate) color: Option<Color>,

    /// Shell to start; a name is looked up in PATH (default: bash)
    #[arg(long)]
    pub(crate) shell: Option<PathBuf>,

    /// Path to libstderr_color_preload.so (overrides STDERR_COLOR_PRELOAD)
    #[arg(long)]
    pub(crate) preload: Option<PathBuf>,

    /// Print what would run, but do not execute
    #[arg(long)]
    pub(crate) dry_run: bool,

    /// Print detailed execution info
    #[arg(long)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Option<Cmd>,

    /// Arguments passed through to the shell
    #[arg(last = true)]
    pub(crate) args: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Cmd {
    /// Check whether tracing can work on this host
    Doctor,
    /// Print every supported color name in its own color
    Colors,
}
