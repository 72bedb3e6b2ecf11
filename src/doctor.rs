use std::env;
use std::path::Path;

use stderr_color::launch;
use stderr_color::tracer::regs;
use stderr_color::{Color, ColorCode, Config, PRELOAD_LIB_NAME};

fn yes_no(use_color: bool, ok: bool) -> String {
    let (code, word) = if ok {
        ("\x1b[32;1m", "yes")
    } else {
        ("\x1b[31;1m", "no")
    };
    stderr_color::paint(use_color, code, word)
}

pub(crate) fn run_doctor(preload: Option<&Path>, verbose: bool) -> bool {
    let use_err = stderr_color::color_enabled_stderr();
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("stderr-color doctor");
    eprintln!();
    eprintln!("  version: v{}", version);
    eprintln!(
        "  host:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if verbose {
        eprintln!("  build:   {}", env!("STDERR_COLOR_BUILD_DATE"));
        eprintln!("  target:  {}", env!("STDERR_COLOR_BUILD_TARGET"));
        eprintln!("  profile: {}", env!("STDERR_COLOR_BUILD_PROFILE"));
        eprintln!("  rustc:   {}", env!("STDERR_COLOR_BUILD_RUSTC"));
    }
    eprintln!();

    let arch_ok = regs::SUPPORTED;
    eprintln!("  syscall register decoding: {}", yes_no(use_err, arch_ok));

    let scope = launch::ptrace_scope();
    let scope_ok = launch::scope_allows_tracing(scope);
    let scope_txt = match scope {
        Some(s) => s.to_string(),
        None => "absent (no Yama)".to_string(),
    };
    eprintln!(
        "  yama ptrace_scope:         {} (tracing allowed: {})",
        scope_txt,
        yes_no(use_err, scope_ok)
    );

    let found = launch::find_preload(preload);
    match &found {
        Some(p) => eprintln!("  preload library:           {}", p.display()),
        None => {
            eprintln!("  preload library:           {}", yes_no(use_err, false));
            if verbose {
                for c in launch::preload_candidates(preload) {
                    eprintln!("    tried: {}", c.display());
                }
            }
        }
    }
    let armed = env::var_os("LD_PRELOAD")
        .map(|v| v.to_string_lossy().contains(PRELOAD_LIB_NAME))
        .unwrap_or(false);
    eprintln!("  loaded in this shell:      {}", yes_no(use_err, armed));

    let cfg = Config::from_env();
    let code = ColorCode::from_env();
    let sample = stderr_color::paint(
        use_err,
        &String::from_utf8_lossy(code.start),
        code.color.as_str(),
    );
    eprintln!("  stderr color:              {}", sample);
    eprintln!("  target shell name:         {}", cfg.shell_name);
    eprintln!("  escape codes written to:   {:?}", cfg.output);
    eprintln!("  gate timeout:              {:?}", cfg.gate_timeout);
    eprintln!("  enabled:                   {}", yes_no(use_err, cfg.enabled));
    eprintln!(
        "  stdout/stderr tty:         {}/{}",
        atty::is(atty::Stream::Stdout),
        atty::is(atty::Stream::Stderr)
    );
    eprintln!();

    arch_ok && scope_ok && found.is_some() && cfg.enabled
}

pub(crate) fn print_colors() {
    let use_out = stderr_color::color_enabled_stdout();
    for c in Color::ALL {
        let code = String::from_utf8_lossy(c.start_code()).to_string();
        println!("{}", stderr_color::paint(use_out, &code, c.as_str()));
    }
}
