#![allow(clippy::module_name_repetitions)]
//! Stderr color resolution and ANSI painting helpers.
//!
//! Resolution policy:
//! - `STDERR_COLOR` names one of eight foreground colors, matched
//!   case-insensitively after trimming.
//! - Anything else (unset, empty, unknown) resolves to red.
//! - The end sequence is always the shared reset, whatever the start color.
//!
//! The `log_*_stderr` helpers are for the launcher only; nothing inside a
//! traced shell prints through them.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

/// Environment variable naming the stderr color.
pub const COLOR_ENV: &str = "STDERR_COLOR";

/// Reset sequence shared by every color.
pub const RESET: &[u8] = b"\x1b[0m";

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, ValueEnum)]
pub enum Color {
    Black,
    #[default]
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

/// Ordered name table; lookups compare the lowercased input against `name` exactly.
const COLOR_TABLE: &[(&str, Color, &[u8])] = &[
    ("black", Color::Black, b"\x1b[30m"),
    ("red", Color::Red, b"\x1b[31m"),
    ("green", Color::Green, b"\x1b[32m"),
    ("yellow", Color::Yellow, b"\x1b[33m"),
    ("blue", Color::Blue, b"\x1b[34m"),
    ("magenta", Color::Magenta, b"\x1b[35m"),
    ("cyan", Color::Cyan, b"\x1b[36m"),
    ("white", Color::White, b"\x1b[37m"),
];

impl Color {
    pub const ALL: [Color; 8] = [
        Color::Black,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::White,
    ];

    pub fn as_str(&self) -> &'static str {
        self.entry().0
    }

    /// "Set foreground color" escape for this color.
    pub fn start_code(&self) -> &'static [u8] {
        self.entry().2
    }

    fn entry(&self) -> &'static (&'static str, Color, &'static [u8]) {
        // COLOR_TABLE is laid out in declaration order.
        &COLOR_TABLE[*self as usize]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown color name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownColor(pub String);

impl fmt::Display for UnknownColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown color '{}'", self.0)
    }
}

impl std::error::Error for UnknownColor {}

impl FromStr for Color {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        COLOR_TABLE
            .iter()
            .find(|(name, _, _)| *name == wanted)
            .map(|(_, color, _)| *color)
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}

/// Start/end escape pair injected around each stderr write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorCode {
    pub color: Color,
    pub start: &'static [u8],
    pub end: &'static [u8],
}

impl ColorCode {
    pub fn new(color: Color) -> Self {
        ColorCode {
            color,
            start: color.start_code(),
            end: RESET,
        }
    }

    /// Resolve a requested name; absent or unrecognized input yields red.
    pub fn resolve(name: Option<&str>) -> Self {
        let color = name
            .and_then(|n| n.parse::<Color>().ok())
            .unwrap_or_default();
        ColorCode::new(color)
    }

    pub fn from_env() -> Self {
        let val = std::env::var(COLOR_ENV).ok();
        ColorCode::resolve(val.as_deref())
    }
}

impl Default for ColorCode {
    fn default() -> Self {
        ColorCode::new(Color::default())
    }
}

pub(crate) fn no_color_env() -> bool {
    // Per https://no-color.org/
    std::env::var("NO_COLOR").is_ok()
}

pub fn color_enabled_stdout() -> bool {
    !no_color_env() && atty::is(atty::Stream::Stdout)
}

pub fn color_enabled_stderr() -> bool {
    !no_color_env() && atty::is(atty::Stream::Stderr)
}

/// Wrap string with ANSI color code when enabled; otherwise return unchanged.
pub fn paint(enabled: bool, code: &str, s: &str) -> String {
    if enabled {
        format!("{code}{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

pub fn log_info_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, "\x1b[36;1m", msg));
}

pub fn log_warn_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, "\x1b[33m", msg));
}

pub fn log_error_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, "\x1b[31;1m", msg));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_variant_order() {
        for (i, c) in Color::ALL.iter().enumerate() {
            assert_eq!(COLOR_TABLE[i].1, *c);
            assert_eq!(c.start_code(), COLOR_TABLE[i].2);
        }
    }

    #[test]
    fn test_from_str_trims_and_lowercases() {
        assert_eq!(" Magenta\n".parse::<Color>(), Ok(Color::Magenta));
        assert!("magentas".parse::<Color>().is_err());
    }

    #[test]
    fn test_paint_disabled_passthrough() {
        assert_eq!(paint(false, "\x1b[31m", "x"), "x");
        assert_eq!(paint(true, "\x1b[31m", "x"), "\x1b[31mx\x1b[0m");
    }
}
