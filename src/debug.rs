use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

pub const DEBUG_ENV: &str = "THREADVIEW_DEBUG";
pub const DEBUG_LOG_ENV: &str = "THREADVIEW_DEBUG_LOG";

pub fn is_truthy(value: &str) -> bool {
    let trimmed = value.trim();
    !(trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("0")
        || trimmed.eq_ignore_ascii_case("false")
        || trimmed.eq_ignore_ascii_case("no")
        || trimmed.eq_ignore_ascii_case("off"))
}

fn enabled() -> bool {
    static FLAG: OnceCell<bool> = OnceCell::new();
    *FLAG.get_or_init(|| {
        std::env::var(DEBUG_ENV)
            .map(|val| is_truthy(&val))
            .unwrap_or(false)
    })
}

fn writer() -> Option<&'static Mutex<File>> {
    static WRITER: OnceCell<Option<Mutex<File>>> = OnceCell::new();
    WRITER
        .get_or_init(|| {
            std::env::var(DEBUG_LOG_ENV).ok().and_then(|path| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map(Mutex::new)
                    .ok()
            })
        })
        .as_ref()
}

/// Appends a timestamped line to the debug log when `THREADVIEW_DEBUG` is set.
/// Falls back to stderr, which the TUI hides, so set a log file when
/// running interactively.
pub fn log(message: impl AsRef<str>) {
    if !enabled() {
        return;
    }
    let line = format!("{} {}", Utc::now().format("%H:%M:%S%.3f"), message.as_ref());
    if let Some(writer) = writer() {
        let _ = writeln!(writer.lock(), "{line}");
        return;
    }
    eprintln!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for value in ["1", "true", "yes", "on", "debug"] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["", " ", "0", "false", "No", "OFF"] {
            assert!(!is_truthy(value), "{value:?}");
        }
    }
}
