//! Logging setup.
//!
//! Everything logs through `tracing`. The subscriber writes to
//! `~/.looper/looper.log`, truncated on every start, so the terminal stays
//! free for command output.
//!
//! Level is INFO, or DEBUG with `--debug` or `LOOPER_DEBUG=1`. `RUST_LOG`
//! overrides both.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
// std rather than parking_lot: tracing_subscriber implements MakeWriter for std `Mutex<W>`.
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const DEBUG_ENV: &str = "LOOPER_DEBUG";

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

fn env_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Default filter directive for the given mode.
fn default_directive(debug: bool) -> &'static str {
    if debug {
        "looper=debug"
    } else {
        "looper=info"
    }
}

/// Install the global subscriber. Returns the log file path, or `None` when
/// logging falls back to stderr because no home directory is available.
///
/// Calling this twice is harmless; the second call keeps the first
/// subscriber.
pub fn init(debug: bool) -> Option<PathBuf> {
    let debug = debug || env_flag(std::env::var(DEBUG_ENV).ok().as_deref());
    DEBUG_ENABLED.store(debug, Ordering::SeqCst);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    let log_file = dirs::home_dir().map(|h| h.join(".looper")).and_then(|dir| {
        std::fs::create_dir_all(&dir).ok()?;
        let path = dir.join("looper.log");
        // File::create truncates.
        let file = File::create(&path).ok()?;
        Some((path, file))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false);

    match log_file {
        Some((path, file)) => {
            let _ = builder.with_writer(Mutex::new(file)).try_init();
            Some(path)
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
            None
        }
    }
}

/// Whether debug logging was requested.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}
