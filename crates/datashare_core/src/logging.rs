//! Process-wide rolling file logs.
//!
//! # Responsibility
//! - Start the file logger at most once per process.
//! - Capture panics from routing and repository code as metadata-only events.
//!
//! # Invariants
//! - Repeating initialization with identical settings is a no-op.
//! - Switching level or directory after startup is rejected, not applied.
//! - Initialization never panics.

use crate::config::LoggingSettings;
use crate::error::{DataError, DataResult};
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "datashare";
const ROTATE_AT_BYTES: u64 = 8 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 7;
const PANIC_SUMMARY_LIMIT: usize = 200;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogTarget {
    level: &'static str,
    dir: PathBuf,
}

struct ActiveLogger {
    target: LogTarget,
    _handle: LoggerHandle,
}

/// Starts rolling file logging under `log_dir`.
///
/// # Errors
/// - `Configuration` when the level is unknown, the directory is relative
///   or cannot be created, the backend fails to start, or logging is already
///   active with different settings.
pub fn init_logging(level: &str, log_dir: &str) -> DataResult<()> {
    let requested = LogTarget {
        level: parse_level(level)?,
        dir: absolute_dir(log_dir)?,
    };

    let active = ACTIVE.get_or_try_init(|| start(&requested))?;
    ensure_same_target(&active.target, &requested)
}

/// Starts logging from the optional `logging` config section.
pub fn init_from_settings(settings: &LoggingSettings) -> DataResult<()> {
    init_logging(&settings.level, &settings.dir)
}

/// Returns `(level, dir)` once logging is active.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.target.level, active.target.dir.clone()))
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(target: &LogTarget) -> DataResult<ActiveLogger> {
    std::fs::create_dir_all(&target.dir).map_err(|err| {
        DataError::Configuration(format!(
            "cannot create log directory `{}`: {err}",
            target.dir.display()
        ))
    })?;

    let handle = Logger::try_with_str(target.level)
        .map_err(|err| DataError::Configuration(format!("invalid log level `{}`: {err}", target.level)))?
        .log_to_file(
            FileSpec::default()
                .directory(target.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| DataError::Configuration(format!("cannot start logger: {err}")))?;

    install_panic_hook();

    info!(
        "event=logging_start module=logging status=ok level={} log_dir={} version={}",
        target.level,
        target.dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        target: target.clone(),
        _handle: handle,
    })
}

fn ensure_same_target(active: &LogTarget, requested: &LogTarget) -> DataResult<()> {
    if active == requested {
        return Ok(());
    }
    Err(DataError::Configuration(format!(
        "logging already active with level `{}` at `{}`; refusing `{}` at `{}`",
        active.level,
        active.dir.display(),
        requested.level,
        requested.dir.display()
    )))
}

fn parse_level(level: &str) -> DataResult<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(DataError::Configuration(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        ))),
    }
}

fn absolute_dir(log_dir: &str) -> DataResult<PathBuf> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err(DataError::Configuration("log dir cannot be empty".to_string()));
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(DataError::Configuration(format!(
            "log dir must be absolute, got `{trimmed}`"
        )));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        error!(
            "event=panic_captured module=logging status=error thread={} location={} payload={}",
            thread,
            location,
            summarize_panic(info)
        );
        previous(info);
    }));
}

fn summarize_panic(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    let text = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    single_line(&text, PANIC_SUMMARY_LIMIT)
}

/// Flattens line breaks and caps length so one event stays on one line.
fn single_line(value: &str, max_chars: usize) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::{absolute_dir, init_logging, logging_status, parse_level, single_line};
    use crate::error::DataError;

    #[test]
    fn parse_level_accepts_aliases() {
        assert_eq!(parse_level(" WARNING ").unwrap(), "warn");
        assert_eq!(parse_level("Trace").unwrap(), "trace");
        assert!(matches!(parse_level("verbose"), Err(DataError::Configuration(_))));
    }

    #[test]
    fn absolute_dir_rejects_relative_and_blank() {
        assert!(matches!(absolute_dir("logs"), Err(DataError::Configuration(_))));
        assert!(matches!(absolute_dir("  "), Err(DataError::Configuration(_))));
    }

    #[test]
    fn single_line_flattens_and_caps() {
        assert_eq!(single_line("a\nb", 10), "a b");
        let capped = single_line("abcdefghij\rklm", 4);
        assert_eq!(capped, "abcd...");
    }

    #[test]
    fn init_is_idempotent_and_rejects_changes() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let first_dir = first.path().to_str().unwrap().to_string();
        let second_dir = second.path().to_str().unwrap().to_string();

        init_logging("info", &first_dir).unwrap();
        init_logging("INFO", &first_dir).unwrap();

        let err = init_logging("debug", &first_dir).unwrap_err();
        assert!(err.to_string().contains("refusing"));
        let err = init_logging("info", &second_dir).unwrap_err();
        assert!(err.to_string().contains("refusing"));

        let (level, dir) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(dir, first.path());
    }
}
