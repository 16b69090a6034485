//! Process logging for identity resolution.
//!
//! # Responsibility
//! - Start one rolling file logger per process.
//! - Keep contact values out of the log: events carry ids and counts, and
//!   panic payloads are redacted before they are written.
//!
//! # Invariants
//! - Repeating `init_logging` with the same level and directory is a no-op.
//! - A second configuration that differs from the active one is rejected.
//! - Initialization reports failures as `Err`, never by panicking.

use flexi_logger::{
    Cleanup, Criterion, FileSpec, LogSpecification, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "identity";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

static EMAIL_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\s@]+@[^\s@]+").expect("email redaction pattern is valid"));
// Phone numbers are stored as bare digit runs.
static DIGIT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4,}").expect("digit redaction pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: LevelFilter,
    log_dir: PathBuf,
}

impl LogSettings {
    fn parse(level: &str, log_dir: &str) -> Result<Self, String> {
        let level = level.trim();
        let level = level.parse::<LevelFilter>().map_err(|_| {
            format!("unsupported log level `{level}`; expected off|error|warn|info|debug|trace")
        })?;

        let log_dir = PathBuf::from(log_dir.trim());
        if log_dir.as_os_str().is_empty() || !log_dir.is_absolute() {
            return Err(format!(
                "log_dir must be a non-empty absolute path, got `{}`",
                log_dir.display()
            ));
        }
        Ok(Self { level, log_dir })
    }

    fn conflict_with(&self, active: &LogSettings) -> Option<String> {
        if active.log_dir != self.log_dir {
            return Some(format!(
                "logging already initialized at `{}`; refusing to switch to `{}`",
                active.log_dir.display(),
                self.log_dir.display()
            ));
        }
        if active.level != self.level {
            return Some(format!(
                "logging already initialized with level `{}`; refusing to switch to `{}`",
                active.level, self.level
            ));
        }
        None
    }
}

struct LoggingState {
    settings: LogSettings,
    _logger: LoggerHandle,
}

/// Starts file logging under the absolute directory `log_dir`.
///
/// # Errors
/// - Unknown `level`, or an empty or relative `log_dir`.
/// - The directory cannot be created or the logger cannot start.
/// - Logging is already active with a different level or directory.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let requested = LogSettings::parse(level, log_dir)?;
    let state = LOGGING_STATE.get_or_try_init(|| start_logger(requested.clone()))?;
    match requested.conflict_with(&state.settings) {
        Some(conflict) => Err(conflict),
        None => Ok(()),
    }
}

/// Level used when the caller does not pick one: `debug` for debug builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: LogSettings) -> Result<LoggingState, String> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            settings.log_dir.display()
        )
    })?;

    let logger = Logger::with(LogSpecification::builder().default(settings.level).build())
        .log_to_file(
            FileSpec::default()
                .directory(settings.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook_once();

    info!(
        "event=logging_init module=core status=ok level={} log_dir={} version={} debug_build={}",
        settings.level,
        settings.log_dir.display(),
        env!("CARGO_PKG_VERSION"),
        cfg!(debug_assertions)
    );

    Ok(LoggingState {
        settings,
        _logger: logger,
    })
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=core status=error location={location} payload={}",
            redact_contact_values(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Masks email- and phone-shaped substrings, flattens newlines and caps the
/// result at `max_chars`.
fn redact_contact_values(value: &str, max_chars: usize) -> String {
    let masked = EMAIL_LIKE.replace_all(value, "<email>");
    let masked = DIGIT_RUN.replace_all(&masked, "<digits>");
    let flattened = masked.replace(['\n', '\r'], " ");

    let mut capped: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        capped.push_str("...");
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::{init_logging, redact_contact_values, LogSettings, LOGGING_STATE};
    use log::LevelFilter;

    #[test]
    fn settings_parse_level_and_reject_relative_dir() {
        let settings = LogSettings::parse(" WARN ", "/var/log/identity").unwrap();
        assert_eq!(settings.level, LevelFilter::Warn);

        let error = LogSettings::parse("info", "logs/dev").unwrap_err();
        assert!(error.contains("absolute"));

        let error = LogSettings::parse("info", "   ").unwrap_err();
        assert!(error.contains("non-empty"));

        let error = LogSettings::parse("loud", "/var/log/identity").unwrap_err();
        assert!(error.contains("unsupported log level"));
    }

    #[test]
    fn settings_report_level_and_dir_conflicts() {
        let active = LogSettings::parse("info", "/tmp/identity-a").unwrap();
        assert!(LogSettings::parse("info", "/tmp/identity-a")
            .unwrap()
            .conflict_with(&active)
            .is_none());
        assert!(LogSettings::parse("debug", "/tmp/identity-a")
            .unwrap()
            .conflict_with(&active)
            .is_some_and(|message| message.contains("level")));
        assert!(LogSettings::parse("info", "/tmp/identity-b")
            .unwrap()
            .conflict_with(&active)
            .is_some_and(|message| message.contains("refusing to switch")));
    }

    #[test]
    fn redaction_masks_contact_values() {
        let redacted = redact_contact_values(
            "failed for doc@hillvalley.edu\nphone 123456, contact 7",
            200,
        );
        assert_eq!(redacted, "failed for <email> phone <digits>, contact 7");
    }

    #[test]
    fn redaction_caps_length() {
        let redacted = redact_contact_values("contact 7 was not found in group", 9);
        assert_eq!(redacted, "contact 7...");
    }

    #[test]
    fn init_logging_is_idempotent_and_rejects_conflicts() {
        let log_dir = tempfile::tempdir().unwrap();
        let log_dir_str = log_dir.path().to_str().unwrap().to_string();
        let other_dir = tempfile::tempdir().unwrap();
        let other_dir_str = other_dir.path().to_str().unwrap().to_string();

        init_logging("info", &log_dir_str).unwrap();
        init_logging("info", &log_dir_str).unwrap();

        let level_error = init_logging("debug", &log_dir_str).unwrap_err();
        assert!(level_error.contains("refusing to switch"));
        let dir_error = init_logging("info", &other_dir_str).unwrap_err();
        assert!(dir_error.contains("refusing to switch"));

        let active = &LOGGING_STATE.get().unwrap().settings;
        assert_eq!(active.level, LevelFilter::Info);
        assert_eq!(active.log_dir, log_dir.path());
    }
}
