//! File logging for the interaction engine.
//!
//! Each record is one JSON object per line in `interactions.log`:
//! `{"timestamp", "level", "module", "message"}`. Messages themselves use
//! `event=... module=... key=value` pairs.
//!
//! Initialization happens at most once per process. Calling it again with the
//! same directory and level is a no-op; anything else is rejected.

use crate::infrastructure::error::InteractionError;
use flexi_logger::{
    Cleanup, Criterion, DeferredNow, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{info, Record};
use once_cell::sync::OnceCell;
use std::io::Write;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "interactions";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

fn json_line_format(
    writer: &mut dyn Write,
    now: &mut DeferredNow,
    record: &Record,
) -> std::io::Result<()> {
    let payload = serde_json::json!({
        "timestamp": now.now().to_rfc3339(),
        "level": record.level().as_str().to_ascii_lowercase(),
        "module": record.module_path().unwrap_or("unknown"),
        "message": record.args().to_string(),
    });
    write!(writer, "{payload}")
}

pub fn init_logging(level: &str, log_dir: &Path) -> Result<(), InteractionError> {
    let level = normalize_level(level)?;
    if let Some(state) = LOGGING_STATE.get() {
        return check_matches(state, level, log_dir);
    }

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, InteractionError> {
        std::fs::create_dir_all(log_dir)?;
        let logger = Logger::try_with_str(level)
            .map_err(|error| InteractionError::InvalidConfig(format!("log level `{level}`: {error}")))?
            .log_to_file(
                FileSpec::default()
                    .directory(log_dir)
                    .basename(LOG_FILE_BASENAME)
                    .suppress_timestamp(),
            )
            .rotate(
                Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(MAX_LOG_FILES),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            .format_for_files(json_line_format)
            .start()
            .map_err(|error| InteractionError::InvalidConfig(format!("start logger: {error}")))?;

        info!(
            "event=logging_init module=logging status=ok level={level} log_dir={}",
            log_dir.display()
        );
        Ok(LoggingState {
            level,
            log_dir: log_dir.to_path_buf(),
            _logger: logger,
        })
    })?;
    check_matches(state, level, log_dir)
}

fn check_matches(
    state: &LoggingState,
    level: &'static str,
    log_dir: &Path,
) -> Result<(), InteractionError> {
    if state.log_dir != log_dir {
        return Err(InteractionError::InvalidConfig(format!(
            "logging already initialized at `{}`",
            state.log_dir.display()
        )));
    }
    if state.level != level {
        return Err(InteractionError::InvalidConfig(format!(
            "logging already initialized with level `{}`",
            state.level
        )));
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, InteractionError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(InteractionError::InvalidConfig(format!(
            "unsupported log level `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_normalized() {
        assert_eq!(normalize_level(" Warning ").expect("level"), "warn");
        assert!(matches!(
            normalize_level("verbose"),
            Err(InteractionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn json_lines_carry_level_and_message() {
        let mut buffer = Vec::new();
        let record = Record::builder()
            .args(format_args!("event=sample module=tests"))
            .level(log::Level::Info)
            .module_path(Some("calendar_interactions::tests"))
            .build();
        json_line_format(&mut buffer, &mut DeferredNow::new(), &record).expect("format");

        let line: serde_json::Value = serde_json::from_slice(&buffer).expect("valid json");
        assert_eq!(line["level"], "info");
        assert_eq!(line["module"], "calendar_interactions::tests");
        assert_eq!(line["message"], "event=sample module=tests");
        let timestamp = line["timestamp"].as_str().expect("timestamp");
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn second_init_must_match_the_first() {
        let dir = std::env::temp_dir().join(format!(
            "calendar-interactions-logs-{}",
            std::process::id()
        ));
        init_logging("info", &dir).expect("first init");
        init_logging("INFO", &dir).expect("same settings");
        assert!(init_logging("debug", &dir).is_err());
        assert!(init_logging("info", &dir.join("other")).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
