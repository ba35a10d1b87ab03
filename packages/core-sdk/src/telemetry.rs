use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/** \brief Environment switch for the file event log. */
pub const TELEMETRY_ENV: &str = "ATHENA_TELEMETRY";

static TELEMETRY_ENABLED: Lazy<std::sync::RwLock<bool>> =
    Lazy::new(|| std::sync::RwLock::new(false));

static LOG_DIR: Lazy<std::sync::RwLock<PathBuf>> =
    Lazy::new(|| std::sync::RwLock::new(PathBuf::from("logs")));

/**
 * \brief Update the event log switch.
 */
pub fn set_enabled(enabled: bool) {
    if let Ok(mut guard) = TELEMETRY_ENABLED.write() {
        *guard = enabled;
    }
}

/**
 * \brief Query the event log switch.
 */
pub fn is_enabled() -> bool {
    TELEMETRY_ENABLED.read().map(|g| *g).unwrap_or(false)
}

/**
 * \brief Redirect the event log, mostly for tests.
 */
pub fn set_log_dir(dir: impl AsRef<Path>) {
    if let Ok(mut guard) = LOG_DIR.write() {
        *guard = dir.as_ref().to_path_buf();
    }
}

/** \brief Interprets `1`, `true`, `yes`, `on` as enabled. */
pub fn parse_switch(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/**
 * \brief Record a routine event.
 */
pub fn log_event(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("INFO", category, message) {
        tracing::warn!("telemetry write failed: {}", err);
    }
}

/**
 * \brief Record an error event.
 */
pub fn log_error(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("ERROR", category, message) {
        tracing::warn!("telemetry write failed: {}", err);
    }
}

fn log_file() -> PathBuf {
    LOG_DIR
        .read()
        .map(|g| g.clone())
        .unwrap_or_else(|_| PathBuf::from("logs"))
        .join("athena.log")
}

fn write_line(level: &str, category: &str, message: &str) -> Result<()> {
    let path = log_file();
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{} [{}] {} - {}", timestamp, level, category, message)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_parsing() {
        assert!(parse_switch("1"));
        assert!(parse_switch(" TRUE "));
        assert!(parse_switch("on"));
        assert!(!parse_switch("0"));
        assert!(!parse_switch(""));
    }

    #[test]
    fn writes_lines_when_enabled() {
        let dir = std::env::temp_dir().join(format!("athena-telemetry-{}", std::process::id()));
        set_log_dir(&dir);
        set_enabled(true);
        log_event("test.event", "hello");
        log_error("test.event", "broken");
        set_enabled(false);
        log_event("test.event", "dropped");

        let content = std::fs::read_to_string(dir.join("athena.log")).unwrap();
        assert!(content.contains("[INFO] test.event - hello"));
        assert!(content.contains("[ERROR] test.event - broken"));
        assert!(!content.contains("dropped"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
