use log::{debug, error, info, warn};
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::config;

pub const LOG_FILE: &str = "autoreply.log";

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Installs the process logger. Output goes to stderr, which the MTA
/// captures in its own log.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// `$AUTOREPLY_LOG`, falling back to `~/autoreply.log`.
pub fn log_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AUTOREPLY_LOG") {
        return Some(PathBuf::from(path));
    }
    config::home_file(LOG_FILE).ok()
}

/// Per-invocation logging context, built from the loaded settings and
/// passed to every component that reports events.
///
/// Events always reach the `log` facade. When file logging is enabled they
/// are also appended to the activity log as `YYYY-MM-DD HH:MM:SS: message`.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    file: Option<PathBuf>,
}

impl LogContext {
    /// Context with file logging off.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
        }
    }

    /// Context for the settings `logging` flag.
    pub fn from_settings(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }
        match log_path() {
            Some(path) => Self::to_file(path),
            None => {
                warn!("[log] logging enabled but no log path could be resolved");
                Self::disabled()
            }
        }
    }

    pub fn event(&self, message: &str) {
        info!("{}", message);
        self.append(message);
    }

    pub fn detail(&self, message: &str) {
        debug!("{}", message);
        self.append(message);
    }

    pub fn failure(&self, message: &str) {
        error!("{}", message);
        self.append(&format!("ERROR {}", message));
    }

    fn append(&self, message: &str) {
        let Some(path) = &self.file else {
            return;
        };
        let line = format!("{}: {}\n", now(), message);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!("[log] failed to append to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn disabled_context_writes_nothing() {
        let log = LogContext::disabled();
        log.event("[test] nothing");
        assert!(log.file.is_none());
        assert!(LogContext::from_settings(false).file.is_none());
    }

    #[test]
    fn file_context_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let log = LogContext::to_file(&path);
        log.event("first");
        log.failure("second");

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": first"));
        assert!(lines[1].ends_with(": ERROR second"));
        // "YYYY-MM-DD HH:MM:SS: "
        assert_eq!(&lines[0][4..5], "-");
        assert_eq!(&lines[0][19..21], ": ");
    }
}
