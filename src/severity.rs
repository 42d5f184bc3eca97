use std::{collections::HashMap, fmt};

use serde_derive::Serialize;

/// Google Cloud Logging [severity](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#LogSeverity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// The log entry has no assigned severity level.
    Default,
    Debug,
    Info,
    /// Normal but significant events, such as start up or shut down.
    Notice,
    Warning,
    Error,
    /// Not used by the default mapping.
    Critical,
    /// A person must take an action immediately.
    Alert,
    /// One or more systems are unusable.
    Emergency,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log levels of the calling framework, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i64)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Notice = 2,
    Warning = 3,
    Error = 4,
    Fatal = 5,
    Panic = 6,
}

impl From<LogLevel> for i64 {
    #[inline]
    fn from(level: LogLevel) -> Self {
        level as i64
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            LogLevel::Error
        } else if *level == tracing::Level::WARN {
            LogLevel::Warning
        } else if *level == tracing::Level::INFO {
            LogLevel::Info
        } else {
            LogLevel::Debug
        }
    }
}

/// Integer log level to severity table.
pub type SeverityMap = HashMap<i64, Severity>;

pub fn default_severity_map() -> SeverityMap {
    [
        (LogLevel::Debug, Severity::Debug),
        (LogLevel::Info, Severity::Info),
        (LogLevel::Notice, Severity::Notice),
        (LogLevel::Warning, Severity::Warning),
        (LogLevel::Error, Severity::Error),
        (LogLevel::Fatal, Severity::Alert),
        (LogLevel::Panic, Severity::Emergency),
    ]
    .into_iter()
    .map(|(level, severity)| (i64::from(level), severity))
    .collect()
}

/// Looks `level` up in `map`, falling back to [`Severity::Default`].
#[inline]
pub fn resolve_severity(map: &SeverityMap, level: i64) -> Severity {
    map.get(&level).copied().unwrap_or(Severity::Default)
}
