use std::{error::Error, fmt};

/// Severity of a log event, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogLevel {
    /// The most detailed messages, possibly containing sensitive data.
    #[default]
    Trace,
    /// Interactive investigation during development.
    Debug,
    /// General flow of the application.
    Information,
    /// Abnormal or unexpected events that did not stop execution.
    Warning,
    /// The current operation failed.
    Error,
    /// Unrecoverable failures that need immediate attention.
    Critical,
}

impl LogLevel {
    /// The short upper-case tag written in the default line layout.
    pub fn short_name(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Information => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRIT",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Information,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            _ => LogLevel::Critical,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Identifies a log event: a number and an optional name.
///
/// When a name is present it is what gets rendered in the default layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EventId {
    id: i32,
    name: Option<String>,
}

impl EventId {
    pub fn new(id: i32) -> Self {
        EventId { id, name: None }
    }

    pub fn named(id: i32, name: impl Into<String>) -> Self {
        EventId {
            id,
            name: Some(name.into()),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl From<i32> for EventId {
    fn from(id: i32) -> Self {
        EventId::new(id)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.id),
        }
    }
}

/// One log event as seen by filters and line formatters.
///
/// A `LogMessage` only borrows its parts and lives for the duration of a
/// single log call.
#[derive(Debug, Clone, Copy)]
pub struct LogMessage<'a> {
    category: &'a str,
    level: LogLevel,
    event_id: &'a EventId,
    text: &'a str,
    error: Option<&'a (dyn Error + 'static)>,
}

impl<'a> LogMessage<'a> {
    pub fn new(
        category: &'a str,
        level: LogLevel,
        event_id: &'a EventId,
        text: &'a str,
        error: Option<&'a (dyn Error + 'static)>,
    ) -> Self {
        LogMessage {
            category,
            level,
            event_id,
            text,
            error,
        }
    }

    pub fn category(&self) -> &'a str {
        self.category
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn event_id(&self) -> &'a EventId {
        self.event_id
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn error(&self) -> Option<&'a (dyn Error + 'static)> {
        self.error
    }
}
