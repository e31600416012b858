use {
    crate::{
        message::{EventId, LogLevel, LogMessage},
        provider::ProviderShared,
    },
    chrono::{Local, SecondsFormat, Utc},
    std::{
        error::Error,
        fmt::{self, Write as _},
        sync::Arc,
    },
};

/// Logger for one category, handed out by
/// [`FileLoggerProvider::create_logger`](crate::FileLoggerProvider::create_logger).
///
/// Log calls format and filter on the calling thread, then hand the line to
/// the provider's queue. They never fail: once the provider stopped writing,
/// calls are discarded.
pub struct FileLogger {
    category: String,
    shared: Arc<ProviderShared>,
}

impl FileLogger {
    pub(crate) fn new(category: String, shared: Arc<ProviderShared>) -> Self {
        FileLogger { category, shared }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.shared.is_writing() && level >= self.shared.settings.min_level()
    }

    /// Log an event whose text is produced by `formatter` from `state`.
    ///
    /// `formatter` only runs if `level` is enabled. The rendered message goes
    /// through the configured filter and then the configured line formatter,
    /// or the default layout:
    ///
    /// ```text
    /// 2026-10-14T09:30:00.123456+02:00	INFO	[app::http]	[0]	request served
    /// ```
    pub fn log<S, F>(
        &self,
        level: LogLevel,
        event_id: &EventId,
        state: S,
        error: Option<&(dyn Error + 'static)>,
        formatter: F,
    ) where
        F: FnOnce(&S, Option<&(dyn Error + 'static)>) -> String,
    {
        if !self.is_enabled(level) {
            return;
        }
        let text = formatter(&state, error);
        let message = LogMessage::new(&self.category, level, event_id, &text, error);

        if let Some(filter) = self.shared.settings.filter_entry() {
            if !filter(&message) {
                return;
            }
        }

        let line = match self.shared.settings.format_entry() {
            Some(format_entry) => format_entry(&message),
            None => render_default(&message, self.shared.settings.use_utc_timestamp()),
        };
        if line.is_empty() {
            return;
        }
        self.shared.enqueue(line);
    }

    /// Log `text` with the default event id and no error.
    pub fn log_text(&self, level: LogLevel, text: impl fmt::Display) {
        self.log(level, &EventId::default(), text, None, |text, _| text.to_string());
    }

    /// Log `text` together with `error`, whose description is written on the
    /// following lines.
    pub fn log_error(&self, level: LogLevel, text: impl fmt::Display, error: &(dyn Error + 'static)) {
        self.log(level, &EventId::default(), text, Some(error), |text, _| text.to_string());
    }

    pub fn trace(&self, text: impl fmt::Display) {
        self.log_text(LogLevel::Trace, text);
    }

    pub fn debug(&self, text: impl fmt::Display) {
        self.log_text(LogLevel::Debug, text);
    }

    pub fn info(&self, text: impl fmt::Display) {
        self.log_text(LogLevel::Information, text);
    }

    pub fn warn(&self, text: impl fmt::Display) {
        self.log_text(LogLevel::Warning, text);
    }

    pub fn error(&self, text: impl fmt::Display) {
        self.log_text(LogLevel::Error, text);
    }

    pub fn critical(&self, text: impl fmt::Display) {
        self.log_text(LogLevel::Critical, text);
    }

    /// Scopes are accepted but not rendered.
    pub fn begin_scope<S>(&self, _state: S) -> Scope {
        Scope { _private: () }
    }
}

impl fmt::Debug for FileLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLogger").field("category", &self.category).finish()
    }
}

/// Guard returned by [`FileLogger::begin_scope`]. Dropping it does nothing.
#[derive(Debug)]
pub struct Scope {
    _private: (),
}

/// Render `message` in the tab-separated default layout, followed by the
/// error and its sources on their own lines.
fn render_default(message: &LogMessage<'_>, use_utc_timestamp: bool) -> String {
    let mut line = String::new();
    if !message.text().is_empty() {
        let timestamp = if use_utc_timestamp {
            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
        } else {
            Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
        };
        let _ = write!(
            line,
            "{timestamp}\t{}\t[{}]\t[{}]\t{}",
            message.level().short_name(),
            message.category(),
            message.event_id(),
            message.text()
        );
    }

    if let Some(error) = message.error() {
        if !line.is_empty() {
            line.push('\n');
        }
        let _ = write!(line, "{error}");
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(line, "\n  caused by: {cause}");
            source = cause.source();
        }
    }
    line
}
