//! Feeding [`tracing`] events into a [`FileLoggerProvider`].
//!
//! ```no_run
//! use {
//!     rollfile::{FileLoggerBuilder, FileLoggerLayer},
//!     std::sync::Arc,
//!     tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt},
//! };
//!
//! let provider = Arc::new(FileLoggerBuilder::new("./logs/app.log").build().unwrap());
//! tracing_subscriber::registry()
//!     .with(FileLoggerLayer::new(provider.clone()))
//!     .init();
//!
//! tracing::info!(port = 8080, "listening");
//! provider.dispose();
//! ```
use {
    crate::{
        message::{EventId, LogLevel},
        provider::FileLoggerProvider,
    },
    std::{
        fmt::{self, Write as _},
        sync::Arc,
    },
    tracing::{
        field::{Field, Visit},
        Event, Level, Subscriber,
    },
    tracing_subscriber::layer::{Context, Layer},
};

/// Target prefix of this crate's own diagnostics, which are never written to
/// the log file they describe.
const OWN_TARGET: &str = "rollfile";

/// A [`Layer`] writing every event through a provider.
///
/// The event target becomes the category, the `message` field the text, and
/// other fields are appended as ` key=value`.
pub struct FileLoggerLayer {
    provider: Arc<FileLoggerProvider>,
}

impl FileLoggerLayer {
    pub fn new(provider: Arc<FileLoggerProvider>) -> Self {
        FileLoggerLayer { provider }
    }
}

fn log_level(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warning,
        Level::INFO => LogLevel::Information,
        Level::DEBUG => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

fn is_own_target(target: &str) -> bool {
    target == OWN_TARGET || target.strip_prefix(OWN_TARGET).is_some_and(|rest| rest.starts_with("::"))
}

impl<S> Layer<S> for FileLoggerLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) {
            return;
        }
        let level = log_level(metadata.level());
        let logger = self.provider.create_logger(metadata.target());
        if !logger.is_enabled(level) {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        logger.log(level, &EventId::default(), visitor, None, |visitor, _| visitor.render());
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: String,
}

impl EventVisitor {
    fn render(&self) -> String {
        format!("{}{}", self.message, self.fields)
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
