//! # rollfile
//!
//! rollfile is an asynchronous file logger that writes plain text lines into
//! a rolling set of files. Log calls on any thread format their line and
//! push it onto a bounded queue; a single background thread owns the file
//! and performs every write, so lines land on disk in the order they were
//! logged. **Files are rotated by size, capped by count, or renamed on the
//! fly by a custom file name formatter, which makes daily files a one-line
//! closure.** Open and write failures can be redirected to another file by
//! an error handler instead of bringing down the host application.
//!
//! Rotation members are named by appending an index to the file stem:
//! `app.log`, `app1.log`, `app2.log`, ... With a rolling cap of `N`, the
//! oldest member is truncated and reused once `N` files exist.
//!
//! ## Example
//!
//! ```no_run
//! use rollfile::{FileLoggerBuilder, LogLevel, WriteMode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = FileLoggerBuilder::new("./logs/app.log")
//!         .write_mode(WriteMode::Append)
//!         .max_file_bytes(256 * 1024) // Rotate at 256 KB
//!         .max_rolling_files(3)       // Keep app.log, app1.log and app2.log
//!         .min_level(LogLevel::Debug)
//!         .build()?;
//!
//!     let logger = provider.create_logger("app::startup");
//!     logger.info("This is an info message");
//!     logger.warn("This is a warning message");
//!     logger.error("This is an error message");
//!
//!     // Waits up to two seconds for queued lines to reach the file.
//!     provider.dispose();
//!     Ok(())
//! }
//! ```
//!
//! With the default `tracing-layer` feature, [`FileLoggerLayer`] plugs a
//! provider into a `tracing_subscriber` registry.
mod error;
#[cfg(feature = "tracing-layer")]
mod layer;
mod logger;
mod message;
mod options;
mod provider;
mod queue;
mod writer;

#[cfg(feature = "tracing-layer")]
pub use layer::FileLoggerLayer;
pub use {
    error::FileLoggerError,
    logger::{FileLogger, Scope},
    message::{EventId, LogLevel, LogMessage},
    options::{
        EntryFilter, EntryFormatter, FileError, FileErrorHandler, FileLoggerBuilder, FileLoggerConfig,
        FileNameFormatter, WriteMode,
    },
    provider::{FileLoggerProvider, DISPOSE_GRACE_PERIOD},
    writer::{FileOpener, FsOpener},
};

/// The capability a logging front end needs from a log destination: loggers
/// per category, and a terminal shutdown.
pub trait LoggerProvider: Send + Sync {
    type Logger;

    /// Return the logger for `category`. Repeated calls with the same
    /// category may return the same instance.
    fn create_logger(&self, category: &str) -> Self::Logger;

    /// Flush what can be flushed and release resources. Loggers handed out
    /// earlier keep working as no-ops.
    fn dispose(&self);
}
