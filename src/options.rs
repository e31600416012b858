use {
    crate::{
        error::FileLoggerError,
        message::{LogLevel, LogMessage},
        provider::FileLoggerProvider,
        writer::{FileOpener, FsOpener},
    },
    regex::{Captures, Regex},
    std::{
        io,
        path::Path,
        sync::{
            atomic::{AtomicBool, AtomicU8, Ordering},
            Arc, PoisonError, RwLock,
        },
    },
};

/// How the log file is opened when the provider starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WriteMode {
    /// Keep the existing content and write after it.
    #[default]
    Append,
    /// Truncate the file before the first write.
    Overwrite,
}

/// Renders a whole log line, replacing the default layout.
pub type EntryFormatter = Arc<dyn Fn(&LogMessage<'_>) -> String + Send + Sync>;
/// Returns `false` for messages that must not reach the file.
pub type EntryFilter = Arc<dyn Fn(&LogMessage<'_>) -> bool + Send + Sync>;
/// Maps the configured path to the base file name, e.g. to add a date.
pub type FileNameFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;
/// Receives open/write failures and may return a replacement file name.
pub type FileErrorHandler = Arc<dyn Fn(&FileError<'_>) -> Option<String> + Send + Sync>;

/// A file failure offered to the configured [`FileErrorHandler`].
///
/// If the handler answers with a new file name, logging continues there.
/// A failure on the replacement file itself is not offered again.
#[derive(Debug)]
pub struct FileError<'a> {
    file_name: &'a Path,
    error: &'a io::Error,
}

impl<'a> FileError<'a> {
    pub(crate) fn new(file_name: &'a Path, error: &'a io::Error) -> Self {
        FileError { file_name, error }
    }

    /// The file that was being opened or written.
    pub fn file_name(&self) -> &'a Path {
        self.file_name
    }

    pub fn error(&self) -> &'a io::Error {
        self.error
    }
}

/// Rotation limits, fixed once the provider is built.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RotationPolicy {
    pub(crate) write_mode: WriteMode,
    pub(crate) max_file_bytes: u64,
    pub(crate) max_rolling_files: usize,
}

/// Settings that may be changed after the provider was built.
///
/// They are meant to be set once during startup; changing them while other
/// threads log is memory-safe but the moment a change takes effect is not
/// specified.
pub(crate) struct Settings {
    min_level: AtomicU8,
    use_utc_timestamp: AtomicBool,
    format_entry: RwLock<Option<EntryFormatter>>,
    filter_entry: RwLock<Option<EntryFilter>>,
    format_file_name: RwLock<Option<FileNameFormatter>>,
    handle_file_error: RwLock<Option<FileErrorHandler>>,
}

fn read<T: Clone>(lock: &RwLock<Option<T>>) -> Option<T> {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn replace<T>(lock: &RwLock<Option<T>>, value: Option<T>) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

impl Settings {
    pub(crate) fn min_level(&self) -> LogLevel {
        LogLevel::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    pub(crate) fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn use_utc_timestamp(&self) -> bool {
        self.use_utc_timestamp.load(Ordering::Relaxed)
    }

    pub(crate) fn set_use_utc_timestamp(&self, utc: bool) {
        self.use_utc_timestamp.store(utc, Ordering::Relaxed);
    }

    pub(crate) fn format_entry(&self) -> Option<EntryFormatter> {
        read(&self.format_entry)
    }

    pub(crate) fn set_format_entry(&self, formatter: Option<EntryFormatter>) {
        replace(&self.format_entry, formatter);
    }

    pub(crate) fn filter_entry(&self) -> Option<EntryFilter> {
        read(&self.filter_entry)
    }

    pub(crate) fn set_filter_entry(&self, filter: Option<EntryFilter>) {
        replace(&self.filter_entry, filter);
    }

    pub(crate) fn format_file_name(&self) -> Option<FileNameFormatter> {
        read(&self.format_file_name)
    }

    pub(crate) fn set_format_file_name(&self, formatter: Option<FileNameFormatter>) {
        replace(&self.format_file_name, formatter);
    }

    pub(crate) fn has_file_name_formatter(&self) -> bool {
        self.format_file_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn handle_file_error(&self) -> Option<FileErrorHandler> {
        read(&self.handle_file_error)
    }

    pub(crate) fn set_handle_file_error(&self, handler: Option<FileErrorHandler>) {
        replace(&self.handle_file_error, handler);
    }
}

/// Metadata collected by the builder.
#[derive(Clone)]
pub(crate) struct FileLoggerMeta {
    /// The configured path, before environment expansion.
    pub(crate) file_path: String,
    pub(crate) write_mode: WriteMode,
    pub(crate) max_file_bytes: u64,
    pub(crate) max_rolling_files: usize,
    pub(crate) min_level: LogLevel,
    pub(crate) use_utc_timestamp: bool,
    pub(crate) format_entry: Option<EntryFormatter>,
    pub(crate) filter_entry: Option<EntryFilter>,
    pub(crate) format_file_name: Option<FileNameFormatter>,
    pub(crate) handle_file_error: Option<FileErrorHandler>,
    pub(crate) file_opener: Arc<dyn FileOpener>,
}

impl FileLoggerMeta {
    fn new(file_path: String) -> Self {
        FileLoggerMeta {
            file_path,
            write_mode: WriteMode::Append,
            max_file_bytes: 0,
            max_rolling_files: 0,
            min_level: LogLevel::Trace,
            use_utc_timestamp: false,
            format_entry: None,
            filter_entry: None,
            format_file_name: None,
            handle_file_error: None,
            file_opener: Arc::new(FsOpener),
        }
    }

    pub(crate) fn policy(&self) -> RotationPolicy {
        RotationPolicy {
            write_mode: self.write_mode,
            max_file_bytes: self.max_file_bytes,
            max_rolling_files: self.max_rolling_files,
        }
    }

    pub(crate) fn settings(&self) -> Settings {
        Settings {
            min_level: AtomicU8::new(self.min_level.as_u8()),
            use_utc_timestamp: AtomicBool::new(self.use_utc_timestamp),
            format_entry: RwLock::new(self.format_entry.clone()),
            filter_entry: RwLock::new(self.filter_entry.clone()),
            format_file_name: RwLock::new(self.format_file_name.clone()),
            handle_file_error: RwLock::new(self.handle_file_error.clone()),
        }
    }
}

/// Fluent configuration for a [`FileLoggerProvider`].
///
/// # Default Configuration
///
/// * Append to the existing file
/// * No size limit, so no rotation by size
/// * Unlimited rolling files
/// * Minimum level `Trace`
/// * Local time stamps
///
/// # Examples
///
/// ```no_run
/// use rollfile::{FileLoggerBuilder, LogLevel, WriteMode};
///
/// let provider = FileLoggerBuilder::new("./logs/app.log")
///     .write_mode(WriteMode::Append)
///     .max_file_bytes(4 * 1024 * 1024) // Rotate at 4 MB
///     .max_rolling_files(5)            // app.log, app1.log ... app4.log
///     .min_level(LogLevel::Information)
///     .build()
///     .unwrap();
/// ```
pub struct FileLoggerBuilder {
    meta: FileLoggerMeta,
}

impl FileLoggerBuilder {
    /// Create a new builder.
    /// # Arguments
    /// * `file_path` - The log file path. `${VAR}`, `$VAR` and `%VAR%`
    ///   references are expanded from the environment when the provider is
    ///   built.
    pub fn new(file_path: impl Into<String>) -> Self {
        FileLoggerBuilder {
            meta: FileLoggerMeta::new(file_path.into()),
        }
    }

    pub fn write_mode(self, write_mode: WriteMode) -> Self {
        Self {
            meta: FileLoggerMeta { write_mode, ..self.meta },
        }
    }

    /// Rotate once the current file holds at least this many bytes. 0
    /// disables size-based rotation.
    pub fn max_file_bytes(self, max_file_bytes: u64) -> Self {
        Self {
            meta: FileLoggerMeta {
                max_file_bytes,
                ..self.meta
            },
        }
    }

    /// Reuse the oldest rotation member once this many files exist. 0 keeps
    /// creating new files.
    pub fn max_rolling_files(self, max_rolling_files: usize) -> Self {
        Self {
            meta: FileLoggerMeta {
                max_rolling_files,
                ..self.meta
            },
        }
    }

    pub fn min_level(self, min_level: LogLevel) -> Self {
        Self {
            meta: FileLoggerMeta { min_level, ..self.meta },
        }
    }

    /// Write time stamps in UTC instead of local time.
    pub fn use_utc_timestamp(self, use_utc_timestamp: bool) -> Self {
        Self {
            meta: FileLoggerMeta {
                use_utc_timestamp,
                ..self.meta
            },
        }
    }

    /// Replace the default line layout.
    pub fn format_entry<F>(self, formatter: F) -> Self
    where
        F: Fn(&LogMessage<'_>) -> String + Send + Sync + 'static,
    {
        Self {
            meta: FileLoggerMeta {
                format_entry: Some(Arc::new(formatter)),
                ..self.meta
            },
        }
    }

    /// Only messages for which `filter` returns `true` are written.
    pub fn filter_entry<F>(self, filter: F) -> Self
    where
        F: Fn(&LogMessage<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            meta: FileLoggerMeta {
                filter_entry: Some(Arc::new(filter)),
                ..self.meta
            },
        }
    }

    /// Compute the base file name from the configured path.
    ///
    /// The formatter runs before every write, and a change in its output
    /// rotates to the new name. Cache inside the closure if computing the
    /// name is expensive.
    ///
    /// ```no_run
    /// use rollfile::FileLoggerBuilder;
    ///
    /// let provider = FileLoggerBuilder::new("./logs/app.log")
    ///     .format_file_name(|path| {
    ///         let stem = path.trim_end_matches(".log");
    ///         format!("{stem}-{}.log", chrono::Utc::now().format("%Y-%m-%d"))
    ///     })
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn format_file_name<F>(self, formatter: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            meta: FileLoggerMeta {
                format_file_name: Some(Arc::new(formatter)),
                ..self.meta
            },
        }
    }

    /// Handle file open and write failures.
    ///
    /// Returning a file name switches logging to that file. Returning `None`
    /// lets the failure propagate: [`build`](Self::build) fails, or logging
    /// stops if the provider is already running.
    ///
    /// Once the provider runs, the handler is called on the writer thread.
    /// It must not log through this provider, including through a
    /// [`FileLoggerLayer`](crate::FileLoggerLayer) it feeds: such lines are
    /// discarded.
    pub fn handle_file_error<F>(self, handler: F) -> Self
    where
        F: Fn(&FileError<'_>) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            meta: FileLoggerMeta {
                handle_file_error: Some(Arc::new(handler)),
                ..self.meta
            },
        }
    }

    /// Acquire file handles through `opener` instead of the filesystem.
    pub fn file_opener(self, opener: Arc<dyn FileOpener>) -> Self {
        Self {
            meta: FileLoggerMeta {
                file_opener: opener,
                ..self.meta
            },
        }
    }

    /// Open the initial log file and start the background writer.
    pub fn build(self) -> Result<FileLoggerProvider, FileLoggerError> {
        FileLoggerProvider::from_meta(self.meta)
    }

    #[cfg(test)]
    pub(crate) fn into_meta(self) -> FileLoggerMeta {
        self.meta
    }
}

/// Plain configuration record, e.g. for binding from a settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct FileLoggerConfig {
    pub file_path: String,
    pub write_mode: WriteMode,
    pub max_file_bytes: u64,
    pub max_rolling_files: usize,
    pub min_level: LogLevel,
}

impl FileLoggerConfig {
    pub fn into_builder(self) -> FileLoggerBuilder {
        FileLoggerBuilder::new(self.file_path)
            .write_mode(self.write_mode)
            .max_file_bytes(self.max_file_bytes)
            .max_rolling_files(self.max_rolling_files)
            .min_level(self.min_level)
    }
}

/// Expand `${VAR}`, `$VAR` and `%VAR%` references from the environment.
///
/// Unset variables are left as written.
pub(crate) fn expand_env_vars(path: &str) -> Result<String, FileLoggerError> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)|%([A-Za-z_][A-Za-z0-9_()]*)%")
        .map_err(|err| FileLoggerError::InternalError(err.to_string()))?;
    let expanded = pattern.replace_all(path, |caps: &Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}
