use {std::io, std::path::PathBuf};

/// Errors that can occur while opening or writing log files.
#[derive(Debug, thiserror::Error)]
pub enum FileLoggerError {
    #[error("Failed to open log file '{path}': {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("Failed to write log file '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("File error handler did not recover from failure on '{path}': {source}")]
    Unrecovered { path: PathBuf, source: io::Error },
    #[error("Failed to switch to replacement log file '{path}': {source}")]
    Retarget { path: PathBuf, source: io::Error },
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FileLoggerError {
    /// The underlying I/O error, if this failure has not been offered to the
    /// file error handler yet.
    ///
    /// `Unrecovered` and `Retarget` already went through the handler once and
    /// return `None`.
    pub(crate) fn offerable(&self) -> Option<(&PathBuf, &io::Error)> {
        match self {
            FileLoggerError::Open { path, source } | FileLoggerError::Write { path, source } => Some((path, source)),
            _ => None,
        }
    }

    /// Convert an offerable failure into the error reported once the handler
    /// has declined it.
    pub(crate) fn into_unrecovered(self) -> Self {
        match self {
            FileLoggerError::Open { path, source } | FileLoggerError::Write { path, source } => {
                FileLoggerError::Unrecovered { path, source }
            }
            other => other,
        }
    }
}
