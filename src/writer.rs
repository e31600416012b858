use {
    crate::{
        error::FileLoggerError,
        options::{FileError, RotationPolicy, Settings, WriteMode},
    },
    regex::Regex,
    std::{
        fs,
        io::{self, Write},
        panic::{self, AssertUnwindSafe},
        path::{Path, PathBuf},
        sync::Arc,
        time::SystemTime,
    },
    tracing::{debug, warn},
};

/// Acquires the handles the file writer writes into.
///
/// The default [`FsOpener`] opens real files. Supplying another opener lets a
/// host route log files elsewhere, or lets tests inject open and write
/// failures at chosen paths.
pub trait FileOpener: Send + Sync {
    /// Open `path` for writing.
    ///
    /// [`WriteMode::Append`] must keep existing content and position writes
    /// after it; [`WriteMode::Overwrite`] must truncate the file.
    fn open(&self, path: &Path, mode: WriteMode) -> io::Result<Box<dyn Write + Send>>;
}

/// Opens log files on the local filesystem, creating missing directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOpener;

impl FileOpener for FsOpener {
    fn open(&self, path: &Path, mode: WriteMode) -> io::Result<Box<dyn Write + Send>> {
        let mut open_options = fs::OpenOptions::new();
        open_options.create(true);
        match mode {
            WriteMode::Append => open_options.append(true),
            WriteMode::Overwrite => open_options.write(true).truncate(true),
        };

        let mut open_res = open_options.open(path);
        if open_res.is_err() {
            // Create the directory if it doesn't exist
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
                open_res = open_options.open(path);
            }
        }

        Ok(Box::new(io::BufWriter::new(open_res?)))
    }
}

/// Split a base file name into its directory, stem and extension (with the
/// leading dot, or empty).
fn split_base(base: &Path) -> (PathBuf, String, String) {
    let parent = base.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (parent, stem, ext)
}

/// The rotation member with the given index: the base name for 0, otherwise
/// the index appended to the stem.
fn rotation_member(parent: &Path, stem: &str, ext: &str, index: usize) -> PathBuf {
    if index == 0 {
        parent.join(format!("{stem}{ext}"))
    } else {
        parent.join(format!("{stem}{index}{ext}"))
    }
}

fn write_line(sink: &mut dyn Write, line: &str, flush: bool) -> io::Result<()> {
    sink.write_all(line.as_bytes())?;
    sink.write_all(b"\n")?;
    if flush {
        sink.flush()?;
    }
    Ok(())
}

/// Owns the open log file and applies the rotation policy.
///
/// A `FileWriter` is moved into the background worker once the initial file
/// is open and is never shared afterwards.
pub(crate) struct FileWriter {
    /// The configured path, after environment expansion. A file error
    /// handler may replace it.
    base_path: String,
    policy: RotationPolicy,
    settings: Arc<Settings>,
    opener: Arc<dyn FileOpener>,
    /// The file currently written to.
    curr_file_path: PathBuf,
    /// Base file name observed at the last rotation check.
    last_base_file_name: String,
    /// Bytes in the current file, including buffered ones.
    curr_file_size_bytes: u64,
    sink: Option<Box<dyn Write + Send>>,
    /// Set while recovering from a failure; the handler is not consulted again.
    handling_error: bool,
}

impl FileWriter {
    pub(crate) fn new(
        base_path: String,
        policy: RotationPolicy,
        settings: Arc<Settings>,
        opener: Arc<dyn FileOpener>,
    ) -> Result<Self, FileLoggerError> {
        let mut writer = FileWriter {
            base_path,
            policy,
            settings,
            opener,
            curr_file_path: PathBuf::new(),
            last_base_file_name: String::new(),
            curr_file_size_bytes: 0,
            sink: None,
            handling_error: false,
        };
        writer.select_initial_file()?;
        Ok(writer)
    }

    pub(crate) fn curr_file_path(&self) -> &Path {
        &self.curr_file_path
    }

    /// Apply the file name formatter, if any, to the configured path.
    ///
    /// The formatter may depend on the clock or other external state, so the
    /// result is never cached here.
    pub(crate) fn resolve_base_file_name(&self) -> String {
        match self.settings.format_file_name() {
            Some(formatter) => formatter(&self.base_path),
            None => self.base_path.clone(),
        }
    }

    /// Decide which file the writer starts with.
    ///
    /// Without a size limit this is always the base file. With one, the
    /// latest existing rotation member is resumed so that restarts keep
    /// filling the same file.
    fn select_initial_file(&mut self) -> Result<(), FileLoggerError> {
        let base = self.resolve_base_file_name();
        let base_path = PathBuf::from(&base);
        self.curr_file_path = if self.policy.max_file_bytes > 0 {
            Self::latest_rotation_member(&base_path)?.unwrap_or(base_path)
        } else {
            base_path
        };
        self.last_base_file_name = base;
        Ok(())
    }

    /// Find the existing rotation member of `base` with the greatest name,
    /// preferring the most recently modified on equal names.
    /// # Arguments
    /// * `base` - The base file name.
    /// # Returns
    /// The path of that member, or `None` if no member exists.
    fn latest_rotation_member(base: &Path) -> Result<Option<PathBuf>, FileLoggerError> {
        let (parent, stem, ext) = split_base(base);
        let directory = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent.as_path()
        };
        if !directory.is_dir() {
            return Ok(None);
        }

        let file_pattern = Regex::new(&format!("^{}.*{}$", regex::escape(&stem), regex::escape(&ext)))
            .map_err(|err| FileLoggerError::InternalError(err.to_string()))?;
        let files = match fs::read_dir(directory) {
            Ok(files) => files,
            Err(err) => {
                warn!(directory = %directory.display(), error = %err, "failed to scan log directory");
                return Ok(None);
            }
        };

        let mut members = Vec::new();
        for file in files.flatten() {
            let Ok(metadata) = file.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            if let Some(file_name) = file.file_name().to_str() {
                if file_pattern.is_match(file_name) {
                    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    members.push((file_name.to_string(), modified));
                }
            }
        }

        members.sort();
        Ok(members.pop().map(|(file_name, _)| parent.join(file_name)))
    }

    /// Compute the file to continue in once the current one is full or the
    /// base name changed.
    pub(crate) fn next_file_name(&self) -> PathBuf {
        let base = PathBuf::from(self.resolve_base_file_name());
        let base_is_full = self.policy.max_file_bytes > 0
            && fs::metadata(&base).map_or(false, |m| m.len() >= self.policy.max_file_bytes);
        if !base_is_full {
            return base;
        }

        let (parent, stem, ext) = split_base(&base);
        let curr_index = self
            .curr_file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix(stem.as_str()))
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);

        let mut next_index = curr_index.saturating_add(1);
        if self.policy.max_rolling_files > 0 {
            next_index %= self.policy.max_rolling_files;
        }
        rotation_member(&parent, &stem, &ext, next_index)
    }

    /// Report whether the formatted base name differs from the last one seen,
    /// remembering the new one.
    fn base_file_name_changed(&mut self) -> bool {
        if !self.settings.has_file_name_formatter() {
            return false;
        }
        let base = self.resolve_base_file_name();
        if base == self.last_base_file_name {
            return false;
        }
        self.last_base_file_name = base;
        true
    }

    /// Rotate before a write if the current file is full or the base name
    /// changed. Rotated-to files are always truncated, including members
    /// reused after the rolling cap wrapped around.
    fn rotate_if_needed(&mut self) -> Result<(), FileLoggerError> {
        let size_reached =
            self.policy.max_file_bytes > 0 && self.curr_file_size_bytes >= self.policy.max_file_bytes;
        // Evaluated even when the size limit already triggers, so the last
        // seen base name stays current.
        let name_changed = self.base_file_name_changed();
        if !size_reached && !name_changed {
            return Ok(());
        }

        self.close();
        let next_file_path = self.next_file_name();
        debug!(
            from = %self.curr_file_path.display(),
            to = %next_file_path.display(),
            size_reached,
            name_changed,
            "rotating log file"
        );
        self.curr_file_path = next_file_path;
        self.open(WriteMode::Overwrite)
    }

    fn open_raw(&mut self, mode: WriteMode) -> io::Result<()> {
        let sink = self.opener.open(&self.curr_file_path, mode)?;
        self.curr_file_size_bytes = match mode {
            WriteMode::Append => fs::metadata(&self.curr_file_path).map_or(0, |m| m.len()),
            WriteMode::Overwrite => 0,
        };
        self.sink = Some(sink);
        debug!(path = %self.curr_file_path.display(), ?mode, "opened log file");
        Ok(())
    }

    /// Open the current file, offering a failure to the file error handler.
    pub(crate) fn open(&mut self, mode: WriteMode) -> Result<(), FileLoggerError> {
        match self.open_raw(mode) {
            Ok(()) => Ok(()),
            Err(source) => self.recover(FileLoggerError::Open {
                path: self.curr_file_path.clone(),
                source,
            }),
        }
    }

    /// Offer `err` to the file error handler and switch to the replacement
    /// file it names.
    ///
    /// Fails with the original error when there is no handler, the handler
    /// declines or panics, the error was already offered, or the writer is
    /// already recovering from a previous failure.
    pub(crate) fn recover(&mut self, err: FileLoggerError) -> Result<(), FileLoggerError> {
        if self.handling_error {
            return Err(err);
        }
        let Some(handler) = self.settings.handle_file_error() else {
            return Err(err);
        };
        let replacement = match err.offerable() {
            Some((path, source)) => {
                let file_error = FileError::new(path, source);
                panic::catch_unwind(AssertUnwindSafe(|| handler(&file_error)))
            }
            None => return Err(err),
        };

        match replacement {
            Ok(Some(new_file_name)) => {
                warn!(error = %err, replacement = %new_file_name, "switching to replacement log file");
                self.handling_error = true;
                let retargeted = self.retarget(new_file_name);
                self.handling_error = false;
                retargeted
            }
            Ok(None) => Err(err.into_unrecovered()),
            Err(_) => {
                warn!(error = %err, "file error handler panicked");
                Err(err.into_unrecovered())
            }
        }
    }

    /// Make `new_file_name` the base path and open it with the configured
    /// write mode. Failures here are final.
    fn retarget(&mut self, new_file_name: String) -> Result<(), FileLoggerError> {
        self.close();
        self.base_path = new_file_name;
        self.select_initial_file()?;
        self.open_raw(self.policy.write_mode)
            .map_err(|source| FileLoggerError::Retarget {
                path: self.curr_file_path.clone(),
                source,
            })
    }

    /// Retry `line` once after a failed write, if the handler supplies a
    /// replacement file. Nothing inside the retry reaches the handler.
    pub(crate) fn recover_and_retry(
        &mut self,
        err: FileLoggerError,
        line: &str,
        flush: bool,
    ) -> Result<(), FileLoggerError> {
        self.recover(err)?;
        self.handling_error = true;
        let retried = self.write(line, flush);
        self.handling_error = false;
        retried
    }

    /// Write one line, rotating first if needed.
    pub(crate) fn write(&mut self, line: &str, flush: bool) -> Result<(), FileLoggerError> {
        // Closed.
        if self.sink.is_none() {
            return Ok(());
        }
        self.rotate_if_needed()?;

        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        write_line(sink.as_mut(), line, flush).map_err(|source| FileLoggerError::Write {
            path: self.curr_file_path.clone(),
            source,
        })?;
        self.curr_file_size_bytes += line.len() as u64 + 1;
        Ok(())
    }

    /// Flush and release the current file. Safe to call repeatedly.
    pub(crate) fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(err) = sink.flush() {
                warn!(path = %self.curr_file_path.display(), error = %err, "failed to flush log file");
            }
        }
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        self.close();
    }
}
