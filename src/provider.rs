use {
    crate::{
        error::FileLoggerError,
        logger::FileLogger,
        message::LogLevel,
        options::{
            expand_env_vars, EntryFilter, EntryFormatter, FileErrorHandler, FileLoggerMeta, FileNameFormatter,
            Settings,
        },
        queue::{WriteQueue, WRITER_THREAD_NAME},
        writer::FileWriter,
        LoggerProvider,
    },
    crossbeam_channel::{Receiver, RecvTimeoutError, Sender},
    dashmap::DashMap,
    std::{
        fmt,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex, PoisonError,
        },
        thread::{self, JoinHandle},
        time::Duration,
    },
    tracing::{error, warn},
};

/// How long [`FileLoggerProvider::dispose`] waits for queued lines to be
/// written.
pub const DISPOSE_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// State shared between the provider and its loggers.
pub(crate) struct ProviderShared {
    pub(crate) settings: Arc<Settings>,
    /// `None` when no file path was configured.
    pub(crate) queue: Option<WriteQueue>,
}

impl ProviderShared {
    /// Whether lines handed to [`enqueue`](Self::enqueue) can still reach a
    /// file.
    pub(crate) fn is_writing(&self) -> bool {
        self.queue.as_ref().is_some_and(|queue| !queue.is_closed())
    }

    pub(crate) fn enqueue(&self, line: String) {
        if let Some(queue) = &self.queue {
            queue.enqueue(line);
        }
    }
}

/// The background thread draining the queue into the file writer.
struct Worker {
    handle: JoinHandle<()>,
    /// Dropped to ask the worker to drain what is queued and exit.
    shutdown: Sender<()>,
    finished: Receiver<()>,
    abandon: Arc<AtomicBool>,
}

impl Worker {
    fn spawn(writer: FileWriter, receiver: Receiver<String>, shared: Arc<ProviderShared>) -> Result<Self, FileLoggerError> {
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (finished_tx, finished) = crossbeam_channel::bounded::<()>(1);
        let abandon = Arc::new(AtomicBool::new(false));
        let drain = Drain {
            writer,
            receiver,
            shutdown: shutdown_rx,
            shared,
            abandon: abandon.clone(),
            stopped: false,
        };
        let handle = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || {
                drain.run();
                let _ = finished_tx.send(());
            })
            .map_err(|err| FileLoggerError::InternalError(err.to_string()))?;
        Ok(Worker {
            handle,
            shutdown,
            finished,
            abandon,
        })
    }

    /// Let the worker drain for at most `grace`, then make it drop the rest.
    fn stop(self, grace: Duration) {
        let Worker {
            handle,
            shutdown,
            finished,
            abandon,
        } = self;
        drop(shutdown);
        match finished.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("log writer thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // The worker closes the file after its in-flight write.
                abandon.store(true, Ordering::Release);
                warn!(
                    grace_period_ms = grace.as_millis() as u64,
                    "log writer did not drain in time, dropping queued lines"
                );
            }
        }
    }
}

/// The drain loop run by the worker thread. It is the only owner of the
/// file writer.
struct Drain {
    writer: FileWriter,
    receiver: Receiver<String>,
    shutdown: Receiver<()>,
    shared: Arc<ProviderShared>,
    abandon: Arc<AtomicBool>,
    /// Set after an unrecoverable failure; lines are then discarded.
    stopped: bool,
}

impl Drain {
    fn run(mut self) {
        loop {
            let line = crossbeam_channel::select! {
                recv(self.receiver) -> line => line.ok(),
                recv(self.shutdown) -> _ => None,
            };
            let Some(line) = line else {
                break;
            };
            if self.abandoned() {
                break;
            }
            self.write(&line);
        }

        // Whatever was queued before the shutdown signal.
        while let Ok(line) = self.receiver.try_recv() {
            if self.abandoned() {
                break;
            }
            self.write(&line);
        }
        self.writer.close();
    }

    fn abandoned(&self) -> bool {
        self.abandon.load(Ordering::Acquire)
    }

    fn write(&mut self, line: &str) {
        if self.stopped {
            return;
        }
        // Flushing only when nothing else is waiting keeps bursts cheap and
        // quiet periods on disk.
        let flush = self.receiver.is_empty();
        let Err(err) = self.writer.write(line, flush) else {
            return;
        };
        if let Err(err) = self.writer.recover_and_retry(err, line, flush) {
            error!(
                path = %self.writer.curr_file_path().display(),
                error = %err,
                "log file is unusable, file logging stopped"
            );
            if let Some(queue) = &self.shared.queue {
                queue.close();
            }
            self.stopped = true;
        }
    }
}

/// Owns the log file, the write queue and the loggers handed out per
/// category.
///
/// Building a provider opens the initial log file and starts a background
/// thread that performs every file write, so log calls on any thread only
/// format and enqueue. Dropping the provider disposes it.
///
/// # Examples
///
/// ```no_run
/// use rollfile::{FileLoggerBuilder, WriteMode};
///
/// let provider = FileLoggerBuilder::new("./logs/app.log")
///     .write_mode(WriteMode::Append)
///     .build()
///     .unwrap();
/// let logger = provider.create_logger("app::startup");
/// logger.info("listening on port 8080");
/// provider.dispose();
/// ```
pub struct FileLoggerProvider {
    shared: Arc<ProviderShared>,
    loggers: DashMap<String, Arc<FileLogger>>,
    worker: Mutex<Option<Worker>>,
    disposed: AtomicBool,
}

impl FileLoggerProvider {
    pub(crate) fn from_meta(meta: FileLoggerMeta) -> Result<Self, FileLoggerError> {
        let settings = Arc::new(meta.settings());
        let base_path = expand_env_vars(&meta.file_path)?;
        if base_path.trim().is_empty() {
            warn!("no log file path configured, file logging is disabled");
            return Ok(Self::disabled(settings));
        }

        let mut writer = FileWriter::new(base_path, meta.policy(), settings.clone(), meta.file_opener.clone())?;
        writer.open(meta.write_mode)?;

        let (queue, receiver) = WriteQueue::new();
        let shared = Arc::new(ProviderShared {
            settings,
            queue: Some(queue),
        });
        let worker = Worker::spawn(writer, receiver, shared.clone())?;
        Ok(FileLoggerProvider {
            shared,
            loggers: DashMap::new(),
            worker: Mutex::new(Some(worker)),
            disposed: AtomicBool::new(false),
        })
    }

    fn disabled(settings: Arc<Settings>) -> Self {
        FileLoggerProvider {
            shared: Arc::new(ProviderShared { settings, queue: None }),
            loggers: DashMap::new(),
            worker: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Return the logger for `category`, creating it on first use.
    pub fn create_logger(&self, category: &str) -> Arc<FileLogger> {
        if self.disposed.load(Ordering::Acquire) {
            return Arc::new(FileLogger::new(category.to_string(), self.shared.clone()));
        }
        self.loggers
            .entry(category.to_string())
            .or_insert_with(|| Arc::new(FileLogger::new(category.to_string(), self.shared.clone())))
            .value()
            .clone()
    }

    /// Whether log calls still reach a file. `false` for a provider without
    /// a path, after disposal, and after an unrecoverable file failure.
    pub fn is_writing(&self) -> bool {
        self.shared.is_writing()
    }

    pub fn min_level(&self) -> LogLevel {
        self.shared.settings.min_level()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.shared.settings.set_min_level(level);
    }

    pub fn use_utc_timestamp(&self) -> bool {
        self.shared.settings.use_utc_timestamp()
    }

    pub fn set_use_utc_timestamp(&self, utc: bool) {
        self.shared.settings.set_use_utc_timestamp(utc);
    }

    pub fn set_format_entry(&self, formatter: Option<EntryFormatter>) {
        self.shared.settings.set_format_entry(formatter);
    }

    pub fn set_filter_entry(&self, filter: Option<EntryFilter>) {
        self.shared.settings.set_filter_entry(filter);
    }

    pub fn set_format_file_name(&self, formatter: Option<FileNameFormatter>) {
        self.shared.settings.set_format_file_name(formatter);
    }

    pub fn set_handle_file_error(&self, handler: Option<FileErrorHandler>) {
        self.shared.settings.set_handle_file_error(handler);
    }

    /// Stop accepting lines, give the writer [`DISPOSE_GRACE_PERIOD`] to drain
    /// the queue, release the file and forget all loggers.
    ///
    /// Never blocks longer than the grace period; lines still queued after it
    /// are dropped. In that case the file is closed by the writer thread once
    /// its in-flight write returns, so a write that hangs keeps the file open
    /// after `dispose` has returned. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(queue) = &self.shared.queue {
            queue.close();
        }
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            worker.stop(DISPOSE_GRACE_PERIOD);
        }
        self.loggers.clear();
    }
}

impl LoggerProvider for FileLoggerProvider {
    type Logger = Arc<FileLogger>;

    fn create_logger(&self, category: &str) -> Self::Logger {
        FileLoggerProvider::create_logger(self, category)
    }

    fn dispose(&self) {
        FileLoggerProvider::dispose(self)
    }
}

impl Drop for FileLoggerProvider {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for FileLoggerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLoggerProvider")
            .field("writing", &self.is_writing())
            .field("loggers", &self.loggers.len())
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}
