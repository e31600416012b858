use {
    rollfile::{
        EventId, FileLoggerBuilder, FileLoggerError, FileOpener, FsOpener, LogLevel, LoggerProvider, WriteMode,
        DISPOSE_GRACE_PERIOD,
    },
    std::{
        collections::HashMap,
        ffi::OsStr,
        fs,
        io::{self, Write},
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        thread,
        time::{Duration, Instant},
    },
};

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn append_preserves_existing_content_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("append.log");
    fs::write(&file, "previous run\n").unwrap();

    let provider = FileLoggerBuilder::new(path_string(&file))
        .write_mode(WriteMode::Append)
        .build()
        .unwrap();
    let logger = provider.create_logger("Append");
    logger.trace("trace world");
    logger.debug("debug world");
    logger.info("info world");
    logger.warn("warn world");
    logger.error("error world");
    logger.critical("critical world");
    provider.dispose();

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[0], "previous run");
    let expected = [
        ("TRACE", "trace world"),
        ("DEBUG", "debug world"),
        ("INFO", "info world"),
        ("WARN", "warn world"),
        ("ERROR", "error world"),
        ("CRIT", "critical world"),
    ];
    for (line, (level, text)) in lines[1..].iter().zip(expected) {
        let parts: Vec<&str> = line.split('\t').collect();
        assert_eq!(parts[1], level);
        assert_eq!(parts[2], "[Append]");
        assert_eq!(parts[3], "[0]");
        assert_eq!(parts[4], text);
    }

    let provider = FileLoggerBuilder::new(path_string(&file)).build().unwrap();
    provider.create_logger("Append2").info("Just message");
    provider.dispose();

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 8);
    assert!(lines[7].ends_with("\tINFO\t[Append2]\t[0]\tJust message"));
}

#[test]
fn overwrite_truncates_once_per_construction() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("overwrite.log");
    fs::write(&file, "old line 1\nold line 2\n").unwrap();

    let provider = FileLoggerBuilder::new(path_string(&file))
        .write_mode(WriteMode::Overwrite)
        .build()
        .unwrap();
    let logger = provider.create_logger("Override1");
    logger.info("first");
    logger.info("second");
    provider.dispose();

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("\tfirst"));
    assert!(lines[1].ends_with("\tsecond"));

    let provider = FileLoggerBuilder::new(path_string(&file))
        .write_mode(WriteMode::Overwrite)
        .build()
        .unwrap();
    provider.create_logger("Override2").info("replacement");
    provider.dispose();

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("\t[Override2]\t[0]\treplacement"));
}

#[test]
fn size_limit_spreads_lines_over_files() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("sized.log");
    let limit = 512;

    let provider = FileLoggerBuilder::new(path_string(&file))
        .max_file_bytes(limit)
        .build()
        .unwrap();
    let logger = provider.create_logger("Sized");
    for i in 0..200 {
        logger.info(format!("message number {i:04}"));
    }
    provider.dispose();

    let files = files_in(dir.path());
    assert!(files.len() > 3, "expected several files, got {files:?}");

    let mut total = 0;
    let mut longest = 0;
    for path in &files {
        let lines = read_lines(path);
        total += lines.len();
        longest = lines.iter().map(|l| l.len() + 1).max().unwrap_or(0).max(longest);
    }
    assert_eq!(total, 200);
    for path in &files {
        let len = fs::metadata(path).unwrap().len();
        assert!(len <= limit + longest as u64, "{} holds {len} bytes", path.display());
    }
    // No cap: one new member per rotation.
    assert!(files.contains(&dir.path().join("sized1.log")));
    assert!(files.contains(&dir.path().join(format!("sized{}.log", files.len() - 1))));
}

#[test]
fn rolling_cap_bounds_file_count() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("test.log");

    let provider = FileLoggerBuilder::new(path_string(&file))
        .max_file_bytes(4 * 1024)
        .max_rolling_files(3)
        .write_mode(WriteMode::Append)
        .build()
        .unwrap();
    let logger = provider.create_logger("MaxRollingLogger");
    for i in 0..300 {
        logger.info(format!("hello world, this is logger test {i:03}"));
    }
    provider.dispose();

    let files = files_in(dir.path());
    assert_eq!(
        files,
        vec![
            dir.path().join("test.log"),
            dir.path().join("test1.log"),
            dir.path().join("test2.log"),
        ]
    );
    // Wrapping truncated the oldest members, so some lines are gone.
    let total: usize = files.iter().map(|path| read_lines(path).len()).sum();
    assert!(total < 300);
    let all: Vec<String> = files.iter().flat_map(|path| read_lines(path)).collect();
    assert!(all.iter().any(|line| line.ends_with("logger test 299")));
}

#[test]
fn changed_file_name_rotates_without_size_limit() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("daily.log");
    let generation = Arc::new(AtomicUsize::new(0));
    let formatter_generation = generation.clone();

    let provider = FileLoggerBuilder::new(path_string(&file))
        .format_file_name(move |path| {
            let generation = formatter_generation.load(Ordering::SeqCst);
            path.replace("daily.log", &format!("daily-{generation}.log"))
        })
        .build()
        .unwrap();
    let logger = provider.create_logger("Daily");
    let first = dir.path().join("daily-0.log");
    let second = dir.path().join("daily-1.log");

    logger.info("day one");
    assert!(wait_until(|| read_lines(&first).len() == 1));
    generation.store(1, Ordering::SeqCst);
    logger.info("day two");
    provider.dispose();

    assert!(!file.exists());
    let first_lines = read_lines(&first);
    let second_lines = read_lines(&second);
    assert_eq!(first_lines.len(), 1);
    assert!(first_lines[0].ends_with("\tday one"));
    assert_eq!(second_lines.len(), 1);
    assert!(second_lines[0].ends_with("\tday two"));
}

#[test]
fn rejected_messages_never_reach_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("filtered.log");

    let provider = FileLoggerBuilder::new(path_string(&file))
        .filter_entry(|message| message.level() < LogLevel::Error && !message.text().contains("secret"))
        .build()
        .unwrap();
    let logger = provider.create_logger("Filtered");
    logger.info("kept");
    logger.error("dropped by level");
    logger.info("dropped secret");
    logger.warn("also kept");
    provider.dispose();

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("\tkept"));
    assert!(lines[1].ends_with("\talso kept"));
}

#[test]
fn custom_line_formatter_replaces_layout() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("custom.log");

    let provider = FileLoggerBuilder::new(path_string(&file))
        .format_entry(|message| {
            format!(
                "{}|{}|{}|{}",
                message.level(),
                message.category(),
                message.event_id().id(),
                message.text()
            )
        })
        .build()
        .unwrap();
    let logger = provider.create_logger("Custom");
    logger.log(LogLevel::Warning, &EventId::named(12, "io"), 3, None, |count, _| {
        format!("{count} retries")
    });
    provider.dispose();

    assert_eq!(read_lines(&file), vec!["WARN|Custom|12|3 retries".to_string()]);
}

#[test]
fn min_level_can_change_after_startup() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("levels.log");

    let provider = FileLoggerBuilder::new(path_string(&file))
        .min_level(LogLevel::Debug)
        .build()
        .unwrap();
    let logger = provider.create_logger("Levels");
    assert!(!logger.is_enabled(LogLevel::Trace));
    logger.trace("below minimum");
    logger.debug("at minimum");

    provider.set_min_level(LogLevel::Warning);
    assert_eq!(provider.min_level(), LogLevel::Warning);
    logger.info("now below minimum");
    logger.warn("above minimum");
    provider.dispose();

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("\tat minimum"));
    assert!(lines[1].ends_with("\tabove minimum"));
}

#[test]
fn concurrent_producers_lose_and_duplicate_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("concurrent.log");
    let producers = 8;
    let per_producer = 500;

    let provider = Arc::new(FileLoggerBuilder::new(path_string(&file)).build().unwrap());
    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let provider = provider.clone();
            thread::spawn(move || {
                let logger = provider.create_logger(&format!("producer{p}"));
                for i in 0..per_producer {
                    logger.info(format!("message {i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    provider.dispose();

    let lines = read_lines(&file);
    assert_eq!(lines.len(), producers * per_producer);

    let mut last_seen: HashMap<String, i64> = HashMap::new();
    for line in &lines {
        let parts: Vec<&str> = line.split('\t').collect();
        let index: i64 = parts[4].trim_start_matches("message ").parse().unwrap();
        let previous = last_seen.entry(parts[2].to_string()).or_insert(-1);
        // Each producer's own lines stay in order.
        assert_eq!(index, *previous + 1, "{line}");
        *previous = index;
    }
    assert_eq!(last_seen.len(), producers);
    assert!(last_seen.values().all(|&last| last == per_producer as i64 - 1));
}

#[test]
fn open_failure_without_handler_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("blocked"), "").unwrap();
    let file = dir.path().join("blocked").join("app.log");

    let err = FileLoggerBuilder::new(path_string(&file)).build().unwrap_err();
    assert!(matches!(err, FileLoggerError::Open { .. }), "{err}");
}

#[test]
fn open_failure_is_redirected_by_the_handler() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("blocked"), "").unwrap();
    let file = dir.path().join("blocked").join("app.log");
    let alternative = dir.path().join("app_alt.log");
    let alternative_name = path_string(&alternative);
    let failed_on = Arc::new(Mutex::new(None));
    let recorded = failed_on.clone();

    let provider = FileLoggerBuilder::new(path_string(&file))
        .handle_file_error(move |error| {
            *recorded.lock().unwrap() = Some(error.file_name().to_path_buf());
            Some(alternative_name.clone())
        })
        .build()
        .unwrap();
    provider.create_logger("Redirected").info("written to the alternative");
    provider.dispose();

    assert_eq!(failed_on.lock().unwrap().as_deref(), Some(file.as_path()));
    let lines = read_lines(&alternative);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("\twritten to the alternative"));
}

#[test]
fn declined_open_failure_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("blocked"), "").unwrap();
    let file = dir.path().join("blocked").join("app.log");

    let err = FileLoggerBuilder::new(path_string(&file))
        .handle_file_error(|_| None)
        .build()
        .unwrap_err();
    assert!(matches!(err, FileLoggerError::Unrecovered { .. }), "{err}");
}

/// Accepts the open, then fails every write.
struct BrokenWriter;

impl Write for BrokenWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "device lost"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out a [`BrokenWriter`] for `primary.log` and real files otherwise.
struct BrokenPrimaryOpener;

impl FileOpener for BrokenPrimaryOpener {
    fn open(&self, path: &Path, mode: WriteMode) -> io::Result<Box<dyn Write + Send>> {
        if path.file_name() == Some(OsStr::new("primary.log")) {
            Ok(Box::new(BrokenWriter))
        } else {
            FsOpener.open(path, mode)
        }
    }
}

#[test]
fn write_failure_retries_the_line_on_the_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("primary.log");
    let alternative = dir.path().join("secondary.log");
    let alternative_name = path_string(&alternative);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let provider = FileLoggerBuilder::new(path_string(&file))
        .file_opener(Arc::new(BrokenPrimaryOpener))
        .handle_file_error(move |error| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(error.error().to_string(), "device lost");
            Some(alternative_name.clone())
        })
        .build()
        .unwrap();
    let logger = provider.create_logger("Retry");
    logger.info("one");
    logger.info("two");
    provider.dispose();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let lines = read_lines(&alternative);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("\tone"));
    assert!(lines[1].ends_with("\ttwo"));
}

#[test]
fn unrecovered_write_failure_stops_logging_silently() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("primary.log");

    let provider = FileLoggerBuilder::new(path_string(&file))
        .file_opener(Arc::new(BrokenPrimaryOpener))
        .build()
        .unwrap();
    let logger = provider.create_logger("Broken");
    assert!(provider.is_writing());
    logger.info("lost");
    assert!(wait_until(|| !provider.is_writing()));

    assert!(!logger.is_enabled(LogLevel::Critical));
    for i in 0..2000 {
        logger.critical(format!("discarded {i}"));
    }
    let started = Instant::now();
    provider.dispose();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!file.exists());
}

/// Fails every write, whatever file it is asked for.
struct AlwaysBrokenOpener;

impl FileOpener for AlwaysBrokenOpener {
    fn open(&self, _path: &Path, _mode: WriteMode) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(BrokenWriter))
    }
}

#[test]
fn failed_retry_on_the_replacement_stops_logging() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("primary.log");
    let alternative_name = path_string(&dir.path().join("secondary.log"));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let provider = FileLoggerBuilder::new(path_string(&file))
        .file_opener(Arc::new(AlwaysBrokenOpener))
        .handle_file_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(alternative_name.clone())
        })
        .build()
        .unwrap();
    let logger = provider.create_logger("Retry");
    logger.info("lost twice");
    assert!(wait_until(|| !provider.is_writing()));

    logger.info("discarded");
    let started = Instant::now();
    provider.dispose();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Takes 20 ms per write and counts the lines it received.
struct SlowWriter {
    lines: Arc<AtomicUsize>,
}

impl Write for SlowWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        thread::sleep(Duration::from_millis(20));
        let newlines = buf.iter().filter(|&&byte| byte == b'\n').count();
        self.lines.fetch_add(newlines, Ordering::SeqCst);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct SlowOpener {
    lines: Arc<AtomicUsize>,
}

impl FileOpener for SlowOpener {
    fn open(&self, _path: &Path, _mode: WriteMode) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(SlowWriter {
            lines: self.lines.clone(),
        }))
    }
}

#[test]
fn dispose_gives_up_after_the_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    let written = Arc::new(AtomicUsize::new(0));

    let provider = FileLoggerBuilder::new(path_string(&dir.path().join("slow.log")))
        .file_opener(Arc::new(SlowOpener {
            lines: written.clone(),
        }))
        .build()
        .unwrap();
    let logger = provider.create_logger("Slow");
    // Far more than fits in the grace period at 20 ms per line.
    for i in 0..500 {
        logger.info(format!("queued {i}"));
    }

    let started = Instant::now();
    provider.dispose();
    let elapsed = started.elapsed();
    assert!(elapsed >= DISPOSE_GRACE_PERIOD, "{elapsed:?}");
    assert!(elapsed < DISPOSE_GRACE_PERIOD + Duration::from_secs(1), "{elapsed:?}");
    assert!(!provider.is_writing());

    let on_disk = written.load(Ordering::SeqCst);
    assert!(on_disk < 500, "{on_disk} lines written");
    thread::sleep(Duration::from_millis(200));
    assert!(written.load(Ordering::SeqCst) <= on_disk + 1);
}

#[test]
fn dispose_drains_the_queue_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("drain.log");

    let provider = FileLoggerBuilder::new(path_string(&file)).build().unwrap();
    let logger = provider.create_logger("Drain");
    for i in 0..1000 {
        logger.info(format!("queued {i}"));
    }
    provider.dispose();
    provider.dispose();

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 1000);
    assert!(lines[999].ends_with("\tqueued 999"));

    assert!(!provider.is_writing());
    logger.info("after dispose");
    assert_eq!(read_lines(&file).len(), 1000);
}

#[test]
fn loggers_are_cached_per_category() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FileLoggerBuilder::new(path_string(&dir.path().join("cache.log")))
        .build()
        .unwrap();

    let first = provider.create_logger("cached");
    let again = provider.create_logger("cached");
    let other = provider.create_logger("other");
    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(other.category(), "other");
}

#[test]
fn works_through_the_provider_trait() {
    fn log_through<P: LoggerProvider<Logger = Arc<rollfile::FileLogger>>>(provider: &P) {
        provider.create_logger("Generic").info("via trait");
        provider.dispose();
    }

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("trait.log");
    let provider = FileLoggerBuilder::new(path_string(&file)).build().unwrap();
    log_through(&provider);

    let lines = read_lines(&file);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("\t[Generic]\t[0]\tvia trait"));
}

#[test]
fn empty_path_gives_a_disabled_provider() {
    let provider = FileLoggerBuilder::new("   ").build().unwrap();
    let logger = provider.create_logger("Disabled");

    assert!(!provider.is_writing());
    assert!(!logger.is_enabled(LogLevel::Critical));
    logger.critical("goes nowhere");
    provider.dispose();
}

#[test]
fn environment_variables_expand_in_the_path() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("ROLLFILE_IT_LOG_DIR", dir.path());

    let provider = FileLoggerBuilder::new("${ROLLFILE_IT_LOG_DIR}/nested/env.log")
        .use_utc_timestamp(true)
        .build()
        .unwrap();
    provider.create_logger("Env").info("expanded");
    provider.dispose();

    let lines = read_lines(&dir.path().join("nested").join("env.log"));
    assert_eq!(lines.len(), 1);
    let timestamp = lines[0].split('\t').next().unwrap();
    assert!(timestamp.ends_with('Z'), "{timestamp}");
}

#[test]
fn restart_resumes_latest_rotation_member() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("resume.log");
    fs::write(dir.path().join("resume.log"), "a".repeat(600) + "\n").unwrap();
    fs::write(dir.path().join("resume1.log"), "partial\n").unwrap();

    let provider = FileLoggerBuilder::new(path_string(&file))
        .max_file_bytes(512)
        .build()
        .unwrap();
    provider.create_logger("Resume").info("continued");
    provider.dispose();

    let lines = read_lines(&dir.path().join("resume1.log"));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "partial");
    assert!(lines[1].ends_with("\tcontinued"));
}
