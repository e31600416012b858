use {
    rollfile::{FileLoggerBuilder, LogLevel},
    std::io,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only errors go to this file, and a failing file is swapped for a
    // fallback next to it.
    let provider = FileLoggerBuilder::new("./logs/error.log")
        .filter_entry(|message| message.level() >= LogLevel::Error)
        .max_file_bytes(64 * 1024)
        .max_rolling_files(4) // error.log, error1.log, error2.log, error3.log
        .handle_file_error(|error| {
            eprintln!("cannot use {}: {}", error.file_name().display(), error.error());
            Some("./logs/error_fallback.log".to_string())
        })
        .build()?;

    let logger = provider.create_logger("server");
    for error_code in [500, 502, 503, 504] {
        let cause = io::Error::new(io::ErrorKind::ConnectionReset, "upstream closed the connection");
        logger.log_error(
            LogLevel::Error,
            format!("Error {error_code}: Server encountered an internal error, please try again later"),
            &cause,
        );
        logger.info("this line is filtered out");
    }

    provider.dispose();
    Ok(())
}
