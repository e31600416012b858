use rollfile::{FileLoggerBuilder, WriteMode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let provider = FileLoggerBuilder::new("./logs/sized.log")
        .write_mode(WriteMode::Append)
        .max_file_bytes(16 * 1024) // Rotate at 16 KB
        .max_rolling_files(3) // sized.log, sized1.log, sized2.log, then reuse sized.log
        .build()?;

    let logger = provider.create_logger("sized");
    for i in 0..2000 {
        logger.info(format!("This is message number {i}"));
    }

    provider.dispose();
    Ok(())
}
