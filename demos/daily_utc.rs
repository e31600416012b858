use rollfile::FileLoggerBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let provider = FileLoggerBuilder::new("./logs/daily.log")
        // Compute the base name on every write, so the first line after UTC
        // midnight opens tomorrow's file.
        .format_file_name(|path| {
            let stem = path.trim_end_matches(".log");
            format!("{stem}-{}.log", chrono::Utc::now().format("%Y-%m-%d"))
        })
        .use_utc_timestamp(true)
        .build()?;

    let logger = provider.create_logger("daily");
    logger.info("System startup - UTC timestamps and UTC file dates");
    logger.info("Configuration loaded successfully");
    logger.info("Server listening on port 8080");

    provider.dispose();
    Ok(())
}
