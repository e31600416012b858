use {
    rollfile::{FileLoggerBuilder, FileLoggerLayer, LogLevel},
    std::sync::Arc,
    tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let provider = Arc::new(
        FileLoggerBuilder::new("./logs/tracing.log")
            .min_level(LogLevel::Information)
            .max_file_bytes(1024 * 1024)
            .max_rolling_files(3)
            .build()?,
    );
    tracing_subscriber::registry()
        .with(FileLoggerLayer::new(provider.clone()))
        .try_init()?;

    tracing::info!("This is an info message");
    tracing::warn!(retries = 3, "This is a warning message");
    tracing::error!("This is an error message");

    provider.dispose();
    Ok(())
}
