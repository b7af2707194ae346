use log::info;

/// Initializes process-wide logging. The default level comes from the
/// `LOG_LEVEL` config value; chatty dependencies are capped at warn.
pub fn setup_logging(level: Option<&str>) -> Result<(), fern::InitError> {
    let level = match level.unwrap_or("info") {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized at {} level.", level);
    Ok(())
}
