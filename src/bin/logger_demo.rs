use dream_otp::logger::*;

fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    trace!("bootstrap trace log");
    debug!("bootstrap debug log");
    info!("bootstrap info log");

    let config = LogConfig {
        filter: "debug,dream_otp=trace".to_string(),
    };
    logger.reload_from_config(&config)?;
    trace!(target: "dream_otp::demo", "application trace log");
    debug!(identifier = "a@x.com", "application debug log");
    info!("application info log");

    Ok(())
}
