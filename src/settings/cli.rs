use super::Parser;

/// One-time passcode service for Dream Society.
#[derive(Parser, Debug)]
#[command(name = "dream-otp", version)]
pub struct Cli {
    /// Path to a settings file; defaults to `settings/dev.toml` in debug builds.
    #[arg(long)]
    pub settings: Option<String>,
}
