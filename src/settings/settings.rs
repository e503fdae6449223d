use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub otp: Otp,
    pub redis: Option<Redis>,
    pub smtp: Option<Smtp>,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Otp {
    pub store: String,    // "memory" or "redis"
    pub delivery: String, // "log" or "smtp"
    pub ttl_secs: u64,
    pub max_attempts: u32,
    pub code_length: u32,
    pub sweep_interval_secs: u64, // 0 disables the sweeper
}

#[derive(Debug, Deserialize)]
pub struct Redis {
    pub dsn: String,
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct Smtp {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub from: String,
    pub timeout_secs: u64,
    pub platform_name: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    if !(1..=9).contains(&settings.otp.code_length) {
        return Err(anyhow!(
            "otp.code_length must be between 1 and 9, got {}",
            settings.otp.code_length
        ));
    }
    if settings.otp.max_attempts == 0 || settings.otp.ttl_secs == 0 {
        return Err(anyhow!("otp.max_attempts and otp.ttl_secs must be positive"));
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_settings_parse() {
        let settings = parse_settings(Some("settings/dev.toml")).unwrap();
        assert_eq!(settings.otp.store, "memory");
        assert_eq!(settings.otp.ttl_secs, 600);
        assert_eq!(settings.otp.max_attempts, 3);
        assert_eq!(settings.otp.code_length, 6);
        assert_eq!(settings.otp.sweep_interval_secs, 300);
    }

    #[test]
    fn release_settings_parse() {
        let settings = parse_settings(Some("settings/release.toml")).unwrap();
        assert_eq!(settings.otp.store, "redis");
        assert!(settings.redis.is_some());
        assert!(settings.smtp.is_some());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("settings/does-not-exist.toml")).is_err());
    }
}
