use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_mail::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::*;
use crate::settings::Settings;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub otp_service: Arc<dyn OtpService>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let otp_store: Arc<dyn OtpStore> = match settings.otp.store.as_str() {
            "memory" => Arc::new(MemoryOtpStore::new()),
            "redis" => {
                let redis = settings.redis.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("otp.store = \"redis\" needs a [redis] section")
                })?;
                let redis_client = redis::Client::open(redis.dsn.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisOtpStore::new(redis_manager, redis.prefix.clone()))
            }
            other => return Err(anyhow::anyhow!("Unknown otp store: {}", other)),
        };

        let otp_sender: Arc<dyn OtpSender> = match settings.otp.delivery.as_str() {
            "log" => Arc::new(LogOtpSender::new()),
            "smtp" => {
                let smtp = settings.smtp.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("otp.delivery = \"smtp\" needs a [smtp] section")
                })?;
                let password = std::env::var("SMTP_PASSWORD")
                    .map_err(|_| anyhow::anyhow!("SMTP_PASSWORD is not set"))?;
                Arc::new(SmtpOtpSender::try_new(SmtpConfig {
                    host: smtp.host.clone(),
                    port: smtp.port,
                    username: smtp.username.clone(),
                    password,
                    from: smtp.from.clone(),
                    timeout: Duration::from_secs(smtp.timeout_secs),
                    platform_name: smtp.platform_name.clone(),
                    code_ttl_minutes: code_ttl_minutes(settings.otp.ttl_secs),
                })?)
            }
            other => return Err(anyhow::anyhow!("Unknown otp delivery: {}", other)),
        };

        let hmac_key = std::env::var("OTP_HMAC_KEY")
            .unwrap_or_else(|_| "my-dev-otp-key".to_string())
            .into_bytes();
        let policy = OtpPolicy {
            ttl: chrono::Duration::seconds(settings.otp.ttl_secs as i64),
            max_attempts: settings.otp.max_attempts,
            code_length: settings.otp.code_length,
        };

        let otp_service: Arc<dyn OtpService> = Arc::new(RealOtpService::new(
            otp_store,
            otp_sender,
            Arc::new(SystemClock),
            policy,
            hmac_key,
        ));

        let sweep_interval = match settings.otp.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self::new(otp_service, sweep_interval))
    }

    /// Starts the expiry sweeper (when an interval is given) around an
    /// already-built service.
    pub fn new(otp_service: Arc<dyn OtpService>, sweep_interval: Option<Duration>) -> Self {
        let cancel = CancellationToken::new();

        let sweeper_handle = sweep_interval.map(|interval| {
            let sweeper = OtpSweeper::new(otp_service.clone(), interval, cancel.clone());
            tokio::spawn(async move {
                let _ = sweeper.run().await;
            })
        });
        if sweeper_handle.is_none() {
            info!("otp sweeper disabled");
        }

        info!("server started");

        Self {
            otp_service,
            sweeper_handle: Mutex::new(sweeper_handle),
            cancel,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self.sweeper_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("sweeper handle dropped: {:?}", r);
        }
    }
}

/// Lifetime quoted in delivery mails, rounded up so short ttls never read
/// as "0 minutes".
fn code_ttl_minutes(ttl_secs: u64) -> i64 {
    ttl_secs.div_ceil(60) as i64
}
