use crate::application_port::OtpService;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodically drops expired otp records. Purely housekeeping: every read
/// path checks expiry on its own.
pub struct OtpSweeper {
    otp_service: Arc<dyn OtpService>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl OtpSweeper {
    pub fn new(
        otp_service: Arc<dyn OtpService>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            otp_service,
            interval,
            cancellation_token,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("OtpSweeper shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    match self.otp_service.sweep_expired().await {
                        Ok(removed) => tracing::debug!(removed, "otp sweep finished"),
                        Err(e) => tracing::error!("OtpSweeper error: {:#}", e),
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{OtpPolicy, RealOtpService};
    use crate::application_port::OtpTarget;
    use crate::domain_model::OtpPurpose;
    use crate::domain_port::ManualClock;
    use crate::infra_mail::RecordingOtpSender;
    use crate::infra_memory::MemoryOtpStore;
    use chrono::Utc;

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_each_tick_until_cancelled() {
        let store = Arc::new(MemoryOtpStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service: Arc<dyn OtpService> = Arc::new(RealOtpService::new(
            store.clone(),
            Arc::new(RecordingOtpSender::new()),
            clock.clone(),
            OtpPolicy::default(),
            b"sweeper-key".to_vec(),
        ));
        service
            .issue(OtpTarget::new("a@x.com", OtpPurpose::Registration))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(11));

        let cancel = CancellationToken::new();
        let sweeper = OtpSweeper::new(service, Duration::from_secs(300), cancel.clone());
        let handle = tokio::spawn(async move { sweeper.run().await });

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(store.is_empty());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
