//! Walks through issue, verify, lockout and resend against the in-memory
//! backend, printing each outcome.
//!
//! $ cargo run --bin otp_demo

use chrono::{Duration, Utc};
use dream_otp::application_impl::*;
use dream_otp::application_port::*;
use dream_otp::domain_model::OtpPurpose;
use dream_otp::domain_port::ManualClock;
use dream_otp::infra_mail::RecordingOtpSender;
use dream_otp::infra_memory::MemoryOtpStore;
use dream_otp::logger::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _logger = Logger::new_bootstrap();

    let sender = Arc::new(RecordingOtpSender::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let otp = RealOtpService::new(
        Arc::new(MemoryOtpStore::new()),
        sender.clone(),
        clock.clone(),
        OtpPolicy::default(),
        b"demo-key".to_vec(),
    );

    // A: three wrong guesses, then lockout
    let a = OtpTarget::new("a@x.com", OtpPurpose::Registration);
    println!("issue a: {:?}", otp.issue(a.clone()).await?);
    for _ in 0..4 {
        let result = otp
            .verify(VerifyInput {
                target: a.clone(),
                code: "not-a-code".to_string(),
            })
            .await;
        println!("verify a (wrong): {:?}", result.map_err(|e| e.to_string()));
    }
    println!("status a: {:?}", otp.status(a).await?);

    // B: verify then check the flag
    let b = OtpTarget::new("b@x.com", OtpPurpose::PasswordReset);
    otp.issue(b.clone()).await?;
    let code = sender.last_code("b@x.com").unwrap_or_default();
    otp.verify(VerifyInput {
        target: b.clone(),
        code,
    })
    .await?;
    println!("is_verified b: {:?}", otp.is_verified(b.clone()).await?);
    otp.consume(b).await?;

    // C: resend is refused while the first code is live
    let c = OtpTarget::new("c@x.com", OtpPurpose::Registration);
    otp.issue(c.clone()).await?;
    clock.advance(Duration::seconds(45));
    println!(
        "resend c: {:?}",
        otp.resend(c.clone()).await.map_err(|e| e.to_string())
    );
    clock.advance(Duration::minutes(10));
    println!("swept: {}", otp.sweep_expired().await?);
    println!("resend c later: {:?}", otp.resend(c).await?);

    info!(deliveries = sender.deliveries().len(), "demo finished");
    Ok(())
}
