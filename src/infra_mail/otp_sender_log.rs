use crate::domain_model::OtpPurpose;
use crate::domain_port::*;
use crate::logger::*;

/// Prints codes to the log instead of sending them. Development only.
#[derive(Debug, Default)]
pub struct LogOtpSender;

impl LogOtpSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl OtpSender for LogOtpSender {
    async fn send(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<(), DeliveryFailure> {
        info!(identifier, %purpose, code, "otp delivery (log backend)");
        Ok(())
    }
}
