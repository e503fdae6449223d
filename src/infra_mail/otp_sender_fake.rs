use crate::domain_model::OtpPurpose;
use crate::domain_port::*;
use std::sync::Mutex;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Delivery {
    pub identifier: String,
    pub purpose: OtpPurpose,
    pub code: String,
}

/// Keeps every delivered code in memory so callers can read them back.
#[derive(Debug, Default)]
pub struct RecordingOtpSender {
    deliveries: Mutex<Vec<Delivery>>,
    pending_failure: Mutex<Option<DeliveryFailure>>,
}

impl RecordingOtpSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `send` fail with `failure` without recording anything.
    pub fn fail_next(&self, failure: DeliveryFailure) {
        if let Ok(mut pending) = self.pending_failure.lock() {
            *pending = Some(failure);
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .map(|deliveries| deliveries.clone())
            .unwrap_or_default()
    }

    pub fn last_code(&self, identifier: &str) -> Option<String> {
        self.deliveries()
            .into_iter()
            .rev()
            .find(|delivery| delivery.identifier == identifier)
            .map(|delivery| delivery.code)
    }
}

#[async_trait::async_trait]
impl OtpSender for RecordingOtpSender {
    async fn send(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<(), DeliveryFailure> {
        let failure = self
            .pending_failure
            .lock()
            .ok()
            .and_then(|mut pending| pending.take());
        if let Some(failure) = failure {
            return Err(failure);
        }

        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.push(Delivery {
                identifier: identifier.to_owned(),
                purpose,
                code: code.to_owned(),
            });
        }
        Ok(())
    }
}
