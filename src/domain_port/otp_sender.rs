use crate::domain_model::OtpPurpose;

/// Delivers a freshly issued code to its owner (email, sms, push...).
#[async_trait::async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<(), DeliveryFailure>;
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DeliveryFailure {
    #[error("delivery channel rejected our credentials: {0}")]
    Auth(String),
    #[error("could not reach delivery channel: {0}")]
    Connection(String),
    #[error("recipient is not deliverable: {0}")]
    InvalidRecipient(String),
}
