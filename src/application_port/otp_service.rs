use crate::domain_model::OtpPurpose;
use crate::domain_port::{DeliveryFailure, OtpStoreError};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct OtpTarget {
    pub identifier: String,
    pub purpose: OtpPurpose,
}

impl OtpTarget {
    pub fn new(identifier: impl Into<String>, purpose: OtpPurpose) -> Self {
        Self {
            identifier: identifier.into(),
            purpose,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifyInput {
    pub target: OtpTarget,
    pub code: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct Issued {
    pub expires_in_secs: i64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VerificationCheck {
    Verified,
    Pending,
    NotFound,
    Expired,
}

impl VerificationCheck {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationCheck::Verified)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct OtpStatus {
    pub exists: bool,
    pub verified: Option<bool>,
    pub attempts: Option<u32>,
    pub time_left_secs: Option<i64>,
}

impl OtpStatus {
    pub fn absent() -> Self {
        Self {
            exists: false,
            verified: None,
            attempts: None,
            time_left_secs: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("identifier must not be empty")]
    InvalidIdentifier,
    #[error("no active code, request a new code")]
    NotFound,
    #[error("code expired, request a new code")]
    Expired,
    #[error("maximum attempts exceeded, request a new code")]
    AttemptsExceeded,
    #[error("invalid code, check your code and try again ({remaining_attempts} attempt(s) left)")]
    Mismatch { remaining_attempts: u32 },
    #[error("a code was already sent, wait {wait_secs} seconds before requesting another")]
    AlreadyLive { wait_secs: i64 },
    #[error("code has not been verified yet")]
    NotVerified,
    #[error("could not deliver code: {0}")]
    Delivery(#[from] DeliveryFailure),
    #[error("infra error: {0}")]
    Store(String),
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<OtpStoreError> for OtpError {
    fn from(err: OtpStoreError) -> Self {
        match err {
            OtpStoreError::Store(e) => OtpError::Store(e),
            OtpStoreError::Codec(e) => OtpError::Store(e),
        }
    }
}

#[async_trait::async_trait]
pub trait OtpService: Send + Sync {
    /// Issues a fresh code, replacing any previous one for the target, and
    /// hands it to the delivery channel.
    async fn issue(&self, target: OtpTarget) -> Result<Issued, OtpError>;

    async fn verify(&self, input: VerifyInput) -> Result<(), OtpError>;

    /// Like `issue`, but refuses while a usable code is still outstanding.
    async fn resend(&self, target: OtpTarget) -> Result<Issued, OtpError>;

    async fn is_verified(&self, target: OtpTarget) -> Result<VerificationCheck, OtpError>;

    async fn status(&self, target: OtpTarget) -> Result<OtpStatus, OtpError>;

    /// Removes a verified record once the flow it guarded has completed.
    async fn consume(&self, target: OtpTarget) -> Result<(), OtpError>;

    /// Deletes every expired record, returning how many were removed.
    async fn sweep_expired(&self) -> Result<usize, OtpError>;
}
