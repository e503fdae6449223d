use crate::domain_model::{OtpKey, OtpRecord};

/// Keyed storage for otp records. Implementations must make each call
/// atomic for its key.
#[async_trait::async_trait]
pub trait OtpStore: Send + Sync {
    async fn get(&self, key: &OtpKey) -> Result<Option<OtpRecord>, OtpStoreError>;

    /// Unconditionally overwrites whatever is stored under `record.key`.
    async fn put(&self, record: &OtpRecord) -> Result<(), OtpStoreError>;

    async fn delete(&self, key: &OtpKey) -> Result<(), OtpStoreError>;

    async fn scan_all(&self) -> Result<Vec<OtpRecord>, OtpStoreError>;

    /// Replaces (or deletes, when `next` is `None`) the record under `key`
    /// only if it still carries `expected_revision`. An `expected_revision`
    /// of `None` requires the key to be absent. Returns whether the swap
    /// happened.
    async fn compare_and_swap(
        &self,
        key: &OtpKey,
        expected_revision: Option<u64>,
        next: Option<&OtpRecord>,
    ) -> Result<bool, OtpStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OtpStoreError {
    #[error("infra error: {0}")]
    Store(String),
    #[error("codec error: {0}")]
    Codec(String),
}
