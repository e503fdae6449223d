use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use anyhow::anyhow;
use hmac::{Hmac, KeyInit, Mac};
use rand::Rng;
use sha2::Sha256;
use std::sync::Arc;

/// Lost compare-and-swap races tolerated before giving up on a request.
const MAX_SWAP_RETRIES: usize = 8;

#[derive(Debug, Clone)]
pub struct OtpPolicy {
    pub ttl: chrono::Duration,
    pub max_attempts: u32,
    pub code_length: u32,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::minutes(10),
            max_attempts: 3,
            code_length: 6,
        }
    }
}

pub struct RealOtpService {
    store: Arc<dyn OtpStore>,
    sender: Arc<dyn OtpSender>,
    clock: Arc<dyn Clock>,
    policy: OtpPolicy,
    hmac_key: Vec<u8>,
}

impl RealOtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        sender: Arc<dyn OtpSender>,
        clock: Arc<dyn Clock>,
        policy: OtpPolicy,
        hmac_key: Vec<u8>,
    ) -> Self {
        Self {
            store,
            sender,
            clock,
            policy,
            hmac_key,
        }
    }

    fn key(target: &OtpTarget) -> Result<OtpKey, OtpError> {
        if target.identifier.trim().is_empty() {
            return Err(OtpError::InvalidIdentifier);
        }
        Ok(OtpKey::new(target.identifier.clone(), target.purpose))
    }

    fn mac(&self) -> anyhow::Result<Hmac<Sha256>> {
        Hmac::<Sha256>::new_from_slice(&self.hmac_key).map_err(|e| anyhow!(e))
    }

    fn hmac_hex(&self, key: &OtpKey, code: &str) -> anyhow::Result<String> {
        let mut mac = self.mac()?;
        mac.update(key.to_string().as_bytes());
        mac.update(b"\0");
        mac.update(code.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn code_matches(&self, record: &OtpRecord, supplied: &str) -> anyhow::Result<bool> {
        let Ok(expected) = hex::decode(&record.code_digest) else {
            return Err(anyhow!("stored digest for {} is not hex", record.key));
        };
        let mut mac = self.mac()?;
        mac.update(record.key.to_string().as_bytes());
        mac.update(b"\0");
        mac.update(supplied.trim().as_bytes());
        Ok(mac.verify_slice(&expected).is_ok())
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::rng();
        (0..self.policy.code_length)
            .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
            .collect()
    }

    /// Builds an unsaved record for `key`, returning it with the plaintext code.
    fn fresh_record(&self, key: OtpKey) -> Result<(OtpRecord, String), OtpError> {
        let code = self.generate_code();
        let digest = self.hmac_hex(&key, &code)?;
        let record = OtpRecord::issue(
            key,
            digest,
            self.clock.now(),
            self.policy.ttl,
            rand::rng().random(),
        );
        Ok((record, code))
    }

    /// Sends the code of a record that is already stored.
    async fn deliver(&self, record: &OtpRecord, code: &str) -> Result<Issued, OtpError> {
        debug!(key = %record.key, expires_at = %record.expires_at, "otp issued");

        if let Err(e) = self
            .sender
            .send(&record.key.identifier, record.key.purpose, code)
            .await
        {
            warn!(key = %record.key, error = %e, "otp delivery failed");
            return Err(OtpError::Delivery(e));
        }

        Ok(Issued {
            expires_in_secs: record.time_left_secs(self.clock.now()),
        })
    }

    /// Deletes `record` if it is still the stored revision. A lost race is
    /// not an error: someone else already replaced or removed it.
    async fn discard(&self, record: &OtpRecord) -> Result<bool, OtpError> {
        Ok(self
            .store
            .compare_and_swap(&record.key, Some(record.revision), None)
            .await?)
    }

    /// Reads the record, dropping it first if it has expired.
    async fn load_live(&self, key: &OtpKey) -> Result<Lookup, OtpError> {
        let Some(record) = self.store.get(key).await? else {
            return Ok(Lookup::Missing);
        };
        if record.is_expired(self.clock.now()) {
            self.discard(&record).await?;
            return Ok(Lookup::Expired);
        }
        Ok(Lookup::Found(record))
    }
}

enum Lookup {
    Missing,
    Expired,
    Found(OtpRecord),
}

#[async_trait::async_trait]
impl OtpService for RealOtpService {
    async fn issue(&self, target: OtpTarget) -> Result<Issued, OtpError> {
        let key = Self::key(&target)?;
        let (record, code) = self.fresh_record(key)?;
        self.store.put(&record).await?;
        self.deliver(&record, &code).await
    }

    async fn verify(&self, input: VerifyInput) -> Result<(), OtpError> {
        let key = Self::key(&input.target)?;

        for _ in 0..MAX_SWAP_RETRIES {
            let Some(record) = self.store.get(&key).await? else {
                return Err(OtpError::NotFound);
            };
            let code_matches = self.code_matches(&record, &input.code)?;

            match record.attempt(self.clock.now(), self.policy.max_attempts, code_matches) {
                AttemptOutcome::Expired => {
                    if self.discard(&record).await? {
                        debug!(%key, "otp expired");
                        return Err(OtpError::Expired);
                    }
                }
                AttemptOutcome::Exhausted => {
                    if self.discard(&record).await? {
                        info!(%key, attempts = record.attempts, "otp locked out");
                        return Err(OtpError::AttemptsExceeded);
                    }
                }
                AttemptOutcome::Accepted(next) => {
                    if self
                        .store
                        .compare_and_swap(&key, Some(record.revision), Some(&next))
                        .await?
                    {
                        debug!(%key, "otp verified");
                        return Ok(());
                    }
                }
                AttemptOutcome::Rejected {
                    next,
                    remaining_attempts,
                } => {
                    if self
                        .store
                        .compare_and_swap(&key, Some(record.revision), Some(&next))
                        .await?
                    {
                        debug!(%key, attempts = next.attempts, "otp mismatch");
                        return Err(OtpError::Mismatch { remaining_attempts });
                    }
                }
            }
        }

        Err(OtpError::InternalError(anyhow!(
            "gave up verifying {key} after {MAX_SWAP_RETRIES} concurrent modifications"
        )))
    }

    async fn resend(&self, target: OtpTarget) -> Result<Issued, OtpError> {
        let key = Self::key(&target)?;

        for _ in 0..MAX_SWAP_RETRIES {
            let current = self.store.get(&key).await?;
            if let Some(record) = &current {
                let now = self.clock.now();
                if record.is_live(now, self.policy.max_attempts) {
                    let wait_secs = record.time_left_secs(now);
                    debug!(%key, wait_secs, "otp resend refused");
                    return Err(OtpError::AlreadyLive { wait_secs });
                }
            }

            // Replace only the record inspected above; a concurrent resend
            // that got there first leaves a live record for the next pass.
            let (record, code) = self.fresh_record(key.clone())?;
            let expected = current.map(|r| r.revision);
            if self
                .store
                .compare_and_swap(&key, expected, Some(&record))
                .await?
            {
                return self.deliver(&record, &code).await;
            }
        }

        Err(OtpError::InternalError(anyhow!(
            "gave up resending {key} after {MAX_SWAP_RETRIES} concurrent modifications"
        )))
    }

    async fn is_verified(&self, target: OtpTarget) -> Result<VerificationCheck, OtpError> {
        let key = Self::key(&target)?;
        Ok(match self.load_live(&key).await? {
            Lookup::Missing => VerificationCheck::NotFound,
            Lookup::Expired => VerificationCheck::Expired,
            Lookup::Found(record) if record.verified => VerificationCheck::Verified,
            Lookup::Found(_) => VerificationCheck::Pending,
        })
    }

    async fn status(&self, target: OtpTarget) -> Result<OtpStatus, OtpError> {
        let key = Self::key(&target)?;
        Ok(match self.load_live(&key).await? {
            Lookup::Missing | Lookup::Expired => OtpStatus::absent(),
            Lookup::Found(record) => OtpStatus {
                exists: true,
                verified: Some(record.verified),
                attempts: Some(record.attempts),
                time_left_secs: Some(record.time_left_secs(self.clock.now())),
            },
        })
    }

    async fn consume(&self, target: OtpTarget) -> Result<(), OtpError> {
        let key = Self::key(&target)?;

        for _ in 0..MAX_SWAP_RETRIES {
            let record = match self.load_live(&key).await? {
                Lookup::Missing => return Err(OtpError::NotFound),
                Lookup::Expired => return Err(OtpError::Expired),
                Lookup::Found(record) => record,
            };
            if !record.verified {
                return Err(OtpError::NotVerified);
            }
            if self.discard(&record).await? {
                debug!(%key, "otp consumed");
                return Ok(());
            }
        }

        Err(OtpError::InternalError(anyhow!(
            "gave up consuming {key} after {MAX_SWAP_RETRIES} concurrent modifications"
        )))
    }

    async fn sweep_expired(&self) -> Result<usize, OtpError> {
        let now = self.clock.now();
        let mut removed = 0;
        for record in self.store.scan_all().await? {
            if record.is_expired(now) && self.discard(&record).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "swept expired otp records");
        }
        Ok(removed)
    }
}
