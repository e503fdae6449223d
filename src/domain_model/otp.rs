use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Registration,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Registration => "registration",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown otp purpose: {0}")]
pub struct UnknownPurpose(pub String);

impl FromStr for OtpPurpose {
    type Err = UnknownPurpose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(OtpPurpose::Registration),
            "password_reset" => Ok(OtpPurpose::PasswordReset),
            other => Err(UnknownPurpose(other.to_owned())),
        }
    }
}

/// Trims and case-folds an identifier the way callers are expected to
/// before handing it to the otp service.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OtpKey {
    pub identifier: String,
    pub purpose: OtpPurpose,
}

impl OtpKey {
    pub fn new(identifier: impl Into<String>, purpose: OtpPurpose) -> Self {
        Self {
            identifier: identifier.into(),
            purpose,
        }
    }
}

impl fmt::Display for OtpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.purpose, self.identifier)
    }
}

/// One live passcode. Stores only a keyed digest of the code.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct OtpRecord {
    pub key: OtpKey,
    pub code_digest: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub verified: bool,
    /// Bumped on every write-back; stores compare it before swapping.
    pub revision: u64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AttemptOutcome {
    Expired,
    Exhausted,
    Accepted(OtpRecord),
    Rejected {
        next: OtpRecord,
        remaining_attempts: u32,
    },
}

impl OtpRecord {
    pub fn issue(
        key: OtpKey,
        code_digest: String,
        now: DateTime<Utc>,
        ttl: Duration,
        revision: u64,
    ) -> Self {
        Self {
            key,
            code_digest,
            created_at: now,
            expires_at: now + ttl,
            attempts: 0,
            verified: false,
            revision,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts >= max_attempts
    }

    /// Usable for a new guess: neither expired nor locked out.
    pub fn is_live(&self, now: DateTime<Utc>, max_attempts: u32) -> bool {
        !self.is_expired(now) && !self.is_exhausted(max_attempts)
    }

    /// Whole seconds until expiry, rounded up.
    pub fn time_left_secs(&self, now: DateTime<Utc>) -> i64 {
        let left = self.expires_at - now;
        if left <= Duration::zero() {
            return 0;
        }
        let secs = left.num_seconds();
        if left > Duration::seconds(secs) {
            secs + 1
        } else {
            secs
        }
    }

    pub fn attempt(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
        code_matches: bool,
    ) -> AttemptOutcome {
        if self.is_expired(now) {
            return AttemptOutcome::Expired;
        }
        if self.is_exhausted(max_attempts) {
            return AttemptOutcome::Exhausted;
        }

        let mut next = self.clone();
        next.revision = self.revision.wrapping_add(1);
        if code_matches {
            next.verified = true;
            AttemptOutcome::Accepted(next)
        } else {
            next.attempts = self.attempts.saturating_add(1);
            let remaining_attempts = max_attempts.saturating_sub(next.attempts);
            AttemptOutcome::Rejected {
                next,
                remaining_attempts,
            }
        }
    }
}
