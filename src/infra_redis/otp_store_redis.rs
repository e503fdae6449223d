use crate::domain_model::{OtpKey, OtpRecord};
use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
const OTP_SWAP: &str = include_str!("otp_swap.lua");

/// Each record is a hash `{body, rev}` expiring natively at `expires_at`
/// (millisecond precision), so this store needs no sweeping.
pub struct RedisOtpStore {
    conn: ConnectionManager,
    prefix: String,
    swap: Script,
}

impl RedisOtpStore {
    pub fn new(conn: ConnectionManager, prefix: String) -> Self {
        RedisOtpStore {
            conn,
            prefix,
            swap: Script::new(OTP_SWAP),
        }
    }

    fn key(&self, key: &OtpKey) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn encode(record: &OtpRecord) -> Result<String, OtpStoreError> {
        serde_json::to_string(record).map_err(|e| OtpStoreError::Codec(e.to_string()))
    }

    fn decode(body: &str) -> Result<OtpRecord, OtpStoreError> {
        serde_json::from_str(body).map_err(|e| OtpStoreError::Codec(e.to_string()))
    }

    async fn body(&self, redis_key: &str) -> Result<Option<OtpRecord>, OtpStoreError> {
        let mut conn = self.conn.clone();
        let body: Option<String> = conn
            .hget(redis_key, "body")
            .await
            .map_err(|e| OtpStoreError::Store(e.to_string()))?;
        body.as_deref().map(Self::decode).transpose()
    }
}

#[async_trait::async_trait]
impl OtpStore for RedisOtpStore {
    async fn get(&self, key: &OtpKey) -> Result<Option<OtpRecord>, OtpStoreError> {
        self.body(&self.key(key)).await
    }

    async fn put(&self, record: &OtpRecord) -> Result<(), OtpStoreError> {
        let key = &self.key(&record.key);
        let body = Self::encode(record)?;
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .hset_multiple(key, &[("body", body), ("rev", record.revision.to_string())])
            .ignore()
            .pexpire_at(key, record.expires_at.timestamp_millis())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| OtpStoreError::Store(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &OtpKey) -> Result<(), OtpStoreError> {
        let key = &self.key(key);
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| OtpStoreError::Store(e.to_string()))?;
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<OtpRecord>, OtpStoreError> {
        let pattern = format!("{}:*", self.prefix);
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut records = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(256)
                .query_async(&mut conn)
                .await
                .map_err(|e| OtpStoreError::Store(e.to_string()))?;

            for key in keys {
                // Keys can expire between SCAN and HGET.
                if let Some(record) = self.body(&key).await? {
                    records.push(record);
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(records)
    }

    async fn compare_and_swap(
        &self,
        key: &OtpKey,
        expected_revision: Option<u64>,
        next: Option<&OtpRecord>,
    ) -> Result<bool, OtpStoreError> {
        let key = &self.key(key);
        let expected = expected_revision.map(|rev| rev.to_string()).unwrap_or_default();
        let (body, revision, expire_at) = match next {
            Some(record) => (
                Self::encode(record)?,
                record.revision.to_string(),
                record.expires_at.timestamp_millis(),
            ),
            None => (String::new(), String::new(), 0),
        };

        let mut conn = self.conn.clone();
        let swapped: i64 = self
            .swap
            .key(key)
            .arg(expected)
            .arg(body)
            .arg(revision)
            .arg(expire_at)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| OtpStoreError::Store(e.to_string()))?;

        Ok(swapped == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::OtpPurpose;
    use chrono::{Duration, Utc};

    /// Connects to `REDIS_URL` with a throwaway prefix, or `None` when unset.
    async fn store() -> Option<RedisOtpStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let conn = redis::Client::open(url)
            .unwrap()
            .get_connection_manager()
            .await
            .unwrap();
        let prefix = format!("otp-test-{}", rand::random::<u32>());
        Some(RedisOtpStore::new(conn, prefix))
    }

    fn record(identifier: &str, revision: u64) -> OtpRecord {
        OtpRecord::issue(
            OtpKey::new(identifier, OtpPurpose::Registration),
            "digest".to_string(),
            Utc::now(),
            Duration::minutes(10),
            revision,
        )
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn put_then_get_keeps_the_record() {
        let Some(store) = store().await else { return };
        let r = record("a@x.com", u64::MAX - 1);
        store.put(&r).await.unwrap();

        assert_eq!(store.get(&r.key).await.unwrap(), Some(r.clone()));
        let mut conn = store.conn.clone();
        let ttl_ms: i64 = conn.pttl(store.key(&r.key)).await.unwrap();
        assert!(ttl_ms > 590_000 && ttl_ms <= 600_000);

        store.delete(&r.key).await.unwrap();
        assert_eq!(store.get(&r.key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn swap_on_missing_key_fails() {
        let Some(store) = store().await else { return };
        let r = record("a@x.com", 1);
        assert!(!store.compare_and_swap(&r.key, Some(1), Some(&r)).await.unwrap());
        assert!(!store.compare_and_swap(&r.key, Some(1), None).await.unwrap());
        assert_eq!(store.get(&r.key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn swap_requires_matching_revision() {
        let Some(store) = store().await else { return };
        let original = record("a@x.com", 1);
        store.put(&original).await.unwrap();

        let mut next = original.clone();
        next.attempts = 1;
        next.revision = 2;
        assert!(!store.compare_and_swap(&original.key, Some(99), Some(&next)).await.unwrap());
        assert!(store.compare_and_swap(&original.key, Some(1), Some(&next)).await.unwrap());
        assert!(!store.compare_and_swap(&original.key, Some(1), Some(&next)).await.unwrap());
        assert_eq!(store.get(&original.key).await.unwrap(), Some(next.clone()));

        assert!(store.compare_and_swap(&original.key, Some(2), None).await.unwrap());
        assert_eq!(store.get(&original.key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "needs REDIS_URL"]
    async fn insert_if_absent_loses_to_existing_record() {
        let Some(store) = store().await else { return };
        let first = record("a@x.com", 1);
        let second = record("a@x.com", 2);

        assert!(store.compare_and_swap(&first.key, None, Some(&first)).await.unwrap());
        assert!(!store.compare_and_swap(&second.key, None, Some(&second)).await.unwrap());
        assert_eq!(store.get(&first.key).await.unwrap(), Some(first.clone()));

        let all = store.scan_all().await.unwrap();
        assert_eq!(all, vec![first.clone()]);
        store.delete(&first.key).await.unwrap();
    }
}
