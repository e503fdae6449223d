use crate::domain_model::{OtpKey, OtpRecord};
use crate::domain_port::*;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Process-local store. Swaps hold the shard write lock through the entry,
/// so a single key is never read-modified-written concurrently.
#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    records: DashMap<OtpKey, OtpRecord>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl OtpStore for MemoryOtpStore {
    async fn get(&self, key: &OtpKey) -> Result<Option<OtpRecord>, OtpStoreError> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, record: &OtpRecord) -> Result<(), OtpStoreError> {
        self.records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &OtpKey) -> Result<(), OtpStoreError> {
        self.records.remove(key);
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<OtpRecord>, OtpStoreError> {
        Ok(self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn compare_and_swap(
        &self,
        key: &OtpKey,
        expected_revision: Option<u64>,
        next: Option<&OtpRecord>,
    ) -> Result<bool, OtpStoreError> {
        match self.records.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                if expected_revision.is_some() {
                    return Ok(false);
                }
                if let Some(next) = next {
                    vacant.insert(next.clone());
                }
                Ok(true)
            }
            Entry::Occupied(mut occupied) => {
                if Some(occupied.get().revision) != expected_revision {
                    return Ok(false);
                }
                match next {
                    Some(next) => {
                        occupied.insert(next.clone());
                    }
                    None => {
                        occupied.remove();
                    }
                }
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::OtpPurpose;
    use chrono::{Duration, Utc};

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
    async fn put_overwrites_existing_record() {
        let store = MemoryOtpStore::new();
        let first = record("a@x.com", 1);
        let second = record("a@x.com", 2);
        store.put(&first).await.unwrap();
        store.put(&second).await.unwrap();

        let stored = store.get(&first.key).await.unwrap().unwrap();
        assert_eq!(stored.revision, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn swap_requires_matching_revision() {
        let store = MemoryOtpStore::new();
        let original = record("a@x.com", 1);
        store.put(&original).await.unwrap();

        let mut next = original.clone();
        next.attempts = 1;
        next.revision = 2;

        assert!(!store.compare_and_swap(&original.key, Some(99), Some(&next)).await.unwrap());
        assert!(store.compare_and_swap(&original.key, Some(1), Some(&next)).await.unwrap());
        assert!(!store.compare_and_swap(&original.key, Some(1), Some(&next)).await.unwrap());

        let stored = store.get(&original.key).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn guarded_delete_spares_reissued_record() {
        let store = MemoryOtpStore::new();
        let stale = record("a@x.com", 1);
        store.put(&stale).await.unwrap();
        store.put(&record("a@x.com", 5)).await.unwrap();

        assert!(!store.compare_and_swap(&stale.key, Some(1), None).await.unwrap());
        assert!(store.get(&stale.key).await.unwrap().is_some());

        assert!(store.compare_and_swap(&stale.key, Some(5), None).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn swap_on_missing_key_fails() {
        let store = MemoryOtpStore::new();
        let r = record("a@x.com", 1);
        assert!(!store.compare_and_swap(&r.key, Some(1), Some(&r)).await.unwrap());
        assert!(!store.compare_and_swap(&r.key, Some(1), None).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn insert_if_absent_loses_to_existing_record() {
        let store = MemoryOtpStore::new();
        let first = record("a@x.com", 1);
        let second = record("a@x.com", 2);

        assert!(store.compare_and_swap(&first.key, None, Some(&first)).await.unwrap());
        assert!(!store.compare_and_swap(&second.key, None, Some(&second)).await.unwrap());

        let stored = store.get(&first.key).await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn scan_returns_every_record() {
        let store = MemoryOtpStore::new();
        store.put(&record("a@x.com", 1)).await.unwrap();
        store.put(&record("b@x.com", 1)).await.unwrap();
        store.delete(&OtpKey::new("a@x.com", OtpPurpose::Registration)).await.unwrap();

        let all = store.scan_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key.identifier, "b@x.com");
    }
}
