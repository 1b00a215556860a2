use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{BlobError, BlobResult};
use crate::store::{ensure_key, BlobStore, StagedBlob};

/// Process-local store. Contents vanish with the process; used by tests and
/// the `memory` backend of the server.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// Borrows the caller's bytes; they are copied only by the claim that wins.
struct MemoryStaged<'a> {
    blobs: &'a DashMap<String, Vec<u8>>,
    data: &'a [u8],
}

#[async_trait]
impl StagedBlob for MemoryStaged<'_> {
    async fn claim(&self, key: &str) -> BlobResult<()> {
        ensure_key(key)?;
        // The entry holds the shard lock, so check and insert happen as one step.
        match self.blobs.entry(key.to_string()) {
            Entry::Occupied(_) => Err(BlobError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(self.data.to_vec());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn stage<'a>(&'a self, data: &'a [u8]) -> BlobResult<Box<dyn StagedBlob + 'a>> {
        Ok(Box::new(MemoryStaged {
            blobs: &self.blobs,
            data,
        }))
    }

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        ensure_key(key)?;
        self.blobs
            .get(key)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn list_keys(&self, prefix: &str) -> BlobResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .blobs
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn second_put_keeps_original_bytes() {
        let store = InMemoryBlobStore::new();
        store.put_if_absent("x(0).png", b"first").await.unwrap();

        let err = store.put_if_absent("x(0).png", b"second").await.unwrap_err();
        assert!(matches!(err, BlobError::AlreadyExists(_)));
        assert_eq!(store.get("x(0).png").await.unwrap(), b"first");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = InMemoryBlobStore::new();
        assert!(matches!(store.get("missing.png").await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_puts_on_one_key_have_a_single_winner() {
        let store = Arc::new(InMemoryBlobStore::new());
        let handles: Vec<_> = (0..16u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.put_if_absent("race(0).png", &[i]).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(BlobError::AlreadyExists(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.get("race(0).png").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_staged_blob_can_try_several_keys() {
        let store = InMemoryBlobStore::new();
        store.put_if_absent("x(0).png", b"old").await.unwrap();

        let staged = store.stage(b"new").await.unwrap();
        assert!(matches!(staged.claim("x(0).png").await, Err(BlobError::AlreadyExists(_))));
        staged.claim("x(1).png").await.unwrap();
        drop(staged);

        assert_eq!(store.get("x(0).png").await.unwrap(), b"old");
        assert_eq!(store.get("x(1).png").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix() {
        let store = InMemoryBlobStore::new();
        for key in ["b(0).png", "a(1).png", "a(0).png", "ab(0).png"] {
            store.put_if_absent(key, b"").await.unwrap();
        }
        assert_eq!(
            store.list_keys("a(").await.unwrap(),
            vec!["a(0).png".to_string(), "a(1).png".to_string()]
        );
    }
}
