use async_trait::async_trait;

use crate::error::{BlobError, BlobResult};

/// Longest key accepted by any backend; matches common filesystem name limits.
pub const MAX_KEY_LEN: usize = 255;

/// Bytes written ahead of time, waiting to be published under a key.
#[async_trait]
pub trait StagedBlob: Send + Sync {
    /// Publishes the staged bytes under `key` unless the key already exists.
    ///
    /// May be called again with another key after [`BlobError::AlreadyExists`];
    /// the bytes are not copied again.
    async fn claim(&self, key: &str) -> BlobResult<()>;

    /// Drops the staged copy. Keys it was claimed under keep their bytes.
    async fn discard(self: Box<Self>) {}
}

/// Write-once storage of opaque byte blobs in a flat namespace of string keys.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Copies `data` into the store without making it visible under any key.
    async fn stage<'a>(&'a self, data: &'a [u8]) -> BlobResult<Box<dyn StagedBlob + 'a>>;

    /// Stores `data` under `key` unless the key already exists.
    ///
    /// Concurrent calls for the same key have exactly one winner, every other
    /// caller gets [`BlobError::AlreadyExists`]. A key becomes visible to `get`
    /// only once its bytes are completely written.
    async fn put_if_absent(&self, key: &str, data: &[u8]) -> BlobResult<()> {
        ensure_key(key)?;
        let staged = self.stage(data).await?;
        let claimed = staged.claim(key).await;
        staged.discard().await;
        claimed
    }

    /// Retrieves the full contents stored under `key`.
    async fn get(&self, key: &str) -> BlobResult<Vec<u8>>;

    /// Lists every stored key starting with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> BlobResult<Vec<String>>;
}

/// Rejects keys that are not a single, visible, flat file name.
pub fn ensure_key(key: &str) -> BlobResult<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.len() > MAX_KEY_LEN {
        Some("key is too long")
    } else if key.starts_with('.') {
        Some("key must not start with `.`")
    } else if key.contains(['/', '\\']) {
        Some("key must not contain path separators")
    } else if key.chars().any(char::is_control) {
        Some("key must not contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(BlobError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_keys() {
        assert!(ensure_key("example(0).png").is_ok());
        assert!(ensure_key("missing.png").is_ok());
    }

    #[test]
    fn rejects_traversal_and_hidden_keys() {
        for key in ["", "../secret", "a/b.png", "a\\b.png", ".upload-1.part", "..", "a\0.png"] {
            assert!(
                matches!(ensure_key(key), Err(BlobError::InvalidKey { .. })),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overlong_keys() {
        let key = format!("{}(0).png", "a".repeat(MAX_KEY_LEN));
        assert!(ensure_key(&key).is_err());
    }
}
