use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{AllocationError, BlobError, BlobResult};
use crate::name::{ImageKey, UploadName};
use crate::store::{BlobStore, StagedBlob};

/// Lost races tolerated for one upload before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

/// Turns an [`UploadName`] into the lowest free `base(N).extension` key and
/// stores the upload under it.
///
/// Choosing a number and claiming it are one step. The upload is staged once,
/// every candidate is then claimed with [`StagedBlob::claim`], and a lost race
/// moves on to the next free number instead of overwriting the winner.
pub struct NameAllocator {
    store: Arc<dyn BlobStore>,
    max_attempts: usize,
}

impl NameAllocator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Disambiguators already taken by keys with exactly this base and extension.
    pub async fn used_disambiguators(&self, name: &UploadName) -> BlobResult<BTreeSet<u64>> {
        let prefix = format!("{}(", name.base());
        let keys = self.store.list_keys(&prefix).await?;
        Ok(keys
            .iter()
            .filter_map(|key| ImageKey::parse(key))
            .filter(|key| key.matches(name))
            .map(|key| key.index())
            .collect())
    }

    pub async fn allocate(
        &self,
        name: &UploadName,
        data: &[u8],
    ) -> Result<ImageKey, AllocationError> {
        let used = self.used_disambiguators(name).await?;
        tracing::info!(
            "found {} images named {}.{}",
            used.len(),
            name.base(),
            name.extension()
        );

        let staged = self.store.stage(data).await?;
        let claimed = self.claim_lowest_free(&*staged, name, used).await;
        staged.discard().await;

        let key = claimed?;
        tracing::info!("stored {} ({} bytes)", key, data.len());
        Ok(key)
    }

    async fn claim_lowest_free(
        &self,
        staged: &dyn StagedBlob,
        name: &UploadName,
        mut used: BTreeSet<u64>,
    ) -> Result<ImageKey, AllocationError> {
        let mut candidate = 0;
        for attempt in 1..=self.max_attempts {
            candidate = lowest_free(&used, candidate);
            let key = ImageKey::new(name, candidate);
            match staged.claim(key.as_str()).await {
                Ok(()) => return Ok(key),
                Err(BlobError::AlreadyExists(_)) => {
                    tracing::debug!("{} was claimed concurrently (attempt {})", key, attempt);
                    used.insert(candidate);
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::warn!(
            "giving up on {}.{} after {} attempts",
            name.base(),
            name.extension(),
            self.max_attempts
        );
        Err(AllocationError::Exhausted {
            base: name.base().to_string(),
            extension: name.extension().to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// Smallest value `>= from` missing from `used`.
fn lowest_free(used: &BTreeSet<u64>, from: u64) -> u64 {
    let mut candidate = from;
    for &taken in used.range(from..) {
        if taken != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}
