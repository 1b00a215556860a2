use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::fs;
use tokio::runtime::Handle;
use tokio::task;

use crate::error::{BlobError, BlobResult};
use crate::store::{ensure_key, BlobStore, StagedBlob};

/// Stores each blob as one file in a flat directory; the file name is the key.
#[derive(Clone, Debug)]
pub struct LocalFileBlobStore {
    base_path: PathBuf,
}

impl LocalFileBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Creates the backing directory if needed and returns a store rooted there.
    pub async fn open(base_path: impl Into<PathBuf>) -> BlobResult<Self> {
        let store = Self::new(base_path);
        fs::create_dir_all(&store.base_path).await.map_err(|err| BlobError::Io {
            key: store.base_path.display().to_string(),
            source: err,
        })?;
        Ok(store)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// A broken directory is a storage failure, never a missing key.
    fn dir_error(&self, err: io::Error) -> BlobError {
        let dir = self.base_path.display().to_string();
        match err.kind() {
            io::ErrorKind::PermissionDenied => BlobError::PermissionDenied(dir),
            _ => BlobError::Io { key: dir, source: err },
        }
    }
}

/// A fully written and fsynced upload in a hidden file next to the published keys.
struct LocalStaged<'a> {
    store: &'a LocalFileBlobStore,
    path: Option<TempPath>,
    len: usize,
}

#[async_trait]
impl StagedBlob for LocalStaged<'_> {
    async fn claim(&self, key: &str) -> BlobResult<()> {
        ensure_key(key)?;
        let Some(staged) = self.path.as_deref() else {
            return Err(BlobError::NotFound(key.to_string()));
        };

        // A hard link refuses to replace an existing name, which makes the claim atomic.
        fs::hard_link(staged, self.store.key_path(key))
            .await
            .map_err(|err| BlobError::from_io(key, err))?;
        tracing::debug!("published blob {} ({} bytes)", key, self.len);
        Ok(())
    }

    async fn discard(self: Box<Self>) {
        let mut this = self;
        let Some(path) = this.path.take() else {
            return;
        };
        let shown = path.display().to_string();
        match task::spawn_blocking(move || path.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("failed to remove staged file {}: {}", shown, err),
            Err(err) => tracing::warn!("failed to remove staged file {}: {}", shown, err),
        }
    }
}

impl Drop for LocalStaged<'_> {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        // Unlinking blocks, so it runs on the blocking pool whenever a runtime is around.
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || drop(path));
            }
            Err(_) => drop(path),
        }
    }
}

/// Writes `data` to a fresh hidden file in `dir`. The file is deleted again if
/// any step fails or the returned path is dropped.
fn write_staged(dir: &Path, data: &[u8]) -> io::Result<TempPath> {
    // Names starting with `.` never pass `ensure_key`, so staged files stay invisible.
    let mut file = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(".part")
        .tempfile_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    Ok(file.into_temp_path())
}

#[async_trait]
impl BlobStore for LocalFileBlobStore {
    async fn stage<'a>(&'a self, data: &'a [u8]) -> BlobResult<Box<dyn StagedBlob + 'a>> {
        let dir = self.base_path.clone();
        let bytes = data.to_vec();
        // The blocking job owns the temp file until it hands it back. If this
        // future is dropped first, the file is removed with the job's output.
        let path = task::spawn_blocking(move || write_staged(&dir, &bytes))
            .await
            .map_err(|err| self.dir_error(io::Error::new(io::ErrorKind::Other, err)))?
            .map_err(|err| self.dir_error(err))?;

        Ok(Box::new(LocalStaged {
            store: self,
            path: Some(path),
            len: data.len(),
        }))
    }

    async fn get(&self, key: &str) -> BlobResult<Vec<u8>> {
        ensure_key(key)?;
        fs::read(self.key_path(key))
            .await
            .map_err(|err| BlobError::from_io(key, err))
    }

    async fn list_keys(&self, prefix: &str) -> BlobResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|err| self.dir_error(err))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|err| self.dir_error(err))? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(prefix) {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|err| self.dir_error(err))?;
            if file_type.is_file() {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
