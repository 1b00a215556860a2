use std::io;
use thiserror::Error;

pub type BlobResult<T> = Result<T, BlobError>;

/// Failures surfaced by a [`crate::store::BlobStore`] backend.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob `{0}` already exists")]
    AlreadyExists(String),

    #[error("blob `{0}` not found")]
    NotFound(String),

    #[error("permission denied for blob `{0}`")]
    PermissionDenied(String),

    #[error("invalid blob key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("storage error for blob `{key}`")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

impl BlobError {
    /// Classifies an I/O error raised while touching `key`.
    pub fn from_io(key: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => BlobError::NotFound(key.to_string()),
            io::ErrorKind::PermissionDenied => BlobError::PermissionDenied(key.to_string()),
            io::ErrorKind::AlreadyExists => BlobError::AlreadyExists(key.to_string()),
            _ => BlobError::Io {
                key: key.to_string(),
                source: err,
            },
        }
    }
}

/// Rejections of a client supplied filename.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("filename `{0}` has no extension")]
    MissingExtension(String),

    #[error("extension `{0}` is not allowed")]
    InvalidExtension(String),

    #[error("base name is empty")]
    EmptyBaseName,

    #[error("base name `{0}` contains characters that cannot be stored")]
    InvalidBaseName(String),
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("no free name for `{base}.{extension}` after {attempts} attempts")]
    Exhausted {
        base: String,
        extension: String,
        attempts: usize,
    },

    #[error(transparent)]
    Storage(#[from] BlobError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_typed_variants() {
        let not_found = BlobError::from_io("a(0).png", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(not_found, BlobError::NotFound(key) if key == "a(0).png"));

        let denied =
            BlobError::from_io("a(0).png", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, BlobError::PermissionDenied(_)));

        let exists = BlobError::from_io("a(0).png", io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(matches!(exists, BlobError::AlreadyExists(_)));

        let other =
            BlobError::from_io("a(0).png", io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(matches!(other, BlobError::Io { .. }));
    }
}
