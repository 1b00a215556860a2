use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use image_store::{AllocationError, BlobError, NameError};
use thiserror::Error;


#[derive(Debug, Error)]
pub enum ImageStoreErr {
    #[error("Invalid image name: {0}")]
    InvalidName(#[from] NameError),

    #[error("Failed to parse multipart upload: {0}")]
    Multipart(#[from] multer::Error),

    #[error("Request has no `image` file field")]
    MissingImageField,

    #[error("Could not allocate a filename: {0}")]
    Allocation(#[from] AllocationError),

    #[error("{0}")]
    Blob(#[from] BlobError),
}

fn blob_status(err: &BlobError) -> StatusCode {
    match err {
        BlobError::NotFound(_) => StatusCode::NOT_FOUND,
        BlobError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        BlobError::InvalidKey { .. } => StatusCode::BAD_REQUEST,
        BlobError::AlreadyExists(_) => StatusCode::CONFLICT,
        BlobError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ResponseError for ImageStoreErr {
    fn status_code(&self) -> StatusCode {
        match self {
            ImageStoreErr::InvalidName(_) => StatusCode::BAD_REQUEST,
            ImageStoreErr::Multipart(_) => StatusCode::BAD_REQUEST,
            ImageStoreErr::MissingImageField => StatusCode::BAD_REQUEST,
            ImageStoreErr::Allocation(AllocationError::Exhausted { .. }) => StatusCode::CONFLICT,
            ImageStoreErr::Allocation(AllocationError::Storage(err)) => blob_status(err),
            ImageStoreErr::Blob(err) => blob_status(err),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            // Storage internals stay in the log, not in the response.
            tracing::error!("request failed: {:?}", self);
            return HttpResponse::build(status).body("Internal storage error");
        }
        tracing::info!("request rejected ({}): {}", status, self);
        HttpResponse::build(status).body(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn maps_errors_to_statuses() {
        let cases = [
            (ImageStoreErr::InvalidName(NameError::EmptyBaseName), StatusCode::BAD_REQUEST),
            (ImageStoreErr::MissingImageField, StatusCode::BAD_REQUEST),
            (ImageStoreErr::Blob(BlobError::NotFound("a.png".into())), StatusCode::NOT_FOUND),
            (
                ImageStoreErr::Blob(BlobError::PermissionDenied("a.png".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                ImageStoreErr::Allocation(AllocationError::Exhausted {
                    base: "a".into(),
                    extension: "png".into(),
                    attempts: 3,
                }),
                StatusCode::CONFLICT,
            ),
            (
                ImageStoreErr::Allocation(AllocationError::Storage(BlobError::Io {
                    key: "a(0).png".into(),
                    source: io::Error::new(io::ErrorKind::Other, "disk full"),
                })),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.error_response().status(), status);
        }
    }
}
