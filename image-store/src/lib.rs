//! Write-once image storage with collision-free naming.
//!
//! An upload named `example.png` is stored as `example(0).png`, the next one as
//! `example(1).png`, and so on. [`NameAllocator`] stages the bytes once, picks the
//! lowest free number and claims it through [`StagedBlob::claim`], so concurrent
//! uploads of the same name never share a key.

pub mod allocator;
pub mod error;
pub mod local_store;
pub mod memory_store;
pub mod name;
pub mod store;

pub use allocator::{NameAllocator, DEFAULT_MAX_ATTEMPTS};
pub use error::{AllocationError, BlobError, BlobResult, NameError};
pub use local_store::LocalFileBlobStore;
pub use memory_store::InMemoryBlobStore;
pub use name::{ExtensionAllowList, ImageKey, UploadName, DEFAULT_EXTENSIONS};
pub use store::{BlobStore, StagedBlob};
