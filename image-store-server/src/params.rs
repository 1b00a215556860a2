use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use image_store::{DEFAULT_EXTENSIONS, DEFAULT_MAX_ATTEMPTS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// One file per image under `--data-dir`.
    Local,
    /// Process memory; everything is lost on exit.
    Memory,
}

#[derive(Parser, Debug)]
#[clap(name = "image-store-server", about = "Stores uploaded images under collision-free names")]
pub struct Args {
    #[clap(long, env = "IMAGE_STORE_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub(crate) http_addr: String,
    #[clap(long, env = "IMAGE_STORE_DATA_DIR", default_value = "document_store")]
    pub(crate) data_dir: PathBuf,
    #[clap(long, env = "IMAGE_STORE_BACKEND", value_enum, default_value_t = Backend::Local)]
    pub(crate) backend: Backend,
    /// Largest accepted request body, in bytes.
    #[clap(long, env = "IMAGE_STORE_MAX_UPLOAD_BYTES", default_value_t = 32 << 20)]
    pub(crate) max_upload_bytes: usize,
    #[clap(
        long,
        env = "IMAGE_STORE_MAX_ALLOCATION_ATTEMPTS",
        default_value_t = DEFAULT_MAX_ATTEMPTS
    )]
    pub(crate) max_allocation_attempts: usize,
    #[clap(
        long,
        env = "IMAGE_STORE_ALLOWED_EXTENSIONS",
        value_delimiter = ',',
        default_values = DEFAULT_EXTENSIONS
    )]
    pub(crate) allowed_extensions: Vec<String>,
    /// Byte budget of the download cache; 0 disables it.
    #[clap(long, env = "IMAGE_STORE_CACHE_BYTES", default_value_t = 256 << 20)]
    pub(crate) cache_bytes: u64,
}
