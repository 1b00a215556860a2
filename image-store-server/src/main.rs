mod errors;
mod params;
mod services;

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use image_store::{BlobStore, ExtensionAllowList, InMemoryBlobStore, LocalFileBlobStore};
use tracing_subscriber::EnvFilter;

use crate::params::{Args, Backend};
use crate::services::image_service::{self, AppState};

async fn open_store(args: &Args) -> std::io::Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match args.backend {
        Backend::Local => {
            let store = LocalFileBlobStore::open(&args.data_dir)
                .await
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
            tracing::info!("storing images under {}", store.base_path().display());
            Arc::new(store)
        }
        Backend::Memory => {
            tracing::warn!("using the in-memory backend, images will not survive a restart");
            Arc::new(InMemoryBlobStore::new())
        }
    };
    Ok(store)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = open_store(&args).await?;
    let allowed_extensions = ExtensionAllowList::new(args.allowed_extensions.iter().cloned());
    tracing::info!(
        "accepting extensions: {}",
        allowed_extensions.iter().collect::<Vec<_>>().join(", ")
    );

    let state = web::Data::new(AppState::new(
        store,
        allowed_extensions,
        args.max_allocation_attempts,
        args.cache_bytes,
        args.max_upload_bytes,
    ));
    let max_upload_bytes = args.max_upload_bytes;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(image_service::configure(max_upload_bytes))
    })
    .bind(args.http_addr.clone())?;

    tracing::info!("image store listening on {}", args.http_addr);
    server.run().await
}
