use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::stream;
use image_store::{BlobStore, ExtensionAllowList, NameAllocator, UploadName};
use quick_cache::sync::{Cache, DefaultLifecycle};
use quick_cache::{DefaultHashBuilder, OptionsBuilder, Weighter};
use serde::Deserialize;
use validator::Validate;

use crate::errors::ImageStoreErr;

pub const APP_TYPE_OCTET_STREAM: &str = "application/octet-stream";
pub const APP_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Multipart field carrying the uploaded file.
const IMAGE_FIELD: &str = "image";

/// Typical image size, used only to size the cache's bookkeeping.
const ESTIMATED_IMAGE_BYTES: u64 = 64 << 10;

/// Charges each cached image by its size.
#[derive(Clone)]
pub struct ImageWeighter;

impl Weighter<String, web::Bytes> for ImageWeighter {
    fn weight(&self, key: &String, image: &web::Bytes) -> u64 {
        (key.len() + image.len()) as u64
    }
}

type ImageCache = Cache<String, web::Bytes, ImageWeighter>;

pub struct AppState {
    pub(crate) allocator: NameAllocator,
    pub(crate) allowed_extensions: ExtensionAllowList,
    // Keys are never rebound, so cached entries never go stale.
    pub(crate) image_cache: Option<ImageCache>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BlobStore>,
        allowed_extensions: ExtensionAllowList,
        max_allocation_attempts: usize,
        cache_bytes: u64,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            allocator: NameAllocator::new(store).with_max_attempts(max_allocation_attempts),
            allowed_extensions,
            image_cache: image_cache(cache_bytes, max_upload_bytes),
        }
    }
}

/// Builds the download cache, or none for a zero budget.
fn image_cache(cache_bytes: u64, max_upload_bytes: usize) -> Option<ImageCache> {
    if cache_bytes == 0 {
        tracing::info!("download cache disabled");
        return None;
    }
    let options = OptionsBuilder::new()
        .estimated_items_capacity((cache_bytes / ESTIMATED_IMAGE_BYTES).max(1) as usize)
        .weight_capacity(cache_bytes)
        .shards(cache_shards(cache_bytes, max_upload_bytes))
        .build();
    match options {
        Ok(options) => Some(Cache::with_options(
            options,
            ImageWeighter,
            DefaultHashBuilder::default(),
            DefaultLifecycle::default(),
        )),
        Err(err) => {
            tracing::warn!("download cache disabled: {}", err);
            None
        }
    }
}

/// Shard count that leaves every shard room for the largest accepted upload.
///
/// A shard only admits items that fit its own slice of the budget, so each
/// slice gets at least twice the upload limit.
fn cache_shards(cache_bytes: u64, max_upload_bytes: usize) -> usize {
    let per_shard = (max_upload_bytes as u64).saturating_mul(2).max(1);
    let fitting = (cache_bytes / per_shard).clamp(1, 64);
    // Rounded down to a power of two, since the cache rounds up.
    1 << fitting.ilog2()
}

#[derive(Deserialize, Validate)]
pub struct GetImageQuery {
    #[validate(length(min = 1))]
    image: String,
}

/// Registers the single `/` endpoint. Bodies over `max_upload_bytes` get 413.
pub fn configure(max_upload_bytes: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.service(
            web::resource("/")
                .app_data(web::PayloadConfig::new(max_upload_bytes))
                .route(web::get().to(get_image))
                .route(web::post().to(add_image))
                .default_service(web::route().to(|| async {
                    HttpResponse::MethodNotAllowed().body("Invalid request method.")
                })),
        );
    }
}

/// Pulls the `image` file field out of a buffered multipart body.
async fn read_image_field(
    req: &HttpRequest,
    body: web::Bytes,
) -> Result<(String, web::Bytes), ImageStoreErr> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let boundary = multer::parse_boundary(content_type)?;

    let body_stream = stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(body_stream, boundary);

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            return Err(ImageStoreErr::MissingImageField);
        };
        let content = field.bytes().await?;
        return Ok((filename, content));
    }
    Err(ImageStoreErr::MissingImageField)
}

/// `POST /`: stores the uploaded image and answers with its key.
pub async fn add_image(
    req: HttpRequest,
    body: web::Bytes,
    shared_state: web::Data<AppState>,
) -> Result<HttpResponse, ImageStoreErr> {
    tracing::info!("started add_image");

    // The body is fully received before anything touches the store.
    let (filename, content) = read_image_field(&req, body).await?;
    tracing::info!("extracted file, filename: {}", filename);

    let name = UploadName::parse(&filename, &shared_state.allowed_extensions)?;
    let key = shared_state.allocator.allocate(&name, &content).await?;
    tracing::info!("created new image, filename: {}", key);

    Ok(HttpResponse::Ok()
        .content_type(APP_TYPE_TEXT)
        .body(key.into_string()))
}

/// `GET /?image=<key>`: returns the stored bytes.
pub async fn get_image(
    query: web::Query<GetImageQuery>,
    shared_state: web::Data<AppState>,
) -> Result<HttpResponse, ImageStoreErr> {
    if let Err(validation_err) = query.validate() {
        tracing::info!("could not extract image name from the URL parameter");
        return Ok(HttpResponse::BadRequest().json(validation_err));
    }
    let key = query.into_inner().image;
    tracing::info!("extracted image name from URL parameter: {}", key);

    let cache = shared_state.image_cache.as_ref();
    if let Some(image) = cache.and_then(|cache| cache.get(&key)) {
        tracing::debug!("cache hit for {}", key);
        return Ok(image_response(image));
    }

    let image = web::Bytes::from(shared_state.allocator.store().get(&key).await?);
    if let Some(cache) = cache {
        cache.insert(key.clone(), image.clone());
    }
    tracing::info!("retrieved {} from the store", key);
    Ok(image_response(image))
}

fn image_response(image: web::Bytes) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(APP_TYPE_OCTET_STREAM)
        .body(image)
}
