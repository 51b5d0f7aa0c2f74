//! HTTP request handlers for the Snap Vault image API.
//!
//! Handlers parse the request, call the [`MediaService`] with the request's
//! [`RequestContext`], and hand the outcome to the response pipeline. They
//! never build response bodies themselves.
//!
//! # Endpoints
//!
//! - `GET /v1/healthcheck` - Health check
//! - `GET /v1/public/images` - Published images across galleries
//! - `GET /v1/public/galleries/{id}/images` - Images of a published gallery
//! - `GET /v1/public/images/{id}` - One published image
//! - `GET /v1/public/images/{id}/download` - Payload of a published image
//! - `GET /v1/galleries/{id}/images` - Images of a gallery owned by the caller
//! - `POST /v1/galleries/{id}/images` - Upload an image
//! - `GET /v1/images/{id}` - One image owned by the caller
//! - `GET /v1/images/{id}/download` - Payload of an image owned by the caller
//! - `PUT /v1/images/{id}` - Change title and caption
//! - `DELETE /v1/images/{id}` - Delete an image

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
    Json,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;

use crate::context::RequestContext;
use crate::media::MediaService;
use crate::store::{Filter, GalleryStore, Image, ImageStore, Metadata, UploadReader};

use super::response::{send_headers, send_json, send_json_error, stream_bytes, ErrorResponse};

/// Content type recorded when an upload does not declare one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the media service.
pub struct AppState<I: ImageStore, G: GalleryStore> {
    pub media: Arc<MediaService<I, G>>,
}

impl<I: ImageStore, G: GalleryStore> AppState<I, G> {
    pub fn new(media: MediaService<I, G>) -> Self {
        Self {
            media: Arc::new(media),
        }
    }
}

impl<I: ImageStore, G: GalleryStore> Clone for AppState<I, G> {
    fn clone(&self) -> Self {
        Self {
            media: Arc::clone(&self.media),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for uploads.
#[derive(Debug, Default, Deserialize)]
pub struct InsertImageParams {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub caption: String,
}

/// JSON body for image updates. Other fields are ignored.
#[derive(Debug, Deserialize)]
pub struct UpdateImageRequest {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub caption: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,

    /// Service version
    pub version: &'static str,
}

/// `{"image": ...}`
#[derive(Debug, Serialize)]
pub struct ImageEnvelope<'a> {
    pub image: &'a Image,
}

/// `{"images": [...], "metadata": {...}}`
#[derive(Debug, Serialize)]
pub struct ImagesEnvelope<'a> {
    pub images: &'a [Image],
    pub metadata: &'a Metadata,
}

// =============================================================================
// Extraction Helpers
// =============================================================================

/// Image and gallery ids are positive; anything else is an unknown resource.
fn read_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ErrorResponse> {
    match path {
        Ok(Path(id)) if id > 0 => Ok(id),
        _ => Err(ErrorResponse::not_found()),
    }
}

fn read_filter(query: Result<Query<Filter>, QueryRejection>) -> Result<Filter, ErrorResponse> {
    query
        .map(|Query(filter)| filter)
        .map_err(|rejection| ErrorResponse::bad_request(rejection.body_text()))
}

fn images_response(ctx: &RequestContext, images: &[Image], metadata: &Metadata) -> Response {
    send_json(
        ctx,
        StatusCode::OK,
        &ImagesEnvelope { images, metadata },
        HeaderMap::new(),
    )
}

fn image_response(ctx: &RequestContext, status: StatusCode, image: &Image, headers: HeaderMap) -> Response {
    send_json(ctx, status, &ImageEnvelope { image }, headers)
}

/// Headers for a payload download.
fn download_headers(image: &Image) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(image.size));

    let disposition = format!("attachment; filename=\"{}\"", attachment_name(image));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers
}

/// Title reduced to characters safe inside a quoted header parameter.
fn attachment_name(image: &Image) -> String {
    let name: String = image
        .title
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.trim().is_empty() {
        format!("image-{}", image.id)
    } else {
        name
    }
}

fn upload_reader(body: Body) -> UploadReader {
    let stream = body.into_data_stream().map_err(io::Error::other);
    Box::new(StreamReader::new(stream))
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// `GET /v1/healthcheck`
pub async fn health_handler(ctx: RequestContext) -> Response {
    send_json(
        &ctx,
        StatusCode::OK,
        &HealthResponse {
            status: "available",
            version: env!("CARGO_PKG_VERSION"),
        },
        HeaderMap::new(),
    )
}

/// List published images.
///
/// `GET /v1/public/images?page=&page_size=&sort=`
pub async fn list_public_images_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    query: Result<Query<Filter>, QueryRejection>,
) -> Response {
    let filter = match read_filter(query) {
        Ok(filter) => filter,
        Err(resp) => return send_json_error(&ctx, resp),
    };

    match state.media.list_all_public(&ctx, &filter).await {
        Ok((images, metadata)) => images_response(&ctx, &images, &metadata),
        Err(err) => send_json_error(&ctx, err.into()),
    }
}

async fn list_gallery<I: ImageStore, G: GalleryStore>(
    state: AppState<I, G>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<Filter>, QueryRejection>,
    public: bool,
) -> Response {
    let gallery_id = match read_id(path) {
        Ok(id) => id,
        Err(resp) => return send_json_error(&ctx, resp),
    };
    let filter = match read_filter(query) {
        Ok(filter) => filter,
        Err(resp) => return send_json_error(&ctx, resp),
    };

    match state
        .media
        .list_for_gallery(&ctx, gallery_id, &filter, public)
        .await
    {
        Ok((images, metadata)) => images_response(&ctx, &images, &metadata),
        Err(err) => send_json_error(&ctx, err.into()),
    }
}

/// List the images of a published gallery.
///
/// `GET /v1/public/galleries/{id}/images`
pub async fn list_public_gallery_images_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<Filter>, QueryRejection>,
) -> Response {
    list_gallery(state, ctx, path, query, true).await
}

/// List the images of a gallery owned by the caller.
///
/// `GET /v1/galleries/{id}/images`
pub async fn list_gallery_images_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<Filter>, QueryRejection>,
) -> Response {
    list_gallery(state, ctx, path, query, false).await
}

async fn show_image<I: ImageStore, G: GalleryStore>(
    state: AppState<I, G>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    public: bool,
) -> Response {
    let id = match read_id(path) {
        Ok(id) => id,
        Err(resp) => return send_json_error(&ctx, resp),
    };

    match state.media.get(&ctx, id, public).await {
        Ok(image) => image_response(&ctx, StatusCode::OK, &image, HeaderMap::new()),
        Err(err) => send_json_error(&ctx, err.into()),
    }
}

/// `GET /v1/public/images/{id}`
pub async fn get_public_image_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    show_image(state, ctx, path, true).await
}

/// `GET /v1/images/{id}`
pub async fn get_image_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    show_image(state, ctx, path, false).await
}

async fn download_image<I: ImageStore, G: GalleryStore>(
    state: AppState<I, G>,
    ctx: RequestContext,
    method: Method,
    path: Result<Path<i64>, PathRejection>,
    public: bool,
) -> Response {
    let id = match read_id(path) {
        Ok(id) => id,
        Err(resp) => return send_json_error(&ctx, resp),
    };

    match state.media.download(&ctx, id, public).await {
        Ok((image, reader)) if method == Method::HEAD => {
            send_headers(&ctx, reader, download_headers(&image))
        }
        Ok((image, reader)) => stream_bytes(&ctx, reader, download_headers(&image)),
        Err(err) => send_json_error(&ctx, err.into()),
    }
}

/// Stream the payload of a published image.
///
/// `GET /v1/public/images/{id}/download`
///
/// # Headers
///
/// - `Content-Type`: the content type recorded at upload
/// - `Content-Length`: payload size
/// - `Content-Disposition: attachment; filename="{title}"`
///
/// `HEAD` answers with the same headers and releases the payload unread.
pub async fn download_public_image_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    method: Method,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    download_image(state, ctx, method, path, true).await
}

/// Stream the payload of an image owned by the caller.
///
/// `GET /v1/images/{id}/download`
pub async fn download_image_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    method: Method,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    download_image(state, ctx, method, path, false).await
}

/// Upload an image into a gallery owned by the caller.
///
/// `POST /v1/galleries/{id}/images?title=&caption=`
///
/// The request body is the raw payload; `Content-Type` is recorded as the
/// image's content type.
///
/// # Response
///
/// - `201 Created`: `{"image": ...}` with a `Location` header
/// - `403 Forbidden`: gallery belongs to someone else
/// - `404 Not Found`: gallery does not exist
/// - `409 Conflict`: gallery vanished during the upload
/// - `422 Unprocessable Entity`: empty body
pub async fn insert_image_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<InsertImageParams>, QueryRejection>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let gallery_id = match read_id(path) {
        Ok(id) => id,
        Err(resp) => return send_json_error(&ctx, resp),
    };
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            return send_json_error(&ctx, ErrorResponse::bad_request(rejection.body_text()))
        }
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let image = Image {
        gallery_id,
        title: params.title,
        caption: params.caption,
        content_type,
        ..Image::default()
    };

    match state.media.insert(&ctx, upload_reader(body), image).await {
        Ok(image) => {
            let mut headers = HeaderMap::new();
            if let Ok(location) = HeaderValue::from_str(&format!("/v1/images/{}", image.id)) {
                headers.insert(header::LOCATION, location);
            }
            image_response(&ctx, StatusCode::CREATED, &image, headers)
        }
        Err(err) => send_json_error(&ctx, err.into()),
    }
}

/// Change the title and caption of an image.
///
/// `PUT /v1/images/{id}` with `{"title": "...", "caption": "..."}`
pub async fn update_image_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateImageRequest>, JsonRejection>,
) -> Response {
    let id = match read_id(path) {
        Ok(id) => id,
        Err(resp) => return send_json_error(&ctx, resp),
    };
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return send_json_error(&ctx, ErrorResponse::bad_request(rejection.body_text()))
        }
    };

    let changes = Image {
        id,
        title: input.title,
        caption: input.caption,
        ..Image::default()
    };
    match state.media.update(&ctx, changes).await {
        Ok(image) => image_response(&ctx, StatusCode::OK, &image, HeaderMap::new()),
        Err(err) => send_json_error(&ctx, err.into()),
    }
}

/// Delete an image, returning the record as it was.
///
/// `DELETE /v1/images/{id}`
pub async fn delete_image_handler<I: ImageStore, G: GalleryStore>(
    State(state): State<AppState<I, G>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Response {
    let id = match read_id(path) {
        Ok(id) => id,
        Err(resp) => return send_json_error(&ctx, resp),
    };

    match state.media.delete(&ctx, id).await {
        Ok(image) => image_response(&ctx, StatusCode::OK, &image, HeaderMap::new()),
        Err(err) => send_json_error(&ctx, err.into()),
    }
}

/// Fallback for unknown routes.
pub async fn not_found_handler(ctx: RequestContext) -> Response {
    send_json_error(&ctx, ErrorResponse::not_found())
}

/// Fallback for known routes called with the wrong method.
pub async fn method_not_allowed_handler(ctx: RequestContext) -> Response {
    send_json_error(
        &ctx,
        ErrorResponse::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "the method is not supported for this resource",
        ),
    )
}
