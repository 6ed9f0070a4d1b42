//! HTTP handlers for bucket and object operations.
//! Object bodies are streamed from disk; uploads arrive as multipart forms
//! with one or more `object` fields. Storage concerns are delegated to
//! `StorageService`.

use crate::{
    AppState,
    errors::AppError,
    handlers::auth::AuthenticatedClient,
    models::{meta::ObjectMeta, object::Conditional},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::io;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Multipart field name carrying object content.
const OBJECT_FIELD: &str = "object";

struct UploadedFile {
    mime_type: Option<String>,
    data: Bytes,
}

/// `GET /` — list bucket names.
pub async fn list_buckets(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
) -> Result<Json<Vec<String>>, AppError> {
    debug!(client = %client, "list buckets");
    Ok(Json(state.storage.list_buckets().await?))
}

/// `GET /{bucket}` — list object ids in a bucket.
pub async fn list_objects(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    Path(bucket): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    debug!(client = %client, bucket = %bucket, "list objects");
    Ok(Json(state.storage.list_objects(&bucket).await?))
}

/// `POST /{bucket}` — store every `object` field under a generated id.
pub async fn upload_objects(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    Path(bucket): Path<String>,
    multipart: Multipart,
) -> Result<Json<Vec<String>>, AppError> {
    let files = read_object_fields(multipart).await?;
    if files.is_empty() {
        return Err(AppError::bad_request("Missing object field."));
    }
    debug!(client = %client, bucket = %bucket, count = files.len(), "object write requested");

    let mut ids = Vec::with_capacity(files.len());
    for file in files {
        let id = state
            .storage
            .write_object(&bucket, None, file.mime_type.as_deref(), file.data, &client)
            .await?;
        ids.push(id);
    }
    Ok(Json(ids))
}

/// `POST /{bucket}/{id}` — replace the content of an existing object.
pub async fn update_object(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    Path((bucket, id)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Json<String>, AppError> {
    let file = read_object_fields(multipart)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::bad_request("Missing object field."))?;
    debug!(client = %client, bucket = %bucket, object_id = %id, "object update requested");

    state
        .storage
        .replace_object(&bucket, &id, file.mime_type.as_deref(), file.data, &client)
        .await?;
    Ok(Json(id))
}

/// `GET /{bucket}/{id}` — stream object content, honoring `If-None-Match`.
pub async fn get_object(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    Path((bucket, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    debug!(client = %client, bucket = %bucket, object_id = %id, "object requested");

    let validator = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(unquote_etag);

    let file = match state
        .storage
        .get_object_file(&bucket, &id, validator)
        .await?
    {
        Conditional::NotModified { etag } => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            set_etag(response.headers_mut(), &etag);
            return Ok(response);
        }
        Conditional::Modified(file) => file,
    };

    let handle = File::open(&file.path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            AppError::not_found(format!("object `{}` not found in bucket `{}`", id, bucket))
        } else {
            AppError::internal(err.to_string())
        }
    })?;
    let body = Body::from_stream(ReaderStream::new(handle));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.meta.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.size_bytes));
    set_etag(headers, &file.etag);

    Ok(response)
}

/// `GET /{bucket}/{id}/meta` — return the metadata record.
pub async fn get_meta(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    Path((bucket, id)): Path<(String, String)>,
) -> Result<Json<ObjectMeta>, AppError> {
    debug!(client = %client, bucket = %bucket, object_id = %id, "object meta requested");
    Ok(Json(state.storage.get_meta(&bucket, &id).await?))
}

/// `DELETE /{bucket}/{id}` — remove an object.
pub async fn delete_object(
    State(state): State<AppState>,
    AuthenticatedClient(client): AuthenticatedClient,
    Path((bucket, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    debug!(client = %client, bucket = %bucket, object_id = %id, "object delete requested");
    state.storage.delete_object(&bucket, &id, &client).await?;
    Ok((StatusCode::OK, "OK"))
}

/// `OPTIONS *` — CORS preflight; headers are added by the router layer.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn read_object_fields(mut multipart: Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        if field.name() != Some(OBJECT_FIELD) {
            continue;
        }
        let mime_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        files.push(UploadedFile { mime_type, data });
    }
    Ok(files)
}

/// Strip the quoting and weak prefix HTTP clients put around validators.
fn unquote_etag(value: &str) -> &str {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    value.trim_matches('"')
}

fn set_etag(headers: &mut HeaderMap, etag: &str) {
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
        headers.insert(header::ETAG, value);
    }
}
