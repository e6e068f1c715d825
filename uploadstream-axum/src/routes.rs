use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde::Deserialize;
use tracing::warn;

use uploadstream_core::FileError;
use uploadstream_service::{
    DeleteOutcome, DownloadMessage, FileList, FileMetadata, Principal, UploadMessage, UploadMetadata, UploadReceipt,
};

use crate::{AppState, HttpError};

pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const FILE_SIZE_HEADER: &str = "x-file-size";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The metadata message of an upload, taken from its request headers.
fn upload_metadata(headers: &HeaderMap, owner_id: &str) -> Result<UploadMetadata, FileError> {
    let size = header_str(headers, FILE_SIZE_HEADER)
        .ok_or_else(|| FileError::invalid_argument(format!("missing {FILE_SIZE_HEADER} header")))?;
    let size = size
        .trim()
        .parse::<u64>()
        .map_err(|_| FileError::invalid_argument(format!("invalid {FILE_SIZE_HEADER} header: {size:?}")))?;

    Ok(UploadMetadata::new(
        header_str(headers, FILE_NAME_HEADER).unwrap_or_default(),
        header_str(headers, header::CONTENT_TYPE.as_str()).unwrap_or_default(),
        size,
        owner_id,
    ))
}

/// Cut a body frame into pieces of at most `max` bytes.
fn split_frame(mut frame: Bytes, max: usize) -> Vec<Bytes> {
    let mut pieces = Vec::with_capacity(frame.len().div_ceil(max.max(1)));
    while frame.len() > max {
        pieces.push(frame.split_to(max));
    }
    if !frame.is_empty() {
        pieces.push(frame);
    }
    pieces
}

/// `POST /files`
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<UploadReceipt>), HttpError> {
    let metadata = upload_metadata(&headers, &principal.owner_id)?;
    let max_chunk = state.transfer.config().max_chunk_bytes.max(1);

    let chunks = body.into_data_stream().flat_map(move |frame| {
        let messages: Vec<Result<UploadMessage, axum::Error>> = match frame {
            Ok(frame) => split_frame(frame, max_chunk)
                .into_iter()
                .map(|piece| Ok(UploadMessage::Chunk(piece)))
                .collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(messages)
    });
    let messages = stream::once(async move { Ok(UploadMessage::Metadata(metadata)) }).chain(chunks);

    let receipt = state
        .transfer
        .upload(messages, state.shutdown.child_token())
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /files/{id}`: file info goes into headers, chunks into the body.
pub async fn download_file(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, HttpError> {
    let mut download = state.transfer.download(&id, state.shutdown.child_token()).await?;

    let info = match download.next().await {
        Some(Ok(DownloadMessage::Info(info))) => info,
        Some(Ok(DownloadMessage::Chunk(_))) | None => {
            return Err(FileError::internal("download did not start with file info").into())
        }
        Some(Err(e)) => return Err(e.into()),
    };

    let body = Body::from_stream(download.map(|message| match message {
        Ok(DownloadMessage::Chunk(chunk)) => Ok(chunk),
        Ok(DownloadMessage::Info(_)) => Err(FileError::internal("file info sent twice")),
        Err(e) => {
            warn!("Download aborted mid-stream: {}", e);
            Err(e)
        }
    }));

    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&info.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));
    if let Ok(name) = HeaderValue::from_str(&info.display_name) {
        headers.insert(FILE_NAME_HEADER, name);
    }
    Ok(response)
}

/// `GET /files/{id}/metadata`
pub async fn file_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileMetadata>, HttpError> {
    Ok(Json(state.files.get_file_metadata(&id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page_size: Option<i64>,
    pub page_token: Option<String>,
}

/// `GET /files?page_size=&page_token=`, scoped to the caller.
pub async fn list_files(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FileList>, HttpError> {
    let list = state
        .files
        .list_files(
            &principal.owner_id,
            query.page_size.unwrap_or(0),
            query.page_token.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(list))
}

/// `DELETE /files/{id}`
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<DeleteOutcome>, HttpError> {
    Ok(Json(state.files.delete_file(&id, &principal.owner_id).await?))
}
