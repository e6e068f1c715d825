use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;
use uploadstream_core::FileError;

/// A [`FileError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct HttpError(pub FileError);

impl From<FileError> for HttpError {
    fn from(e: FileError) -> Self {
        Self(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        if self.0.code() >= 500 {
            match &self.0.source {
                Some(source) => error!("{}: {:#}", self.0, source),
                None => error!("{}", self.0),
            }
        }

        // Sources carry paths and driver messages; never serialize them.
        let safe = self.0.sanitize_for_client();
        let status = StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}
