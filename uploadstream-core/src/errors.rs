//! # Errors
//!
//! UploadStream reports every request-path failure as a [`FileError`]:
//! - a small, fixed set of kinds with stable names and status codes
//! - an optional structured `data` payload for diagnostics
//! - an optional inner `source` that never leaves the process
//!
//! Transports decide how to serialize; [`FileError::to_json`] gives the
//! Feathers-ish payload used by the HTTP layer.

use std::fmt;

use anyhow::Error as AnyError;
use serde_json::Value;

/// A convenience result type for the request path.
pub type FileResult<T> = std::result::Result<T, FileError>;

/// Error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,   // 400
    Unauthenticated,   // 401
    PermissionDenied,  // 403
    NotFound,          // 404
    ResourceExhausted, // 429
    Canceled,          // 499
    Internal,          // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::ResourceExhausted => 429,
            ErrorKind::Canceled => 499,
            ErrorKind::Internal => 500,
        }
    }

    /// Error `name` as seen by clients (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "BadRequest",
            ErrorKind::Unauthenticated => "NotAuthenticated",
            ErrorKind::PermissionDenied => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ResourceExhausted => "TooManyRequests",
            ErrorKind::Canceled => "Canceled",
            ErrorKind::Internal => "GeneralError",
        }
    }

    /// Kebab-cased `className`
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "bad-request",
            ErrorKind::Unauthenticated => "not-authenticated",
            ErrorKind::PermissionDenied => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::ResourceExhausted => "too-many-requests",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Internal => "general-error",
        }
    }
}

/// A structured request-path error.
///
/// Mirrors Feathers-style fields:
/// - name
/// - message
/// - code (HTTP status)
/// - class_name
/// - data (optional)
#[derive(Debug)]
pub struct FileError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
    pub source: Option<AnyError>,
}

impl FileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: impl Into<AnyError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Turn any error into a FileError:
    /// - if it's already a FileError, keep it (lossless)
    /// - otherwise wrap as Internal
    pub fn normalize(err: AnyError) -> FileError {
        match err.downcast::<FileError>() {
            Ok(file) => file,
            Err(other) => FileError::new(ErrorKind::Internal, other.to_string()).with_source(other),
        }
    }

    /// A "safe" version suitable for returning to clients:
    /// - keep kind/message/data
    /// - drop the inner `source` (paths, driver messages)
    pub fn sanitize_for_client(&self) -> FileError {
        FileError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            source: None,
        }
    }

    /// Feathers-ish JSON payload.
    pub fn to_json(&self) -> Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        base
    }

    // ---- Constructors ----

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, msg)
    }
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, msg)
    }
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, msg)
    }
    pub fn canceled(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, msg)
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
