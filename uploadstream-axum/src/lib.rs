//! uploadstream-axum: HTTP transport for UploadStream.
//!
//! | Route | Operation |
//! |---|---|
//! | `POST /files` | streaming upload; metadata in `x-file-name`, `content-type`, `x-file-size` |
//! | `GET /files/{id}` | streaming download |
//! | `GET /files/{id}/metadata` | file details and processing state |
//! | `GET /files` | the caller's files, paginated |
//! | `DELETE /files/{id}` | owner-only soft delete |
//!
//! Every route requires `x-api-key` (or `Authorization: Bearer`) and
//! `x-user-id`. Errors are returned as the JSON payload of
//! [`uploadstream_core::FileError::to_json`].

pub mod app;
pub mod auth;
mod config;
mod error;
pub mod routes;
mod server;
mod state;

pub use app::{router, HttpApp};
pub use config::HttpConfig;
pub use error::HttpError;
pub use server::Server;
pub use state::AppState;
