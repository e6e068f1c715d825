//! uploadstream-core: transport-agnostic building blocks shared by every
//! UploadStream crate.
//!
//! - [`FileError`] / [`ErrorKind`]: the error taxonomy surfaced to callers
//! - [`Settings`]: flat key/value configuration with environment overrides
//! - [`limits`]: the transfer ceilings used as configuration defaults

pub mod config;
pub mod errors;
pub mod limits;

pub use config::Settings;
pub use errors::{ErrorKind, FileError, FileResult};
