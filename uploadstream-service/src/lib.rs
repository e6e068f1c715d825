//! # uploadstream-service
//!
//! The request path of UploadStream, independent of any transport.
//!
//! - [`TransferHandler`]: streaming upload and download. Uploads are checked
//!   as they arrive (size ceilings, chunk size, magic-byte sniffing) and every
//!   abort removes the partial blob before the error is returned.
//! - [`FileService`]: metadata get, paginated list and owner-checked delete.
//! - [`AdmissionGate`]: caps concurrent uploads, failing fast when full.
//! - [`CredentialProvider`]: API key checks done by the transport before the
//!   core is called.
//!
//! Every operation reports failures as [`uploadstream_core::FileError`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::stream;
//! use tokio_util::sync::CancellationToken;
//! use uploadstream_blob::MemoryBlobStore;
//! use uploadstream_metadata::MemoryMetadataStore;
//! use uploadstream_service::{TransferConfig, TransferHandler, UploadMessage, UploadMetadata};
//!
//! # async fn demo() -> uploadstream_core::FileResult<()> {
//! let handler = TransferHandler::new(
//!     Arc::new(MemoryBlobStore::new()),
//!     Arc::new(MemoryMetadataStore::new()),
//!     TransferConfig::default(),
//! );
//!
//! let messages = stream::iter(vec![
//!     Ok::<_, std::io::Error>(UploadMessage::Metadata(UploadMetadata::new("hello.txt", "text/plain", 5, "user-1"))),
//!     Ok(UploadMessage::chunk("hello")),
//! ]);
//! let receipt = handler.upload(messages, CancellationToken::new()).await?;
//! assert_eq!(receipt.size, 5);
//! # Ok(())
//! # }
//! ```

mod auth;
mod config;
mod files;
mod gate;
mod messages;
pub mod sniff;
mod transfer;
mod validator;

pub use auth::{authenticate, CredentialProvider, Principal, StaticCredentials};
pub use config::{ListConfig, TransferConfig};
pub use files::FileService;
pub use gate::{AdmissionGate, UploadPermit};
pub use messages::{
    DeleteOutcome, DownloadMessage, FileEntry, FileInfo, FileList, FileMetadata, ProcessingResult, UploadMessage,
    UploadMetadata, UploadReceipt,
};
pub use transfer::{DownloadStream, TransferHandler};
pub use validator::{validate_metadata, ContentValidator};
