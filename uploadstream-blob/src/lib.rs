//! # uploadstream-blob
//!
//! Byte storage for UploadStream, addressed by opaque flat keys.
//!
//! The request path writes uploads through [`BlobStore::create`] chunk by
//! chunk, reads them back with [`BlobStore::open`], and compensates failed
//! uploads with [`BlobStore::delete`]. Blob stores never see structured
//! metadata; that lives in `uploadstream-metadata`.
//!
//! ## Stores
//!
//! - [`FsBlobStore`]: one file per blob under a root directory
//! - [`MemoryBlobStore`]: shared in-memory map, used by tests
//!
//! ```rust,no_run
//! use uploadstream_blob::{BlobStore, FsBlobConfig, FsBlobStore};
//!
//! # async fn demo() -> uploadstream_blob::BlobResult<()> {
//! let store = FsBlobStore::new(FsBlobConfig::new().with_root("/tmp/uploads")).await?;
//! store.put_bytes("greeting", b"hello").await?;
//! assert_eq!(store.read_to_vec("greeting").await?, b"hello");
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod fs;
mod memory;
mod store;

pub use config::FsBlobConfig;
pub use error::{BlobError, BlobResult};
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use store::{validate_key, BlobReader, BlobStore, BlobWriter};

/// Convenience re-exports
pub mod prelude {
    pub use crate::{BlobError, BlobResult, BlobStore, FsBlobStore, MemoryBlobStore};
}
