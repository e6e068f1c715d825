use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use tracing::{debug, instrument, warn};

use uploadstream_blob::BlobStore;
use uploadstream_metadata::{FileRecord, FileType, JobCompletion, ThumbnailKeys};

use crate::{JobError, ThumbnailConfig};

/// Produces derived artifacts for one file.
#[async_trait]
pub trait DerivativeProcessor: Send + Sync {
    async fn process(&self, file: &FileRecord) -> Result<JobCompletion, JobError>;
}

/// Thumbnail variants, smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailSize {
    Small,
    Medium,
    Large,
}

impl ThumbnailSize {
    pub const ALL: [ThumbnailSize; 3] = [Self::Small, Self::Medium, Self::Large];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// Blob key of this variant for `blob_key`.
    pub fn key_for(&self, blob_key: &str) -> String {
        format!("{}-thumb-{}", blob_key, self.name())
    }

    fn width(&self, config: &ThumbnailConfig) -> u32 {
        match self {
            Self::Small => config.small_width,
            Self::Medium => config.medium_width,
            Self::Large => config.large_width,
        }
    }
}

/// Height that keeps the aspect ratio at `width`, never zero.
pub fn scaled_height(orig_width: u32, orig_height: u32, width: u32) -> u32 {
    if orig_width == 0 {
        return 1;
    }
    let height = u64::from(orig_height) * u64::from(width) / u64::from(orig_width);
    u32::try_from(height).unwrap_or(u32::MAX).max(1)
}

struct Rendered {
    width: u32,
    height: u32,
    variants: Vec<(ThumbnailSize, Vec<u8>)>,
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, JobError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| JobError::permanent(format!("read image header: {e}")))
}

fn render(bytes: Vec<u8>, config: &ThumbnailConfig) -> Result<Rendered, JobError> {
    // Header first, so an unreadable file is rejected before pixels are allocated.
    let (width, height) = reader(&bytes)?
        .into_dimensions()
        .map_err(|e| JobError::permanent(format!("decode image header: {e}")))?;
    if width == 0 || height == 0 {
        return Err(JobError::permanent(format!("image has no pixels ({width}x{height})")));
    }

    let original = reader(&bytes)?
        .decode()
        .map_err(|e| JobError::permanent(format!("decode image: {e}")))?;

    let mut variants = Vec::with_capacity(ThumbnailSize::ALL.len());
    for size in ThumbnailSize::ALL {
        let target_width = size.width(config);
        let target_height = scaled_height(width, height, target_width);
        let thumb = original
            .resize_exact(target_width, target_height, FilterType::Lanczos3)
            .to_rgb8();

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, config.jpeg_quality)
            .encode_image(&thumb)
            .map_err(|e| JobError::permanent(format!("encode {} thumbnail: {e}", size.name())))?;
        variants.push((size, encoded));
    }

    Ok(Rendered {
        width,
        height,
        variants,
    })
}

/// Decodes an image blob and writes small/medium/large JPEG thumbnails next
/// to it in the blob store.
pub struct ThumbnailProcessor {
    blobs: Arc<dyn BlobStore>,
    config: ThumbnailConfig,
}

impl ThumbnailProcessor {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_config(blobs, ThumbnailConfig::default())
    }

    pub fn with_config(blobs: Arc<dyn BlobStore>, config: ThumbnailConfig) -> Self {
        Self { blobs, config }
    }

    /// Generate thumbnails for the blob `blob_key` declared as `content_type`.
    #[instrument(skip(self))]
    pub async fn generate(&self, blob_key: &str, content_type: &str) -> Result<JobCompletion, JobError> {
        if FileType::derive(content_type) != FileType::Image {
            return Err(JobError::permanent(format!(
                "content type {content_type} is not an image"
            )));
        }

        let bytes = self.blobs.read_to_vec(blob_key).await.map_err(JobError::from)?;

        let config = self.config.clone();
        let rendered = tokio::task::spawn_blocking(move || render(bytes, &config))
            .await
            .map_err(|e| JobError::retryable(format!("thumbnail task failed: {e}")))??;

        let mut thumbnails = ThumbnailKeys::default();
        let mut written: Vec<String> = Vec::with_capacity(rendered.variants.len());
        for (size, encoded) in &rendered.variants {
            let key = size.key_for(blob_key);
            if let Err(err) = self.blobs.put_bytes(&key, encoded).await {
                warn!("Failed to write {} thumbnail: {}", size.name(), err);
                written.push(key);
                self.discard(&written).await;
                return Err(JobError::from(err));
            }
            debug!("Wrote {} thumbnail ({} bytes)", size.name(), encoded.len());
            match size {
                ThumbnailSize::Small => thumbnails.small = Some(key.clone()),
                ThumbnailSize::Medium => thumbnails.medium = Some(key.clone()),
                ThumbnailSize::Large => thumbnails.large = Some(key.clone()),
            }
            written.push(key);
        }

        Ok(JobCompletion {
            thumbnails,
            original_width: Some(rendered.width),
            original_height: Some(rendered.height),
        })
    }

    async fn discard(&self, keys: &[String]) {
        for key in keys {
            if let Err(err) = self.blobs.delete(key).await {
                if !err.is_not_found() {
                    warn!("Failed to remove partial thumbnail {}: {}", key, err);
                }
            }
        }
    }
}

#[async_trait]
impl DerivativeProcessor for ThumbnailProcessor {
    async fn process(&self, file: &FileRecord) -> Result<JobCompletion, JobError> {
        self.generate(&file.blob_key, &file.content_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use uploadstream_blob::{BlobError, BlobReader, BlobResult, BlobWriter, MemoryBlobStore};

    /// Memory store whose `create` fails for keys with the given suffix.
    struct FailingCreates {
        inner: MemoryBlobStore,
        suffix: &'static str,
    }

    #[async_trait]
    impl BlobStore for FailingCreates {
        async fn create(&self, id: &str) -> BlobResult<BlobWriter> {
            if id.ends_with(self.suffix) {
                return Err(BlobError::backend(std::io::Error::other("disk full")));
            }
            self.inner.create(id).await
        }

        async fn open(&self, id: &str) -> BlobResult<BlobReader> {
            self.inner.open(id).await
        }

        async fn delete(&self, id: &str) -> BlobResult<()> {
            self.inner.delete(id).await
        }

        async fn exists(&self, id: &str) -> BlobResult<bool> {
            self.inner.exists(id).await
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 255) as u8, (y % 255) as u8, 128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn heights_keep_aspect_ratio() {
        assert_eq!(scaled_height(1000, 500, 150), 75);
        assert_eq!(scaled_height(800, 600, 400), 300);
        assert_eq!(scaled_height(3000, 1, 150), 1);
    }

    #[tokio::test]
    async fn writes_three_jpeg_thumbnails() {
        let blobs = MemoryBlobStore::new();
        blobs.put_bytes("img", &png(1000, 500)).await.unwrap();
        let processor = ThumbnailProcessor::new(Arc::new(blobs.clone()));

        let completion = processor.generate("img", "image/png").await.unwrap();

        assert_eq!(completion.original_width, Some(1000));
        assert_eq!(completion.original_height, Some(500));
        assert_eq!(completion.thumbnails.small.as_deref(), Some("img-thumb-small"));
        assert_eq!(completion.thumbnails.medium.as_deref(), Some("img-thumb-medium"));
        assert_eq!(completion.thumbnails.large.as_deref(), Some("img-thumb-large"));

        let small = blobs.get("img-thumb-small").unwrap();
        let reader = ImageReader::new(Cursor::new(small)).with_guessed_format().unwrap();
        assert_eq!(reader.format(), Some(ImageFormat::Jpeg));
        assert_eq!(reader.into_dimensions().unwrap(), (150, 75));

        let large = blobs.get("img-thumb-large").unwrap();
        let dims = ImageReader::new(Cursor::new(large))
            .with_guessed_format()
            .unwrap()
            .into_dimensions()
            .unwrap();
        assert_eq!(dims, (500, 250));
    }

    #[tokio::test]
    async fn failed_write_removes_thumbnails_already_written() {
        let blobs = MemoryBlobStore::new();
        blobs.put_bytes("img", &png(800, 600)).await.unwrap();
        let store = FailingCreates {
            inner: blobs.clone(),
            suffix: "-thumb-medium",
        };
        let processor = ThumbnailProcessor::new(Arc::new(store));

        let err = processor.generate("img", "image/png").await.unwrap_err();

        assert!(err.is_retryable());
        assert!(err.message().contains("disk full"));
        assert_eq!(blobs.keys(), vec!["img".to_string()]);
    }

    #[tokio::test]
    async fn undecodable_images_fail_permanently() {
        let blobs = MemoryBlobStore::new();
        blobs.put_bytes("bad", b"\x89PNG\r\n\x1a\nnot really").await.unwrap();
        let processor = ThumbnailProcessor::new(Arc::new(blobs.clone()));

        let err = processor.generate("bad", "image/png").await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(blobs.keys(), vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn non_images_are_rejected() {
        let processor = ThumbnailProcessor::new(Arc::new(MemoryBlobStore::new()));
        let err = processor.generate("doc", "application/pdf").await.unwrap_err();
        assert!(matches!(err, JobError::Permanent(_)));
    }
}
