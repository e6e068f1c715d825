//! Magic-byte content detection.
//!
//! A small table of leading-byte signatures in the spirit of the WHATWG
//! MIME sniffing algorithm. Only the first [`SNIFF_BYTES`] bytes are looked
//! at. Anything unrecognised is `text/plain; charset=utf-8` when it contains
//! no binary control bytes and `application/octet-stream` otherwise.

use uploadstream_core::limits::SNIFF_BYTES;

pub const TEXT_UTF8: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

const HTML: &str = "text/html; charset=utf-8";
const XML: &str = "text/xml; charset=utf-8";

enum Signature {
    /// Input starts with `prefix`.
    Prefix(&'static [u8], &'static str),
    /// `input & mask == pattern` over the mask's length.
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        mime: &'static str,
    },
    /// Case-insensitive tag after leading whitespace, followed by a space or `>`.
    HtmlTag(&'static [u8]),
    /// `<?xml` after leading whitespace.
    Xml,
    /// ISO base media `ftyp` box with an `mp4` brand.
    Mp4,
}

const SIGNATURES: &[Signature] = &[
    Signature::HtmlTag(b"<!DOCTYPE HTML"),
    Signature::HtmlTag(b"<HTML"),
    Signature::HtmlTag(b"<HEAD"),
    Signature::HtmlTag(b"<SCRIPT"),
    Signature::HtmlTag(b"<IFRAME"),
    Signature::HtmlTag(b"<H1"),
    Signature::HtmlTag(b"<DIV"),
    Signature::HtmlTag(b"<FONT"),
    Signature::HtmlTag(b"<TABLE"),
    Signature::HtmlTag(b"<A"),
    Signature::HtmlTag(b"<STYLE"),
    Signature::HtmlTag(b"<TITLE"),
    Signature::HtmlTag(b"<B"),
    Signature::HtmlTag(b"<BODY"),
    Signature::HtmlTag(b"<BR"),
    Signature::HtmlTag(b"<P"),
    Signature::HtmlTag(b"<!--"),
    Signature::Xml,
    Signature::Prefix(b"%PDF-", "application/pdf"),
    Signature::Prefix(b"%!PS-Adobe-", "application/postscript"),
    // Byte order marks
    Signature::Prefix(b"\xFE\xFF", "text/plain; charset=utf-16be"),
    Signature::Prefix(b"\xFF\xFE", "text/plain; charset=utf-16le"),
    Signature::Prefix(b"\xEF\xBB\xBF", TEXT_UTF8),
    // Images
    Signature::Prefix(b"\x00\x00\x01\x00", "image/x-icon"),
    Signature::Prefix(b"\x00\x00\x02\x00", "image/x-icon"),
    Signature::Prefix(b"BM", "image/bmp"),
    Signature::Prefix(b"GIF87a", "image/gif"),
    Signature::Prefix(b"GIF89a", "image/gif"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
        mime: "image/webp",
    },
    Signature::Prefix(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    Signature::Prefix(b"\xFF\xD8\xFF", "image/jpeg"),
    Signature::Prefix(b"II*\x00", "image/tiff"),
    Signature::Prefix(b"MM\x00*", "image/tiff"),
    // Audio and video
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"FORM\x00\x00\x00\x00AIFF",
        mime: "audio/aiff",
    },
    Signature::Prefix(b"ID3", "audio/mpeg"),
    Signature::Prefix(b"OggS\x00", "application/ogg"),
    Signature::Prefix(b"MThd\x00\x00\x00\x06", "audio/midi"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00AVI ",
        mime: "video/avi",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WAVE",
        mime: "audio/wave",
    },
    Signature::Mp4,
    Signature::Prefix(b"\x1A\x45\xDF\xA3", "video/webm"),
    // Fonts
    Signature::Prefix(b"wOFF", "font/woff"),
    Signature::Prefix(b"wOF2", "font/woff2"),
    // Archives
    Signature::Prefix(b"\x1F\x8B\x08", "application/x-gzip"),
    Signature::Prefix(b"PK\x03\x04", "application/zip"),
    Signature::Prefix(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    Signature::Prefix(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    Signature::Prefix(b"\x00asm", "application/wasm"),
];

/// Detect the content type of `data` from its leading bytes.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_BYTES)];

    for signature in SIGNATURES {
        if let Some(mime) = signature.matches(data) {
            return mime;
        }
    }

    if data.iter().any(|b| is_binary_byte(*b)) {
        OCTET_STREAM
    } else {
        TEXT_UTF8
    }
}

impl Signature {
    fn matches(&self, data: &[u8]) -> Option<&'static str> {
        match self {
            Signature::Prefix(prefix, mime) => data.starts_with(prefix).then_some(*mime),
            Signature::Masked { mask, pattern, mime } => {
                if data.len() < mask.len() {
                    return None;
                }
                mask.iter()
                    .zip(pattern.iter())
                    .zip(data.iter())
                    .all(|((m, p), d)| d & m == *p)
                    .then_some(*mime)
            }
            Signature::HtmlTag(tag) => {
                let data = skip_whitespace(data);
                if data.len() < tag.len() + 1 || !data[..tag.len()].eq_ignore_ascii_case(tag) {
                    return None;
                }
                matches!(data[tag.len()], b' ' | b'>').then_some(HTML)
            }
            Signature::Xml => skip_whitespace(data).starts_with(b"<?xml").then_some(XML),
            Signature::Mp4 => is_mp4(data).then_some("video/mp4"),
        }
    }
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if box_size % 4 != 0 || data.len() < box_size || &data[4..8] != b"ftyp" {
        return false;
    }
    // Major brand, then compatible brands after the minor version.
    let mut offset = 8;
    while offset + 3 <= box_size {
        if offset == 12 {
            offset += 4;
            continue;
        }
        if &data[offset..offset + 3] == b"mp4" {
            return true;
        }
        offset += 4;
    }
    false
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
