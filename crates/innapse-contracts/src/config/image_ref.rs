use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// A reference image held by a configuration slot.
///
/// The bytes are shared, so cloning a configuration for variation replay
/// does not copy image data. The slot owns its reference; replacing or
/// clearing the slot drops it.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageRef {
    bytes: Arc<[u8]>,
    mime_type: String,
    preview: String,
}

impl ImageRef {
    pub fn from_bytes(
        bytes: impl Into<Vec<u8>>,
        mime_type: impl Into<String>,
        preview: impl Into<String>,
    ) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            mime_type: mime_type.into(),
            preview: preview.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let Some(mime_type) = sniff_image_mime(&bytes) else {
            bail!("{} is not a supported image file", path.display());
        };
        if let Some(named) = mime_for_path(path).filter(|named| *named != mime_type) {
            log::debug!("{} is named as {named} but holds {mime_type}", path.display());
        }
        Ok(Self::from_bytes(
            bytes,
            mime_type,
            path.to_string_lossy().to_string(),
        ))
    }

    pub fn from_data_url(data_url: &str, preview: impl Into<String>) -> Result<Self> {
        let Some((mime_type, bytes)) = decode_data_url(data_url) else {
            bail!("image data is not a readable data URL");
        };
        Ok(Self::from_bytes(bytes, mime_type, preview))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Human readable origin of the image: a file path or a history label.
    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        encode_data_url(&self.mime_type, &self.bytes)
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageRef")
            .field("mime_type", &self.mime_type)
            .field("preview", &self.preview)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Splits a `data:<mime>;base64,<payload>` string into MIME type and bytes.
pub fn decode_data_url(data_url: &str) -> Option<(String, Vec<u8>)> {
    let rest = data_url.trim().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    if mime_type.is_empty() {
        return None;
    }
    let bytes = BASE64.decode(payload.as_bytes()).ok()?;
    Some((mime_type.to_string(), bytes))
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF8") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}
