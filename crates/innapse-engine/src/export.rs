use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

pub const JPEG_QUALITY: u8 = 92;
const DEFAULT_FILE_STEM: &str = "innapse_ai_image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFormat {
    Png,
    Jpeg,
}

impl DownloadFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DownloadFormat::Png => "png",
            DownloadFormat::Jpeg => "jpeg",
        }
    }

    pub fn default_file_name(self) -> String {
        format!("{DEFAULT_FILE_STEM}.{}", self.extension())
    }

    /// Guesses the format from a target path; anything not JPEG is PNG.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => DownloadFormat::Jpeg,
            _ => DownloadFormat::Png,
        }
    }
}

impl FromStr for DownloadFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(DownloadFormat::Png),
            "jpg" | "jpeg" => Ok(DownloadFormat::Jpeg),
            other => Err(format!("Unknown download format '{other}'. Expected png or jpeg.")),
        }
    }
}

impl fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Bytes to write for a download. PNG passes the image through untouched;
/// JPEG is flattened onto white since it has no alpha channel.
pub fn encode_for_download(bytes: &[u8], format: DownloadFormat) -> Result<Vec<u8>> {
    match format {
        DownloadFormat::Png => Ok(bytes.to_vec()),
        DownloadFormat::Jpeg => {
            let decoded = image::load_from_memory(bytes).context("image decode failed")?;
            let flattened = flatten_on_white(&decoded);
            let mut out = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            encoder
                .encode_image(&DynamicImage::ImageRgb8(flattened))
                .context("jpeg encode failed")?;
            Ok(out)
        }
    }
}

/// Writes the download, picking the default file name when `target` is a
/// directory. Returns the path written.
pub fn write_download(bytes: &[u8], format: DownloadFormat, target: &Path) -> Result<PathBuf> {
    let path = if target.is_dir() {
        target.join(format.default_file_name())
    } else {
        target.to_path_buf()
    };
    let encoded = encode_for_download(bytes, format)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, encoded).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}
