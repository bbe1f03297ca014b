use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use image::{ImageFormat, Rgb, RgbImage};
use innapse_contracts::config::AspectRatio;
use innapse_contracts::prompt::GenerationRequest;
use sha2::{Digest, Sha256};

use crate::client::{GeneratedPayload, GenerationClient, GenerationError};

const BASE_EDGE: u32 = 512;

/// Offline client that paints a solid colour derived from the request.
///
/// Each call bumps an attempt counter, so replaying the same request (a
/// variation) yields a different image.
#[derive(Debug, Default)]
pub struct DryrunClient {
    attempts: AtomicU64,
}

impl DryrunClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GenerationClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPayload, GenerationError> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        let (width, height) = match request.images.first() {
            Some(reference) => image::load_from_memory(reference.bytes())
                .map(|decoded| (decoded.width().max(1), decoded.height().max(1)))
                .unwrap_or((BASE_EDGE, BASE_EDGE)),
            None => dims_for_ratio(request.aspect_ratio),
        };
        let (r, g, b) = color_for_request(request, attempt);
        let canvas = RgbImage::from_pixel(width, height, Rgb([r, g, b]));

        let mut bytes = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| GenerationError::Request {
                provider: "dryrun".to_string(),
                message: format!("png encode failed: {err}"),
            })?;
        Ok(GeneratedPayload {
            bytes,
            mime_type: "image/png".to_string(),
        })
    }
}

pub fn dims_for_ratio(ratio: AspectRatio) -> (u32, u32) {
    let (w, h) = ratio.units();
    if w >= h {
        (BASE_EDGE * w / h, BASE_EDGE)
    } else {
        (BASE_EDGE, BASE_EDGE * h / w)
    }
}

fn color_for_request(request: &GenerationRequest, attempt: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(request.prompt.as_bytes());
    hasher.update(attempt.to_be_bytes());
    for image in &request.images {
        hasher.update(image.bytes());
    }
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
