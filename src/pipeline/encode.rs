//! Image encoding: image file on disk → base64 `ImageData` for the VLM.
//!
//! Images referenced from OCR Markdown are already PNG/JPEG/GIF files, so
//! the bytes are sent unchanged with a MIME type derived from the content.
//! `detail: "high"` keeps chart labels and small print legible to the model.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// MIME type for an image, guessed from its bytes, then its extension.
pub fn mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    let format = image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_path(path).ok());
    match format {
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::Gif) => "image/gif",
        _ => "image/png",
    }
}

/// Read an image file and wrap it as a base64 attachment.
pub fn encode_image_file(path: &Path) -> std::io::Result<ImageData> {
    let bytes = std::fs::read(path)?;
    let mime = mime_type(path, &bytes);
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64 ({})", path.display(), b64.len(), mime);

    Ok(ImageData::new(b64, mime).with_detail("high"))
}
