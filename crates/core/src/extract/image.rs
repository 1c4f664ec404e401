use super::ocr::OcrClient;
use super::ExtractorConfig;
use crate::error::ExtractError;
use crate::models::{ExtractedText, ExtractionMethod};
use image::imageops::FilterType;
use std::io::Cursor;
use tracing::debug;

/// Raster image extraction: prepare the pixels for recognition quality,
/// then run the OCR endpoint.
pub async fn extract_image(
    bytes: &[u8],
    media_type: &str,
    config: &ExtractorConfig,
    ocr: Option<&OcrClient>,
) -> Result<ExtractedText, ExtractError> {
    let Some(client) = ocr else {
        return Err(ExtractError::Failed(
            "no ocr endpoint configured for image recognition".to_string(),
        ));
    };

    let prepared = prepare_for_ocr(bytes, config.min_image_edge)?;
    let (payload, payload_type) = match &prepared {
        Some(processed) => (processed.as_slice(), "image/png"),
        None => (bytes, media_type),
    };

    let (text, confidence) = client.recognize_image(payload, payload_type).await?;
    if text.trim().is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }

    Ok(ExtractedText {
        content: text,
        method: ExtractionMethod::ImageOcr,
        confidence,
        section_count: Some(1),
    })
}

/// Upscale, sharpen, and grayscale-normalize images below the resolution
/// threshold. High-resolution input is sent untouched (`None`).
fn prepare_for_ocr(bytes: &[u8], min_edge: u32) -> Result<Option<Vec<u8>>, ExtractError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|error| ExtractError::Failed(format!("image decode: {error}")))?;

    let (width, height) = (decoded.width(), decoded.height());
    let shorter = width.min(height).max(1);
    if shorter >= min_edge {
        return Ok(None);
    }

    let factor = (min_edge as f32 / shorter as f32).ceil();
    let scaled = decoded.resize_exact(
        (width as f32 * factor) as u32,
        (height as f32 * factor) as u32,
        FilterType::CatmullRom,
    );
    let normalized = scaled.grayscale().unsharpen(1.0, 2);

    debug!(
        width,
        height,
        factor,
        "upscaled image for ocr"
    );

    let mut out = Cursor::new(Vec::new());
    normalized
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(|error| ExtractError::Failed(format!("image encode: {error}")))?;
    Ok(Some(out.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        let buffer = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(buffer)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn small_images_are_upscaled() {
        let png = png_of(120, 80);
        let prepared = prepare_for_ocr(&png, 400).unwrap();
        let processed = prepared.expect("low-resolution image should be pre-processed");
        let reloaded = image::load_from_memory(&processed).unwrap();
        assert!(reloaded.width() >= 400 && reloaded.height() >= 400);
    }

    #[test]
    fn high_resolution_images_skip_preprocessing() {
        let png = png_of(500, 450);
        assert!(prepare_for_ocr(&png, 400).unwrap().is_none());
    }

    #[test]
    fn undecodable_bytes_are_a_hard_failure() {
        assert!(matches!(
            prepare_for_ocr(b"not pixels", 400),
            Err(ExtractError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn missing_ocr_client_is_a_hard_failure() {
        let config = ExtractorConfig::default();
        let error = extract_image(&png_of(10, 10), "image/png", &config, None)
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractError::Failed(_)));
    }
}
