//! Format-dispatching text extraction.
//!
//! Connectors hand this module bytes plus the declared media type; it
//! returns plain text with extraction metadata. Each format has a
//! primary strategy; failed or insufficient primaries fall back, ending
//! at raw byte-to-text decoding before anything is rejected as
//! unsupported.

mod html;
mod image;
mod ocr;
mod office;
mod pdf;
mod sheet;
mod text;

pub use ocr::{OcrClient, OcrConfig, RecognizedPage};

use crate::error::ExtractError;
use crate::models::ExtractedText;
use tracing::warn;

/// Closed set of supported format families. Legacy binary Office types
/// are routed to the nearest XML strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    WordDocument,
    Spreadsheet,
    Presentation,
    Html,
    Delimited,
    PlainText,
    RasterImage,
}

impl MediaKind {
    pub fn from_media_type(media_type: &str) -> Option<MediaKind> {
        let normalized = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "application/pdf" => Some(MediaKind::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => Some(MediaKind::WordDocument),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel"
            | "application/vnd.oasis.opendocument.spreadsheet" => Some(MediaKind::Spreadsheet),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            | "application/vnd.ms-powerpoint" => Some(MediaKind::Presentation),
            "text/html" | "application/xhtml+xml" => Some(MediaKind::Html),
            "text/csv" | "text/tab-separated-values" => Some(MediaKind::Delimited),
            "text/plain" | "text/markdown" => Some(MediaKind::PlainText),
            other if other.starts_with("image/") => Some(MediaKind::RasterImage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Hard page bound for PDF extraction; rendering stops here rather
    /// than erroring on long documents.
    pub max_pdf_pages: usize,
    /// Below this many characters a strategy's output counts as
    /// insufficient and the next fallback is tried.
    pub min_content_chars: usize,
    /// Recursion bound when walking nested object trees from untrusted
    /// files.
    pub max_walk_depth: usize,
    /// Images whose shorter edge is below this are pre-processed before
    /// recognition; larger ones are sent as-is.
    pub min_image_edge: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_pdf_pages: 50,
            min_content_chars: 25,
            max_walk_depth: 64,
            min_image_edge: 1000,
        }
    }
}

/// Media-type dispatching extractor. OCR-dependent strategies (scanned
/// PDFs, raster images) need an [`OcrClient`]; without one they degrade
/// or fail, they never panic.
pub struct TextExtractor {
    config: ExtractorConfig,
    ocr: Option<OcrClient>,
}

impl TextExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config, ocr: None }
    }

    pub fn with_ocr(mut self, ocr: OcrClient) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub async fn extract(
        &self,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<ExtractedText, ExtractError> {
        let kind = MediaKind::from_media_type(media_type);

        let primary = match kind {
            Some(MediaKind::Pdf) => {
                pdf::extract_pdf(bytes, &self.config, self.ocr.as_ref()).await
            }
            Some(MediaKind::WordDocument) => office::extract_word(bytes),
            Some(MediaKind::Spreadsheet) => sheet::extract_workbook(bytes),
            Some(MediaKind::Presentation) => office::extract_presentation(bytes, &self.config),
            Some(MediaKind::Html) => html::extract_html(bytes),
            Some(MediaKind::Delimited) => text::extract_delimited(bytes),
            Some(MediaKind::PlainText) => text::extract_plain(bytes),
            Some(MediaKind::RasterImage) => {
                image::extract_image(bytes, media_type, &self.config, self.ocr.as_ref()).await
            }
            None => Err(ExtractError::UnsupportedFormat(media_type.to_string())),
        };

        match primary {
            Ok(extracted) => Ok(extracted),
            Err(error) => {
                // Last resort before giving up: treat the bytes as text.
                if let Ok(fallback) = text::extract_raw(bytes) {
                    if fallback.content.trim().len() >= self.config.min_content_chars {
                        warn!(
                            media_type,
                            %error,
                            "primary extraction failed, using raw text fallback"
                        );
                        return Ok(fallback);
                    }
                }
                match kind {
                    None => Err(ExtractError::UnsupportedFormat(media_type.to_string())),
                    Some(_) => Err(error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMethod;

    #[test]
    fn legacy_office_types_route_to_xml_strategies() {
        assert_eq!(
            MediaKind::from_media_type("application/msword"),
            Some(MediaKind::WordDocument)
        );
        assert_eq!(
            MediaKind::from_media_type("application/vnd.ms-excel"),
            Some(MediaKind::Spreadsheet)
        );
        assert_eq!(
            MediaKind::from_media_type("application/vnd.ms-powerpoint"),
            Some(MediaKind::Presentation)
        );
    }

    #[test]
    fn media_type_parameters_are_ignored() {
        assert_eq!(
            MediaKind::from_media_type("text/html; charset=utf-8"),
            Some(MediaKind::Html)
        );
    }

    #[tokio::test]
    async fn unknown_textual_payload_falls_back_to_raw_text() {
        let extractor = TextExtractor::new(ExtractorConfig::default());
        let bytes = b"meeting notes: the quarterly review moved to thursday afternoon";
        let extracted = extractor
            .extract(bytes, "application/x-unknown-notes")
            .await
            .unwrap();
        assert_eq!(extracted.method, ExtractionMethod::RawText);
        assert!(extracted.content.contains("quarterly review"));
    }

    #[tokio::test]
    async fn unknown_binary_payload_is_unsupported() {
        let extractor = TextExtractor::new(ExtractorConfig::default());
        let bytes: Vec<u8> = (0u8..=255).cycle().take(1024).collect();
        let error = extractor
            .extract(&bytes, "application/octet-stream")
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn corrupt_known_format_keeps_its_own_error() {
        let extractor = TextExtractor::new(ExtractorConfig::default());
        let error = extractor
            .extract(b"\x00\x01\x02\x03", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractError::Failed(_)));
    }
}
