use super::ocr::OcrClient;
use super::ExtractorConfig;
use crate::error::ExtractError;
use crate::models::{ExtractedText, ExtractionMethod};
use tracing::warn;

/// Extract PDF text: the embedded text layer first, page by page up to
/// the configured bound; scanned documents with no usable text layer
/// fall back to the remote OCR endpoint when one is configured.
pub async fn extract_pdf(
    bytes: &[u8],
    config: &ExtractorConfig,
    ocr: Option<&OcrClient>,
) -> Result<ExtractedText, ExtractError> {
    let text_layer = extract_text_layer(bytes, config.max_pdf_pages)?;
    if text_layer.content.trim().len() >= config.min_content_chars {
        return Ok(text_layer);
    }

    let Some(client) = ocr else {
        if text_layer.content.trim().is_empty() {
            return Err(ExtractError::NoExtractableContent);
        }
        return Ok(text_layer);
    };

    warn!(
        text_layer_chars = text_layer.content.trim().len(),
        "pdf text layer insufficient, running ocr"
    );

    let mut pages = client.recognize_pdf(bytes).await?;
    pages.truncate(config.max_pdf_pages);

    let mut content = String::new();
    let mut confidences = Vec::new();
    for page in &pages {
        if !content.is_empty() {
            content.push('\u{000C}');
        }
        content.push_str(&format!("[page {}]\n", page.number));
        content.push_str(page.text.trim());
        if let Some(confidence) = page.confidence {
            confidences.push(confidence);
        }
    }

    if content.trim().is_empty() {
        return Err(ExtractError::NoExtractableContent);
    }

    let confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
    };

    Ok(ExtractedText {
        content,
        method: ExtractionMethod::PdfOcr,
        confidence,
        section_count: Some(pages.len() as u32),
    })
}

/// Walk the page tree collecting the text layer. Running out of pages
/// ends extraction; it is not an error.
fn extract_text_layer(bytes: &[u8], max_pages: usize) -> Result<ExtractedText, ExtractError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|error| ExtractError::Failed(format!("pdf parse: {error}")))?;

    let mut content = String::new();
    let mut page_count = 0u32;

    for (page_no, _page_id) in document.get_pages() {
        if page_count as usize >= max_pages {
            break;
        }
        let text = match document.extract_text(&[page_no]) {
            Ok(text) => text,
            Err(_) => break,
        };
        page_count += 1;

        if text.trim().is_empty() {
            continue;
        }
        if !content.is_empty() {
            content.push('\u{000C}');
        }
        content.push_str(&format!("[page {page_no}]\n"));
        content.push_str(text.trim());
    }

    Ok(ExtractedText {
        content,
        method: ExtractionMethod::PdfText,
        confidence: None,
        section_count: Some(page_count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn corrupt_pdf_is_a_hard_failure() {
        let config = ExtractorConfig::default();
        let error = extract_pdf(b"%PDF-1.4\n%broken", &config, None)
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractError::Failed(_)));
    }

    #[tokio::test]
    async fn empty_text_layer_without_ocr_is_no_content() {
        // A structurally valid single-page PDF with no text operators.
        let pdf = b"%PDF-1.4\n\
1 0 obj<</Type/Catalog/Pages 2 0 R>>endobj\n\
2 0 obj<</Type/Pages/Kids[3 0 R]/Count 1>>endobj\n\
3 0 obj<</Type/Page/Parent 2 0 R/MediaBox[0 0 612 792]>>endobj\n\
xref\n0 4\n0000000000 65535 f \n\
trailer<</Size 4/Root 1 0 R>>\nstartxref\n0\n%%EOF";
        let config = ExtractorConfig::default();
        let result = extract_pdf(pdf, &config, None).await;
        assert!(matches!(
            result,
            Err(ExtractError::NoExtractableContent) | Err(ExtractError::Failed(_))
        ));
    }
}
