use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Remote multimodal OCR endpoint settings.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl OcrConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pdf_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_base64: Option<String>,
    media_type: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    pages: Option<Vec<OcrResponsePage>>,
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponsePage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct RecognizedPage {
    pub number: u32,
    pub text: String,
    pub confidence: Option<f32>,
}

/// Client for a multimodal OCR endpoint that accepts base64 payloads and
/// answers with per-page text (or one text blob with form-feed page
/// separators).
pub struct OcrClient {
    endpoint: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OcrClient {
    pub fn new(config: OcrConfig) -> Result<Self, ExtractError> {
        let endpoint = Url::parse(config.endpoint.trim())?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            endpoint,
            api_key: config.api_key,
            client,
        })
    }

    pub async fn recognize_pdf(&self, bytes: &[u8]) -> Result<Vec<RecognizedPage>, ExtractError> {
        let payload = OcrRequest {
            pdf_base64: Some(STANDARD.encode(bytes)),
            image_base64: None,
            media_type: "application/pdf",
        };
        let response = self.post(&payload).await?;
        let pages = pages_from(&response);
        if pages.is_empty() {
            return Err(ExtractError::OcrFailed(
                "ocr response had no readable text".to_string(),
            ));
        }
        Ok(pages)
    }

    pub async fn recognize_image(
        &self,
        bytes: &[u8],
        media_type: &str,
    ) -> Result<(String, Option<f32>), ExtractError> {
        let payload = OcrRequest {
            pdf_base64: None,
            image_base64: Some(STANDARD.encode(bytes)),
            media_type,
        };
        let response = self.post(&payload).await?;
        let confidence = response.confidence;
        let text = match response.text {
            Some(text) if !text.trim().is_empty() => text,
            _ => pages_from(&response)
                .into_iter()
                .map(|page| page.text)
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.trim().is_empty() {
            return Err(ExtractError::OcrFailed(
                "ocr response had no readable text".to_string(),
            ));
        }
        Ok((text, confidence))
    }

    async fn post(&self, payload: &OcrRequest<'_>) -> Result<OcrResponse, ExtractError> {
        let mut request = self.client.post(self.endpoint.clone()).json(payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ExtractError::OcrFailed(format!(
                "ocr request to {} returned {}",
                self.endpoint,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

fn pages_from(response: &OcrResponse) -> Vec<RecognizedPage> {
    if let Some(listed) = &response.pages {
        let listed = listed
            .iter()
            .filter_map(|page| {
                let text = page.text.as_ref().map(|value| value.trim().to_string())?;
                if text.is_empty() {
                    return None;
                }
                Some(RecognizedPage {
                    number: page.page.unwrap_or(1),
                    text,
                    confidence: page.confidence,
                })
            })
            .collect::<Vec<_>>();
        if !listed.is_empty() {
            return listed;
        }
    }

    if let Some(raw_text) = &response.text {
        return raw_text
            .split('\u{000C}')
            .enumerate()
            .filter_map(|(index, section)| {
                let text = section.trim().to_string();
                if text.is_empty() {
                    return None;
                }
                Some(RecognizedPage {
                    number: (index + 1) as u32,
                    text,
                    confidence: response.confidence,
                })
            })
            .collect();
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_list_drops_blank_pages() {
        let response = OcrResponse {
            pages: Some(vec![
                OcrResponsePage {
                    page: Some(2),
                    text: Some("  ".to_string()),
                    confidence: None,
                },
                OcrResponsePage {
                    page: Some(3),
                    text: Some("Page 3".to_string()),
                    confidence: Some(0.92),
                },
            ]),
            text: None,
            confidence: None,
        };

        let pages = pages_from(&response);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 3);
        assert_eq!(pages[0].text, "Page 3");
        assert_eq!(pages[0].confidence, Some(0.92));
    }

    #[test]
    fn fallback_text_splits_on_form_feed() {
        let response = OcrResponse {
            pages: None,
            text: Some("First\u{000C}Second\n".to_string()),
            confidence: Some(0.8),
        };

        let pages = pages_from(&response);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].text, "First");
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[1].text, "Second");
    }

    #[test]
    fn endpoint_must_be_a_valid_url() {
        assert!(OcrClient::new(OcrConfig::new("not a url")).is_err());
        assert!(OcrClient::new(OcrConfig::new("http://localhost:9000/ocr")).is_ok());
    }
}
