//! Mathpix OCR provider (structured math recognition, returns LaTeX).

use super::{OcrProvider, OcrProviderKind, OcrResult};
use crate::config::MathpixConfig;
use crate::ingest::data_url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct MathpixOcrProvider {
    credentials: Option<(String, String)>,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl MathpixOcrProvider {
    pub fn new(config: &MathpixConfig, client: reqwest::Client, timeout: Duration) -> Self {
        let credentials = match (&config.app_id, &config.app_key) {
            (Some(id), Some(key)) if !id.is_empty() && !key.is_empty() => {
                Some((id.clone(), key.clone()))
            }
            _ => {
                warn!("Mathpix credentials not found, Mathpix OCR disabled");
                None
            }
        };

        Self {
            credentials,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        }
    }
}

// ── Mathpix API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct TextRequest<'a> {
    src: String,
    formats: [&'a str; 2],
    data_options: DataOptions,
}

#[derive(Serialize)]
struct DataOptions {
    include_asciimath: bool,
    include_latex: bool,
    include_mathml: bool,
}

#[derive(Deserialize)]
struct TextResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    latex_simplified: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MathpixOcrProvider {
    fn kind(&self) -> OcrProviderKind {
        OcrProviderKind::Mathpix
    }

    fn is_available(&self) -> bool {
        self.credentials.is_some()
    }

    async fn extract(&self, image: &[u8]) -> OcrResult {
        let Some((app_id, app_key)) = &self.credentials else {
            return OcrResult::failure(self.kind(), "Mathpix credentials not configured");
        };

        match self.request(app_id, app_key, image).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Mathpix OCR error: {:#}", e);
                OcrResult::failure(self.kind(), format!("{:#}", e))
            }
        }
    }
}

impl MathpixOcrProvider {
    async fn request(
        &self,
        app_id: &str,
        app_key: &str,
        image: &[u8],
    ) -> anyhow::Result<OcrResult> {
        let body = TextRequest {
            src: data_url(image),
            formats: ["text", "latex_simplified"],
            data_options: DataOptions {
                include_asciimath: true,
                include_latex: true,
                include_mathml: false,
            },
        };

        info!("MathpixOcrProvider: calling OCR API ({} bytes)", image.len());

        let resp = self
            .client
            .post(format!("{}/v3/text", self.base_url))
            .header("app_id", app_id)
            .header("app_key", app_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mathpix API error ({}): {}", status, text);
        }

        let raw_text = resp.text().await?;
        debug!(
            "MathpixOcrProvider: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );
        let raw: serde_json::Value = serde_json::from_str(&raw_text)?;
        let parsed: TextResponse = serde_json::from_value(raw.clone())?;

        if let Some(error) = parsed.error {
            anyhow::bail!("Mathpix API error: {}", error);
        }

        Ok(OcrResult::success(
            OcrProviderKind::Mathpix,
            parsed.text.unwrap_or_default(),
            parsed.latex_simplified,
            parsed.confidence,
            Some(raw),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn provider(base_url: &str, with_credentials: bool) -> MathpixOcrProvider {
        let config = MathpixConfig {
            app_id: with_credentials.then(|| "app".to_string()),
            app_key: with_credentials.then(|| "secret".to_string()),
            base_url: base_url.to_string(),
        };
        MathpixOcrProvider::new(&config, reqwest::Client::new(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_successful_extraction() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/text")
            .match_header("app_id", "app")
            .match_header("app_key", "secret")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "formats": ["text", "latex_simplified"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text":"2x + 5 = 15","latex_simplified":"2 x+5=15","confidence":0.98}"#)
            .create_async()
            .await;

        let result = provider(&server.url(), true).extract(b"img").await;

        mock.assert_async().await;
        assert!(result.is_success());
        assert_eq!(result.text(), "2x + 5 = 15");
        assert_eq!(result.markup(), Some("2 x+5=15"));
        assert_eq!(result.confidence(), Some(0.98));
        assert!(result.raw().is_some());
    }

    #[tokio::test]
    async fn test_http_error_becomes_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v3/text")
            .with_status(401)
            .with_body("invalid credentials")
            .create_async()
            .await;

        let result = provider(&server.url(), true).extract(b"img").await;

        assert!(!result.is_success());
        let error = result.error().unwrap();
        assert!(error.contains("401"), "unexpected error: {}", error);
        assert!(error.contains("invalid credentials"));
    }

    #[tokio::test]
    async fn test_error_field_in_ok_body_becomes_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v3/text")
            .with_status(200)
            .with_body(r#"{"error":"Image too small"}"#)
            .create_async()
            .await;

        let result = provider(&server.url(), true).extract(b"img").await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("Image too small"));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_failure() {
        // Nothing listens on port 9 (discard) in the test environment.
        let result = provider("http://127.0.0.1:9", true).extract(b"img").await;
        assert!(!result.is_success());
        assert!(result.error().is_some());
    }

    #[tokio::test]
    async fn test_unavailable_without_credentials() {
        let provider = provider("http://127.0.0.1:9", false);
        assert!(!provider.is_available());

        let result = provider.extract(b"img").await;
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Mathpix credentials not configured"));
    }
}
