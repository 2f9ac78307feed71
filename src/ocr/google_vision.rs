//! Google Cloud Vision OCR provider (general text detection).

use super::google_auth::{Authorization, GoogleCredentials};
use super::{OcrProvider, OcrProviderKind, OcrResult};
use crate::config::GoogleVisionConfig;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Vision reports no per-annotation confidence for TEXT_DETECTION.
const HEURISTIC_CONFIDENCE: f64 = 0.85;

pub struct GoogleVisionOcrProvider {
    credentials: Option<GoogleCredentials>,
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl GoogleVisionOcrProvider {
    pub fn new(config: &GoogleVisionConfig, client: reqwest::Client, timeout: Duration) -> Self {
        let credentials = GoogleCredentials::resolve(
            config.api_key.as_deref(),
            config.credentials_path.as_deref(),
        );
        if credentials.is_none() {
            warn!("Google Vision credentials not found, Google Vision OCR disabled");
        }

        Self {
            credentials,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            timeout,
            client,
        }
    }
}

// ── Vision API response types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for GoogleVisionOcrProvider {
    fn kind(&self) -> OcrProviderKind {
        OcrProviderKind::GoogleVision
    }

    fn is_available(&self) -> bool {
        self.credentials.is_some()
    }

    async fn extract(&self, image: &[u8]) -> OcrResult {
        let Some(credentials) = &self.credentials else {
            return OcrResult::failure(self.kind(), "Google Vision credentials not configured");
        };

        match self.request(credentials, image).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Google Vision OCR error: {:#}", e);
                OcrResult::failure(self.kind(), format!("{:#}", e))
            }
        }
    }
}

impl GoogleVisionOcrProvider {
    async fn request(
        &self,
        credentials: &GoogleCredentials,
        image: &[u8],
    ) -> anyhow::Result<OcrResult> {
        let body = serde_json::json!({
            "requests": [{
                "image": { "content": BASE64.encode(image) },
                "features": [{ "type": "TEXT_DETECTION" }]
            }]
        });

        info!("GoogleVisionOcrProvider: calling annotate API ({} bytes)", image.len());

        let url = format!("{}/v1/images:annotate", self.endpoint);
        let request = match credentials.authorize(&self.client, self.timeout).await? {
            Authorization::Key(key) => self.client.post(url).query(&[("key", key)]),
            Authorization::Bearer(token) => self.client.post(url).bearer_auth(token),
        };

        let resp = request.timeout(self.timeout).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Google Vision API error ({}): {}", status, text);
        }

        let raw: serde_json::Value = resp.json().await?;
        let parsed: AnnotateResponse = serde_json::from_value(raw.clone())?;
        let Some(first) = parsed.responses.into_iter().next() else {
            anyhow::bail!("Google Vision returned no responses");
        };

        if let Some(status) = first.error.filter(|s| !s.message.is_empty()) {
            anyhow::bail!("Google Vision error: {}", status.message);
        }

        // The first annotation is the full detected text; the rest are words.
        let Some(full) = first.text_annotations.into_iter().next() else {
            anyhow::bail!("No text detected in image");
        };

        debug!(
            "GoogleVisionOcrProvider: detected {} chars",
            full.description.len()
        );

        Ok(OcrResult::success(
            OcrProviderKind::GoogleVision,
            full.description,
            None,
            Some(HEURISTIC_CONFIDENCE),
            Some(raw),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::google_auth::fixtures;
    use mockito::Matcher;
    use std::io::Write;

    fn provider(endpoint: &str) -> GoogleVisionOcrProvider {
        let config = GoogleVisionConfig {
            api_key: Some("vision-key".to_string()),
            credentials_path: None,
            endpoint: endpoint.to_string(),
        };
        GoogleVisionOcrProvider::new(&config, reqwest::Client::new(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_detects_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/images:annotate")
            .match_query(Matcher::UrlEncoded("key".into(), "vision-key".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"responses":[{"textAnnotations":[
                    {"description":"3x - 12 = 9"},
                    {"description":"3x"},
                    {"description":"12"}
                ]}]}"#,
            )
            .create_async()
            .await;

        let result = provider(&server.url()).extract(b"img").await;

        mock.assert_async().await;
        assert!(result.is_success());
        assert_eq!(result.text(), "3x - 12 = 9");
        assert_eq!(result.confidence(), Some(HEURISTIC_CONFIDENCE));
        assert_eq!(result.markup(), None);
    }

    #[tokio::test]
    async fn test_no_text_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/images:annotate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"responses":[{}]}"#)
            .create_async()
            .await;

        let result = provider(&server.url()).extract(b"img").await;
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("No text detected in image"));
    }

    #[tokio::test]
    async fn test_per_image_error_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/images:annotate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#)
            .create_async()
            .await;

        let result = provider(&server.url()).extract(b"img").await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("Bad image data."));
    }

    #[tokio::test]
    async fn test_server_error_is_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/images:annotate")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let result = provider(&server.url()).extract(b"img").await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_unavailable_without_credentials() {
        let config = GoogleVisionConfig::default();
        let provider =
            GoogleVisionOcrProvider::new(&config, reqwest::Client::new(), Duration::from_secs(5));
        assert!(!provider.is_available());
        assert!(!provider.extract(b"img").await.is_success());
    }

    fn service_account_provider(
        endpoint: &str,
        token_uri: &str,
        timeout: Duration,
    ) -> (GoogleVisionOcrProvider, tempfile::NamedTempFile) {
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        key_file
            .write_all(fixtures::key_json(token_uri).as_bytes())
            .unwrap();

        let config = GoogleVisionConfig {
            api_key: None,
            credentials_path: Some(key_file.path().to_path_buf()),
            endpoint: endpoint.to_string(),
        };
        let provider = GoogleVisionOcrProvider::new(&config, reqwest::Client::new(), timeout);
        (provider, key_file)
    }

    #[tokio::test]
    async fn test_service_account_uses_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"t"}"#)
            .create_async()
            .await;
        let annotate = server
            .mock("POST", "/v1/images:annotate")
            .match_header("authorization", "Bearer t")
            .with_status(200)
            .with_body(r#"{"responses":[{"textAnnotations":[{"description":"7 + 8"}]}]}"#)
            .create_async()
            .await;

        let (provider, _key_file) = service_account_provider(
            &server.url(),
            &format!("{}/token", server.url()),
            Duration::from_secs(5),
        );
        assert!(provider.is_available());

        let result = provider.extract(b"img").await;

        token.assert_async().await;
        annotate.assert_async().await;
        assert!(result.is_success());
        assert_eq!(result.text(), "7 + 8");
    }

    #[tokio::test]
    async fn test_stalled_token_endpoint_fails_within_timeout() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let (provider, _key_file) = service_account_provider(
            "http://127.0.0.1:9",
            &format!("http://{}/token", addr),
            Duration::from_secs(1),
        );
        let outcome =
            tokio::time::timeout(Duration::from_secs(5), provider.extract(b"img")).await;
        holder.abort();

        let result = outcome.expect("extract outlived the configured timeout");
        assert!(!result.is_success());
        assert!(result.error().is_some());
    }
}
