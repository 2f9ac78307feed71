//! Google credentials for the Cloud Vision API.
//!
//! Either a plain API key or a service-account key file. The key file is read
//! and parsed once at construction; a fresh OAuth2 access token is minted for
//! each call from a signed JWT.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const VISION_SCOPE: &str = "https://www.googleapis.com/auth/cloud-vision";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Clone)]
pub enum GoogleCredentials {
    ApiKey(String),
    ServiceAccount(ServiceAccountKey),
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// How a request is authorized.
pub enum Authorization {
    /// Append `?key=...` to the URL.
    Key(String),
    /// Send `Authorization: Bearer ...`.
    Bearer(String),
}

impl GoogleCredentials {
    /// Resolve credentials, preferring the API key. Returns `None` if neither
    /// is usable.
    pub fn resolve(api_key: Option<&str>, credentials_path: Option<&Path>) -> Option<Self> {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            return Some(Self::ApiKey(key.to_string()));
        }

        let path = credentials_path?;
        match ServiceAccountKey::load(path) {
            Ok(key) => Some(Self::ServiceAccount(key)),
            Err(e) => {
                warn!("Google Vision credentials unusable: {:#}", e);
                None
            }
        }
    }

    /// Produce request authorization. The token exchange, if any, is bounded
    /// by `timeout`.
    pub async fn authorize(
        &self,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Authorization> {
        match self {
            Self::ApiKey(key) => Ok(Authorization::Key(key.clone())),
            Self::ServiceAccount(sa) => Ok(Authorization::Bearer(
                sa.access_token(client, timeout).await?,
            )),
        }
    }
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key {:?}", path))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let key: Self =
            serde_json::from_str(json).context("Failed to parse service account key")?;
        // Fail early on a malformed key instead of on every call.
        jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Invalid RSA private key in service account JSON")?;
        Ok(key)
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// Mint a JWT and exchange it for an access token.
    async fn access_token(&self, client: &reqwest::Client, timeout: Duration) -> Result<String> {
        let now = now_secs()?;
        let claims = serde_json::json!({
            "iss": self.client_email,
            "scope": VISION_SCOPE,
            "aud": self.token_uri(),
            "iat": now,
            "exp": now + 3600,
        });

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .context("Invalid RSA private key in service account JSON")?;

        let jwt = jsonwebtoken::encode(&header, &claims, &encoding_key)
            .context("Failed to encode JWT")?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let resp: TokenResponse = client
            .post(self.token_uri())
            .timeout(timeout)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .context("Token exchange request failed")?
            .error_for_status()
            .context("Token exchange returned error")?
            .json()
            .await
            .context("Failed to parse token response")?;

        debug!("Minted Google access token for {}", self.client_email);
        Ok(resp.access_token)
    }
}

fn now_secs() -> Result<u64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .context("System clock before UNIX epoch")?
        .as_secs())
}
