//! Modular OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait and the uniform [`OcrResult`] so the
//! structured-math backend (Mathpix) and the general vision backend (Google
//! Cloud Vision) can be arbitrated without knowing how either talks HTTP.

pub mod google_auth;
pub mod google_vision;
pub mod mathpix;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Known provider identifiers, in declared priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrProviderKind {
    Mathpix,
    GoogleVision,
}

impl OcrProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mathpix => "mathpix",
            Self::GoogleVision => "google_vision",
        }
    }

    /// The provider tried when this one fails.
    pub fn other(&self) -> Self {
        match self {
            Self::Mathpix => Self::GoogleVision,
            Self::GoogleVision => Self::Mathpix,
        }
    }
}

impl FromStr for OcrProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mathpix" => Ok(Self::Mathpix),
            "google_vision" => Ok(Self::GoogleVision),
            other => anyhow::bail!("unknown OCR provider: {}", other),
        }
    }
}

impl std::fmt::Display for OcrProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform OCR result returned by every provider. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    provider: OcrProviderKind,
    success: bool,
    text: String,
    markup: Option<String>,
    confidence: Option<f64>,
    error: Option<String>,
    raw: Option<serde_json::Value>,
}

impl OcrResult {
    pub fn success(
        provider: OcrProviderKind,
        text: impl Into<String>,
        markup: Option<String>,
        confidence: Option<f64>,
        raw: Option<serde_json::Value>,
    ) -> Self {
        Self {
            provider,
            success: true,
            text: text.into(),
            markup: markup.filter(|m| !m.trim().is_empty()),
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
            error: None,
            raw,
        }
    }

    pub fn failure(provider: OcrProviderKind, error: impl Into<String>) -> Self {
        Self {
            provider,
            success: false,
            text: String::new(),
            markup: None,
            confidence: None,
            error: Some(error.into()),
            raw: None,
        }
    }

    pub fn provider(&self) -> OcrProviderKind {
        self.provider
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// LaTeX (or similar) rendering, when the backend produced one.
    pub fn markup(&self) -> Option<&str> {
        self.markup.as_deref()
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Backend payload as received, for diagnostics.
    pub fn raw(&self) -> Option<&serde_json::Value> {
        self.raw.as_ref()
    }
}

/// Async trait implemented by each OCR backend.
///
/// `extract` never fails: transport errors, timeouts and non-success
/// responses come back as `OcrResult::failure`.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn kind(&self) -> OcrProviderKind;

    /// Whether credentials are present. Local check only.
    fn is_available(&self) -> bool;

    async fn extract(&self, image: &[u8]) -> OcrResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_and_other() {
        for kind in [OcrProviderKind::Mathpix, OcrProviderKind::GoogleVision] {
            assert_eq!(kind.as_str().parse::<OcrProviderKind>().unwrap(), kind);
            assert_eq!(kind.other().other(), kind);
        }
        assert!("tesseract".parse::<OcrProviderKind>().is_err());
    }

    #[test]
    fn test_success_normalizes_fields() {
        let result = OcrResult::success(
            OcrProviderKind::Mathpix,
            "x^2",
            Some("  ".to_string()),
            Some(1.7),
            None,
        );
        assert!(result.is_success());
        assert_eq!(result.markup(), None);
        assert_eq!(result.confidence(), Some(1.0));
        assert_eq!(result.error(), None);
    }

    #[test]
    fn test_failure_carries_error() {
        let result = OcrResult::failure(OcrProviderKind::GoogleVision, "boom");
        assert!(!result.is_success());
        assert_eq!(result.text(), "");
        assert_eq!(result.error(), Some("boom"));
        assert_eq!(result.confidence(), None);
    }
}
