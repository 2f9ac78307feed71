//! Solver configuration.
//!
//! Loaded once, either from the environment (with `.env` support) or from a
//! JSON file. Missing credentials are not an error: they only mark the
//! corresponding backend unavailable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::arbitration::OcrPreference;

pub const DEFAULT_MATHPIX_URL: &str = "https://api.mathpix.com";
pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com";
pub const DEFAULT_REASONING_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_REASONING_MODEL: &str = "gemini-1.5-pro";

/// Top-level configuration for a [`MathSolver`](crate::solver::MathSolver).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub mathpix: MathpixConfig,
    #[serde(default)]
    pub google_vision: GoogleVisionConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    /// Which OCR provider(s) to run and in what order.
    #[serde(default)]
    pub preference: OcrPreference,
    /// Allow switching between the OCR route and the vision-direct route
    /// when one of them fails.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    /// Per-call timeout applied to every outbound request.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathpixConfig {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default = "default_mathpix_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleVisionConfig {
    /// Plain API key, sent as `?key=`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Service-account key file; used when no API key is set.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base of an OpenAI-compatible API; `/chat/completions` is appended.
    #[serde(default = "default_reasoning_url")]
    pub base_url: String,
    #[serde(default = "default_reasoning_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_mathpix_url() -> String {
    DEFAULT_MATHPIX_URL.to_string()
}

fn default_vision_endpoint() -> String {
    DEFAULT_VISION_ENDPOINT.to_string()
}

fn default_reasoning_url() -> String {
    DEFAULT_REASONING_URL.to_string()
}

fn default_reasoning_model() -> String {
    DEFAULT_REASONING_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            mathpix: MathpixConfig::default(),
            google_vision: GoogleVisionConfig::default(),
            reasoning: ReasoningConfig::default(),
            preference: OcrPreference::default(),
            fallback_enabled: true,
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for MathpixConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_key: None,
            base_url: default_mathpix_url(),
        }
    }
}

impl Default for GoogleVisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            credentials_path: None,
            endpoint: default_vision_endpoint(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_reasoning_url(),
            model: default_reasoning_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl SolverConfig {
    /// Read configuration from environment variables, loading `.env` first
    /// if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: SolverConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        info!("Loaded solver config from {:?}", path);
        Ok(config)
    }

    /// Build a config from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = SolverConfig::default();

        config.mathpix.app_id = get("MATHPIX_APP_ID");
        config.mathpix.app_key = get("MATHPIX_APP_KEY");
        if let Some(url) = get("MATHPIX_BASE_URL") {
            config.mathpix.base_url = url;
        }

        config.google_vision.api_key = get("GOOGLE_VISION_API_KEY");
        config.google_vision.credentials_path =
            get("GOOGLE_CLOUD_VISION_CREDENTIALS_PATH").map(PathBuf::from);
        if let Some(endpoint) = get("GOOGLE_VISION_ENDPOINT") {
            config.google_vision.endpoint = endpoint;
        }

        config.reasoning.api_key = get("REASONING_API_KEY")
            .or_else(|| get("GEMINI_API_KEY"))
            .or_else(|| get("GOOGLE_API_KEY"));
        if let Some(url) = get("REASONING_BASE_URL") {
            config.reasoning.base_url = url;
        }
        if let Some(model) = get("REASONING_MODEL") {
            config.reasoning.model = model;
        }

        if let Some(pref) = get("MATH_SOLVER_OCR_PREFERENCE") {
            config.preference = pref
                .parse::<OcrPreference>()
                .with_context(|| format!("Unknown MATH_SOLVER_OCR_PREFERENCE: {}", pref))?;
        }
        if let Some(flag) = get("MATH_SOLVER_FALLBACK") {
            config.fallback_enabled = parse_bool(&flag)
                .with_context(|| format!("Invalid MATH_SOLVER_FALLBACK: {}", flag))?;
        }
        if let Some(secs) = get("MATH_SOLVER_TIMEOUT_SECS") {
            config.request_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid MATH_SOLVER_TIMEOUT_SECS: {}", secs))?;
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
