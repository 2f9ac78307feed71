//! Solution request/result types.

use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

use crate::arbitration::OcrPreference;
use crate::ingest::ImageInput;
use crate::ocr::OcrProviderKind;

/// Difficulty levels the reasoning backend may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Elementary,
    MiddleSchool,
    /// Also the level assumed for unrecognized input.
    #[default]
    HighSchool,
    College,
    Advanced,
}

impl Difficulty {
    /// Map a backend-supplied label; unknown labels become `HighSchool`.
    /// Case, surrounding whitespace, spaces and hyphens are ignored.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "elementary" => Self::Elementary,
            "middle_school" => Self::MiddleSchool,
            "high_school" => Self::HighSchool,
            "college" => Self::College,
            "advanced" => Self::Advanced,
            _ => Self::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elementary => "elementary",
            Self::MiddleSchool => "middle_school",
            Self::HighSchool => "high_school",
            Self::College => "college",
            Self::Advanced => "advanced",
        }
    }
}

/// What produced the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMethod {
    /// Problem text supplied by the caller.
    Text,
    /// Discrete OCR by the given provider, then text reasoning.
    Ocr(OcrProviderKind),
    /// The reasoning backend read the image itself.
    VisionDirect,
    /// No answer could be produced.
    Failed,
}

impl SolveMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "text_reasoning",
            Self::Ocr(OcrProviderKind::Mathpix) => "mathpix_ocr_reasoning",
            Self::Ocr(OcrProviderKind::GoogleVision) => "google_vision_ocr_reasoning",
            Self::VisionDirect => "vision_direct",
            Self::Failed => "error",
        }
    }
}

impl std::fmt::Display for SolveMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for SolveMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// The problem to solve.
#[derive(Debug, Clone)]
pub enum ProblemInput {
    Image(ImageInput),
    Text(String),
}

/// One solve call with its routing options.
#[derive(Debug, Clone)]
pub struct SolutionRequest {
    pub input: ProblemInput,
    pub preference: OcrPreference,
    pub fallback_enabled: bool,
}

impl SolutionRequest {
    pub fn image(input: impl Into<ImageInput>) -> Self {
        Self {
            input: ProblemInput::Image(input.into()),
            preference: OcrPreference::default(),
            fallback_enabled: true,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            input: ProblemInput::Text(text.into()),
            preference: OcrPreference::default(),
            fallback_enabled: true,
        }
    }

    pub fn with_preference(mut self, preference: OcrPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }
}

/// Uniform solve result. Produced on every path, including total failure
/// (`problem_type == "error"`, `confidence_score == 0.0`).
#[derive(Debug, Clone, Serialize)]
pub struct SolutionResult {
    pub extracted_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_latex: Option<String>,
    pub problem_type: String,
    pub difficulty: Difficulty,
    pub solution_steps: Vec<String>,
    pub final_answer: String,
    pub explanation: String,
    pub verification: String,
    pub study_tips: Vec<String>,
    pub related_concepts: Vec<String>,
    pub method_used: SolveMethod,
    pub confidence_score: f64,
    pub processing_time: Duration,
}

impl SolutionResult {
    pub fn is_error(&self) -> bool {
        self.problem_type == ERROR_PROBLEM_TYPE
    }
}

pub const ERROR_PROBLEM_TYPE: &str = "error";
