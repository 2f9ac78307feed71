//! Pipeline error taxonomy.
//!
//! None of these ever reach a caller as an `Err`: the orchestrator turns each
//! one into an error-shaped [`SolutionResult`](crate::schema::SolutionResult).
//! OCR transport failures never appear here at all, they are encoded into
//! [`OcrResult::error`](crate::ocr::OcrResult) at the provider boundary.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// The image could not be read or the problem text was empty.
    #[error("failed to load input: {0}")]
    Ingestion(String),

    /// A backend has no credentials configured (checked locally, no network).
    #[error("{0} is not configured")]
    ProviderUnavailable(String),

    /// Arbitration found no successful OCR result.
    #[error("OCR failed: {0}")]
    AllProvidersFailed(String),

    /// The reasoning backend could not be reached or answered with an error.
    #[error("reasoning backend error: {0}")]
    ReasoningTransport(String),

    /// A blocking entry point could not start its runtime.
    #[error("async runtime unavailable: {0}")]
    Runtime(String),
}
