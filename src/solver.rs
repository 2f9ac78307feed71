//! Solve pipeline orchestrator.
//!
//! A solve walks a small state machine:
//!
//! ```text
//! Idle -> ExtractionInProgress -> ExtractionDone -> ReasoningInProgress -> ReasoningDone -> Assembled
//!   \_____________________________________________________________________________________/
//!                                   any state -> Errored
//! ```
//!
//! Text input enters at `ReasoningInProgress`; the vision-direct variant enters
//! there with the image. When fallback is enabled a failed OCR extraction
//! continues with vision-direct reasoning, and a failed vision-direct call
//! re-enters `ExtractionInProgress`; each route is tried at most once per
//! solve. Both terminal states produce a [`SolutionResult`] of the same shape.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::arbitration::{self, OcrPreference, Plan};
use crate::config::SolverConfig;
use crate::error::PipelineError;
use crate::ingest::ImageInput;
use crate::llm::LlmClient;
use crate::ocr::google_vision::GoogleVisionOcrProvider;
use crate::ocr::mathpix::MathpixOcrProvider;
use crate::ocr::{OcrProvider, OcrProviderKind, OcrResult};
use crate::parser::{self, UNSTRUCTURED_CONFIDENCE};
use crate::reasoning::{MathReasoner, ReasoningBackend};
use crate::schema::{
    Difficulty, ProblemInput, SolutionRequest, SolutionResult, SolveMethod, ERROR_PROBLEM_TYPE,
};

/// An OCR provider with the availability observed at construction.
#[derive(Clone)]
struct ProviderSlot {
    provider: Arc<dyn OcrProvider>,
    available: bool,
}

/// Entry point for solving math problems. Cheap to clone; clones share the
/// HTTP connection pool and nothing else.
#[derive(Clone)]
pub struct MathSolver {
    providers: Vec<ProviderSlot>,
    reasoning: Arc<dyn ReasoningBackend>,
    reasoning_available: bool,
    preference: OcrPreference,
    fallback_enabled: bool,
}

impl MathSolver {
    /// Solver with no OCR providers. Add them with [`MathSolver::with_provider`].
    pub fn new(reasoning: Arc<dyn ReasoningBackend>) -> Self {
        let reasoning_available = reasoning.is_available();
        if !reasoning_available {
            warn!("Reasoning backend has no credentials, every solve will report an error");
        }

        Self {
            providers: Vec::new(),
            reasoning,
            reasoning_available,
            preference: OcrPreference::default(),
            fallback_enabled: true,
        }
    }

    /// Build the production solver (Mathpix, Google Vision, chat-completions
    /// reasoning). Missing credentials only disable the affected backend.
    pub fn from_config(config: &SolverConfig) -> Self {
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let reasoner = MathReasoner::new(LlmClient::new(&config.reasoning, client.clone(), timeout));

        Self::new(Arc::new(reasoner))
            .with_provider(Arc::new(MathpixOcrProvider::new(
                &config.mathpix,
                client.clone(),
                timeout,
            )))
            .with_provider(Arc::new(GoogleVisionOcrProvider::new(
                &config.google_vision,
                client,
                timeout,
            )))
            .with_preference(config.preference)
            .with_fallback(config.fallback_enabled)
    }

    /// Build from environment variables (and `.env`).
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_config(&SolverConfig::from_env()?))
    }

    /// Register an OCR provider, replacing any provider of the same kind.
    pub fn with_provider(mut self, provider: Arc<dyn OcrProvider>) -> Self {
        let available = provider.is_available();
        info!("OCR provider {} available: {}", provider.kind(), available);

        self.providers.retain(|slot| slot.provider.kind() != provider.kind());
        self.providers.push(ProviderSlot {
            provider,
            available,
        });
        self
    }

    pub fn with_preference(mut self, preference: OcrPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Availability of a provider as cached at construction.
    pub fn is_available(&self, kind: OcrProviderKind) -> bool {
        self.slot(kind).map(|s| s.available).unwrap_or(false)
    }

    /// Solve a problem from an image using the configured preference.
    pub async fn solve(&self, image: impl Into<ImageInput>) -> SolutionResult {
        self.solve_request(
            SolutionRequest::image(image)
                .with_preference(self.preference)
                .with_fallback(self.fallback_enabled),
        )
        .await
    }

    /// Blocking variant of [`MathSolver::solve`]. Called from within an async
    /// runtime it returns an error result instead of blocking.
    pub fn solve_sync(&self, image: impl Into<ImageInput>) -> SolutionResult {
        let started = Instant::now();
        let runtime = if tokio::runtime::Handle::try_current().is_ok() {
            Err(PipelineError::Runtime(
                "solve_sync called inside an async runtime, use solve".to_string(),
            ))
        } else {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| PipelineError::Runtime(e.to_string()))
        };

        match runtime {
            Ok(runtime) => runtime.block_on(self.solve(image)),
            Err(error) => {
                error!("Math problem solving failed: {}", error);
                error_result(&error, String::new(), None, started.elapsed())
            }
        }
    }

    /// Solve a problem given as text, bypassing OCR.
    pub async fn solve_from_text(&self, text: &str) -> SolutionResult {
        self.solve_request(SolutionRequest::text(text).with_fallback(self.fallback_enabled))
            .await
    }

    /// Let the reasoning backend read the image itself; fall back to the OCR
    /// pipeline if that call fails and fallback is enabled.
    pub async fn solve_from_image_direct(&self, image: impl Into<ImageInput>) -> SolutionResult {
        let start = Start::VisionDirect(image.into());
        self.run(start, self.preference, self.fallback_enabled)
            .instrument(info_span!("solve", id = %Uuid::new_v4(), route = "vision_direct"))
            .await
    }

    pub async fn solve_request(&self, request: SolutionRequest) -> SolutionResult {
        let start = match request.input {
            ProblemInput::Image(image) => Start::Image(image),
            ProblemInput::Text(text) => Start::Text(text),
        };
        self.run(start, request.preference, request.fallback_enabled)
            .instrument(info_span!("solve", id = %Uuid::new_v4()))
            .await
    }

    /// Solve independent problems concurrently. Results keep input order.
    pub async fn solve_batch(&self, requests: Vec<SolutionRequest>) -> Vec<SolutionResult> {
        info!("Solving batch of {} problems", requests.len());
        join_all(requests.into_iter().map(|r| self.solve_request(r))).await
    }

    async fn run(
        &self,
        start: Start,
        preference: OcrPreference,
        fallback_enabled: bool,
    ) -> SolutionResult {
        let started = Instant::now();
        let mut traversal = Traversal {
            solver: self,
            preference,
            fallback_enabled,
            ocr_tried: false,
            vision_tried: false,
        };

        let mut state = SolveState::Idle(start);
        loop {
            state = match state {
                SolveState::Assembled(mut result) => {
                    result.processing_time = started.elapsed();
                    info!(
                        "Solved via {} (confidence {:.2}) in {:?}",
                        result.method_used, result.confidence_score, result.processing_time
                    );
                    return result;
                }
                SolveState::Errored {
                    error,
                    extracted_text,
                    extracted_latex,
                } => {
                    error!("Math problem solving failed: {}", error);
                    return error_result(&error, extracted_text, extracted_latex, started.elapsed());
                }
                other => traversal.step(other).await,
            };
        }
    }

    /// Run the providers the preference calls for and arbitrate.
    async fn extract(&self, preference: OcrPreference, image: &[u8]) -> Option<OcrResult> {
        let attempts = match arbitration::plan(preference, |kind| self.is_available(kind)) {
            Plan::Skip => {
                warn!("No OCR provider available for {:?}", preference);
                Vec::new()
            }
            Plan::Sequential { first, then } => {
                let primary = self.run_provider(first, image).await;
                match then {
                    Some(next) if !primary.is_success() => {
                        info!("{} failed, falling back to {}", first, next);
                        let secondary = self.run_provider(next, image).await;
                        vec![primary, secondary]
                    }
                    _ => vec![primary],
                }
            }
            Plan::All(kinds) => {
                join_all(kinds.into_iter().map(|k| self.run_provider(k, image))).await
            }
        };

        arbitration::select(attempts)
    }

    async fn run_provider(&self, kind: OcrProviderKind, image: &[u8]) -> OcrResult {
        let Some(slot) = self.slot(kind) else {
            return OcrResult::failure(kind, format!("{} provider not registered", kind));
        };

        let result = slot.provider.extract(image).await;
        if result.is_success() {
            info!(
                "OCR successful using {} (confidence {:?})",
                kind,
                result.confidence()
            );
        } else {
            warn!("OCR with {} failed: {}", kind, result.error().unwrap_or("unknown error"));
        }
        result
    }

    fn slot(&self, kind: OcrProviderKind) -> Option<&ProviderSlot> {
        self.providers.iter().find(|s| s.provider.kind() == kind)
    }
}

// ============================================================================
// State machine
// ============================================================================

enum Start {
    Image(ImageInput),
    Text(String),
    VisionDirect(ImageInput),
}

enum ReasoningJob {
    Text {
        text: String,
        markup: Option<String>,
        ocr_confidence: Option<f64>,
        method: SolveMethod,
    },
    Image {
        image: Vec<u8>,
    },
}

impl ReasoningJob {
    fn extracted(&self) -> (String, Option<String>) {
        match self {
            Self::Text { text, markup, .. } => (text.clone(), markup.clone()),
            Self::Image { .. } => (String::new(), None),
        }
    }
}

enum SolveState {
    Idle(Start),
    ExtractionInProgress {
        image: Vec<u8>,
    },
    ExtractionDone {
        image: Vec<u8>,
        ocr: Option<OcrResult>,
    },
    ReasoningInProgress(ReasoningJob),
    ReasoningDone {
        job: ReasoningJob,
        raw: String,
    },
    Assembled(SolutionResult),
    Errored {
        error: PipelineError,
        extracted_text: String,
        extracted_latex: Option<String>,
    },
}

impl SolveState {
    fn errored(error: PipelineError) -> Self {
        Self::Errored {
            error,
            extracted_text: String::new(),
            extracted_latex: None,
        }
    }
}

/// Per-solve bookkeeping. Lives only for one `run`.
struct Traversal<'a> {
    solver: &'a MathSolver,
    preference: OcrPreference,
    fallback_enabled: bool,
    ocr_tried: bool,
    vision_tried: bool,
}

impl Traversal<'_> {
    async fn step(&mut self, state: SolveState) -> SolveState {
        match state {
            SolveState::Idle(Start::Text(text)) => {
                if text.trim().is_empty() {
                    return SolveState::errored(PipelineError::Ingestion(
                        "problem text is empty".to_string(),
                    ));
                }
                SolveState::ReasoningInProgress(ReasoningJob::Text {
                    text,
                    markup: None,
                    ocr_confidence: None,
                    method: SolveMethod::Text,
                })
            }
            SolveState::Idle(Start::Image(input)) => match input.load() {
                Ok(image) => SolveState::ExtractionInProgress { image },
                Err(e) => SolveState::errored(e),
            },
            SolveState::Idle(Start::VisionDirect(input)) => match input.load() {
                Ok(image) => {
                    self.vision_tried = true;
                    SolveState::ReasoningInProgress(ReasoningJob::Image { image })
                }
                Err(e) => SolveState::errored(e),
            },

            SolveState::ExtractionInProgress { image } => {
                self.ocr_tried = true;
                let ocr = self.solver.extract(self.preference, &image).await;
                SolveState::ExtractionDone { image, ocr }
            }

            SolveState::ExtractionDone { image, ocr } => match ocr {
                Some(result) if result.is_success() => {
                    info!(
                        "Extracted text: {}",
                        result.text().chars().take(100).collect::<String>()
                    );
                    SolveState::ReasoningInProgress(ReasoningJob::Text {
                        text: result.text().to_string(),
                        markup: result.markup().map(str::to_string),
                        ocr_confidence: result.confidence(),
                        method: SolveMethod::Ocr(result.provider()),
                    })
                }
                failed => {
                    let reason = failed
                        .as_ref()
                        .and_then(|r| r.error())
                        .unwrap_or("No OCR providers available")
                        .to_string();

                    if self.fallback_enabled && !self.vision_tried {
                        warn!("OCR failed ({}), asking the reasoning backend to read the image", reason);
                        self.vision_tried = true;
                        SolveState::ReasoningInProgress(ReasoningJob::Image { image })
                    } else {
                        SolveState::errored(PipelineError::AllProvidersFailed(reason))
                    }
                }
            },

            SolveState::ReasoningInProgress(job) => {
                if !self.solver.reasoning_available {
                    let (extracted_text, extracted_latex) = job.extracted();
                    return SolveState::Errored {
                        error: PipelineError::ProviderUnavailable("reasoning backend".to_string()),
                        extracted_text,
                        extracted_latex,
                    };
                }

                let outcome = match &job {
                    ReasoningJob::Text { text, markup, .. } => {
                        self.solver.reasoning.solve(text, markup.as_deref()).await
                    }
                    ReasoningJob::Image { image } => {
                        self.solver.reasoning.solve_from_image(image).await
                    }
                };

                match outcome {
                    Ok(raw) => SolveState::ReasoningDone { job, raw },
                    Err(e) => {
                        let message = format!("{:#}", e);
                        match job {
                            ReasoningJob::Image { image }
                                if self.fallback_enabled && !self.ocr_tried =>
                            {
                                warn!("Vision-direct solve failed ({}), retrying through OCR", message);
                                SolveState::ExtractionInProgress { image }
                            }
                            job => {
                                let (extracted_text, extracted_latex) = job.extracted();
                                SolveState::Errored {
                                    error: PipelineError::ReasoningTransport(message),
                                    extracted_text,
                                    extracted_latex,
                                }
                            }
                        }
                    }
                }
            }

            SolveState::ReasoningDone { job, raw } => SolveState::Assembled(assemble(job, &raw)),

            terminal @ (SolveState::Assembled(_) | SolveState::Errored { .. }) => terminal,
        }
    }
}

/// Build the result from a reasoning response. Elapsed time is set by the
/// caller.
fn assemble(job: ReasoningJob, raw: &str) -> SolutionResult {
    let parsed = parser::parse(raw);
    let fields = parsed.fields;

    let (extracted_text, extracted_latex, method, ocr_confidence) = match job {
        ReasoningJob::Text {
            text,
            markup,
            ocr_confidence,
            method,
        } => (text, markup, method, ocr_confidence),
        ReasoningJob::Image { .. } => (
            fields.extracted_problem.clone().unwrap_or_default(),
            None,
            SolveMethod::VisionDirect,
            None,
        ),
    };

    // 0.0 is reserved for error results.
    let confidence_score = fields
        .confidence
        .filter(|c| *c > 0.0)
        .or(ocr_confidence.filter(|c| *c > 0.0))
        .unwrap_or(UNSTRUCTURED_CONFIDENCE);

    SolutionResult {
        extracted_text,
        extracted_latex,
        problem_type: fields.problem_type,
        difficulty: fields.difficulty,
        solution_steps: fields.solution_steps,
        final_answer: fields.final_answer,
        explanation: fields.explanation,
        verification: fields.verification,
        study_tips: fields.study_tips,
        related_concepts: fields.related_concepts,
        method_used: method,
        confidence_score,
        processing_time: Duration::ZERO,
    }
}

fn error_result(
    error: &PipelineError,
    extracted_text: String,
    extracted_latex: Option<String>,
    elapsed: Duration,
) -> SolutionResult {
    SolutionResult {
        extracted_text,
        extracted_latex,
        problem_type: ERROR_PROBLEM_TYPE.to_string(),
        difficulty: Difficulty::default(),
        solution_steps: vec![format!("Error occurred: {}", error)],
        final_answer: "Unable to solve".to_string(),
        explanation: format!("An error occurred while processing the problem: {}", error),
        verification: "Unable to verify".to_string(),
        study_tips: vec![
            "Please try with a clearer image".to_string(),
            "Ensure the image contains mathematical content".to_string(),
        ],
        related_concepts: Vec::new(),
        method_used: SolveMethod::Failed,
        confidence_score: 0.0,
        processing_time: elapsed,
    }
}
