//! Math problem solver: OCR arbitration plus generative reasoning.
//!
//! An image (or plain text) goes through one or more OCR providers, the best
//! extraction is sent to a reasoning backend under a fixed JSON contract, and
//! the answer is parsed into a [`SolutionResult`]. Every path, including
//! total failure, yields a result of the same shape.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! let solver = math_solver::MathSolver::from_env()?;
//! let result = solver.solve(std::path::PathBuf::from("problem.png")).await;
//! println!("{} ({})", result.final_answer, result.method_used);
//! # Ok(())
//! # }
//! ```

pub mod arbitration;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod ocr;
pub mod parser;
pub mod reasoning;
pub mod schema;
pub mod solver;
pub mod telemetry;

pub use arbitration::OcrPreference;
pub use config::SolverConfig;
pub use error::PipelineError;
pub use ingest::ImageInput;
pub use ocr::{OcrProvider, OcrProviderKind, OcrResult};
pub use reasoning::ReasoningBackend;
pub use schema::{Difficulty, ProblemInput, SolutionRequest, SolutionResult, SolveMethod};
pub use solver::MathSolver;
