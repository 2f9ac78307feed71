//! Generative reasoning: turns extracted problem text (or the image itself)
//! into a step-by-step solution under a fixed JSON output contract.

use anyhow::Result;
use tracing::{debug, info};

use crate::llm::{LlmClient, Message};

const SYSTEM_PROMPT: &str = "You are an expert mathematics tutor helping students prepare for \
exams. You explain every step clearly and always answer with a single JSON object.";

/// Output contract shared by both prompts.
const OUTPUT_SCHEMA: &str = r#"Respond with ONLY a valid JSON object of this shape:
{
  "problem_type": "algebra|geometry|calculus|arithmetic|trigonometry|statistics|other",
  "difficulty": "elementary|middle_school|high_school|college|advanced",
  "solution_steps": ["Step 1: ...", "Step 2: ..."],
  "final_answer": "The final answer, with units if applicable",
  "explanation": "Detailed explanation of the solution process",
  "verification": "How to check the answer, plus alternative methods",
  "study_tips": ["Tip for similar problems", "..."],
  "related_concepts": ["Concept", "..."],
  "exam_tips": ["Common mistake to avoid", "..."],
  "confidence": 0.95
}"#;

/// Reasoning backend contract.
///
/// Only transport-level failures are returned as `Err`; whatever text the
/// backend produced, however malformed, is returned as `Ok`.
#[async_trait::async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Whether credentials are present. Local check only.
    fn is_available(&self) -> bool;

    async fn solve(&self, text: &str, markup: Option<&str>) -> Result<String>;

    /// Extract and solve in one pass from the image.
    async fn solve_from_image(&self, image: &[u8]) -> Result<String>;
}

/// Chat-completions backed reasoner.
#[derive(Clone)]
pub struct MathReasoner {
    client: LlmClient,
}

impl MathReasoner {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for MathReasoner {
    fn is_available(&self) -> bool {
        self.client.has_credentials()
    }

    async fn solve(&self, text: &str, markup: Option<&str>) -> Result<String> {
        info!(
            "Solving extracted problem ({} chars, latex={}) with {}",
            text.len(),
            markup.is_some(),
            self.client.model()
        );

        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(text_prompt(text, markup)),
        ];
        let raw = self.client.chat(messages).await?;

        debug!("Raw reasoning response length: {} chars", raw.len());
        Ok(raw)
    }

    async fn solve_from_image(&self, image: &[u8]) -> Result<String> {
        info!(
            "Solving directly from image ({} bytes) with {}",
            image.len(),
            self.client.model()
        );

        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user_with_image(vision_prompt(), image),
        ];
        let raw = self.client.chat(messages).await?;

        debug!("Raw vision reasoning response length: {} chars", raw.len());
        Ok(raw)
    }
}

/// Prompt for a problem whose text has already been extracted.
pub fn text_prompt(text: &str, markup: Option<&str>) -> String {
    let mut prompt = format!(
        "Analyze and solve the following math problem for a student preparing for an exam.\n\n\
         EXTRACTED MATH CONTENT:\n{}\n",
        text.trim()
    );

    if let Some(latex) = markup.filter(|m| !m.trim().is_empty()) {
        prompt.push_str(&format!("\nLATEX REPRESENTATION:\n{}\n", latex.trim()));
    }

    prompt.push_str(
        "\nThe content may contain OCR mistakes; reinterpret it as the most plausible \
         math problem.\n\n\
         Work through: the problem type and difficulty, a complete step-by-step solution \
         showing all work, the clearly marked final answer, a verification of the answer, \
         key concepts and study tips, and common exam mistakes.\n\n",
    );
    prompt.push_str(OUTPUT_SCHEMA);
    prompt
}

/// Prompt asking the backend to read the problem off the image and solve it.
pub fn vision_prompt() -> String {
    format!(
        "The attached image contains a math problem. Read every expression, equation and \
         diagram in it, then solve the problem for a student preparing for an exam.\n\n\
         Include an additional field \"extracted_problem\" holding the problem exactly as it \
         appears in the image. If the image holds no clear math problem, set \
         \"extracted_problem\" to \"No clear mathematical problem detected\" and use the \
         explanation to describe what a good problem photo looks like.\n\n{}",
        OUTPUT_SCHEMA
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReasoningConfig;
    use std::time::Duration;

    #[test]
    fn test_text_prompt_embeds_content() {
        let prompt = text_prompt("  2x + 5 = 15 ", Some("2x+5=15"));
        assert!(prompt.contains("EXTRACTED MATH CONTENT:\n2x + 5 = 15\n"));
        assert!(prompt.contains("LATEX REPRESENTATION:\n2x+5=15"));
        assert!(prompt.contains("\"final_answer\""));
    }

    #[test]
    fn test_text_prompt_omits_empty_markup() {
        let prompt = text_prompt("1+1", Some(" "));
        assert!(!prompt.contains("LATEX REPRESENTATION"));
    }

    #[test]
    fn test_vision_prompt_asks_for_extraction() {
        let prompt = vision_prompt();
        assert!(prompt.contains("\"extracted_problem\""));
        assert!(prompt.contains("\"solution_steps\""));
    }

    #[tokio::test]
    async fn test_solve_sends_prompt_to_backend() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("EXTRACTED MATH CONTENT".to_string()))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"answer"}}]}"#)
            .create_async()
            .await;

        let config = ReasoningConfig {
            api_key: Some("k".to_string()),
            base_url: server.url(),
            ..ReasoningConfig::default()
        };
        let reasoner = MathReasoner::new(LlmClient::new(
            &config,
            reqwest::Client::new(),
            Duration::from_secs(5),
        ));

        assert!(reasoner.is_available());
        let raw = reasoner.solve("1+1", None).await.unwrap();
        mock.assert_async().await;
        assert_eq!(raw, "answer");
    }
}
