//! End-to-end solves against mocked Mathpix, Google Vision and chat backends.

use math_solver::{MathSolver, OcrPreference, OcrProviderKind, SolveMethod, SolverConfig};
use mockito::{Matcher, Server};

fn config_for(server: &Server) -> SolverConfig {
    let mut config = SolverConfig::default();
    config.mathpix.app_id = Some("app".to_string());
    config.mathpix.app_key = Some("secret".to_string());
    config.mathpix.base_url = server.url();
    config.google_vision.api_key = Some("vision-key".to_string());
    config.google_vision.endpoint = server.url();
    config.reasoning.api_key = Some("llm-key".to_string());
    config.reasoning.base_url = server.url();
    config.request_timeout_secs = 5;
    config
}

fn chat_reply(content: &str) -> String {
    serde_json::json!({ "choices": [{ "message": { "content": content } }] }).to_string()
}

#[tokio::test]
async fn test_mathpix_failure_falls_back_to_vision() {
    let mut server = Server::new_async().await;

    let mathpix = server
        .mock("POST", "/v3/text")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;
    let vision = server
        .mock("POST", "/v1/images:annotate")
        .match_query(Matcher::UrlEncoded("key".into(), "vision-key".into()))
        .with_status(200)
        .with_body(r#"{"responses":[{"textAnnotations":[{"description":"3x - 12 = 9"}]}]}"#)
        .create_async()
        .await;
    let chat = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("3x - 12 = 9".to_string()))
        .with_status(200)
        .with_body(chat_reply(
            "```json\n{\"problem_type\":\"algebra\",\"final_answer\":\"x = 7\",\"confidence\":0.92}\n```",
        ))
        .create_async()
        .await;

    let solver = MathSolver::from_config(&config_for(&server));
    let result = solver.solve(b"fake image".to_vec()).await;

    mathpix.assert_async().await;
    vision.assert_async().await;
    chat.assert_async().await;

    assert_eq!(result.method_used, SolveMethod::Ocr(OcrProviderKind::GoogleVision));
    assert_eq!(result.extracted_text, "3x - 12 = 9");
    assert_eq!(result.final_answer, "x = 7");
    assert_eq!(result.confidence_score, 0.92);
}

#[tokio::test]
async fn test_run_both_prefers_mathpix_latex() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/v3/text")
        .with_status(200)
        .with_body(r#"{"text":"\\( x^2 = 4 \\)","latex_simplified":"x^{2}=4","confidence":0.99}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/v1/images:annotate")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"responses":[{"textAnnotations":[{"description":"x2 = 4"}]}]}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("LATEX REPRESENTATION".to_string()))
        .with_status(200)
        .with_body(chat_reply(
            r#"{"final_answer":"x = 2 or x = -2","difficulty":"middle_school","confidence":0.9}"#,
        ))
        .create_async()
        .await;

    let mut config = config_for(&server);
    config.preference = OcrPreference::RunBoth;
    let result = MathSolver::from_config(&config).solve(b"img".to_vec()).await;

    assert_eq!(result.method_used, SolveMethod::Ocr(OcrProviderKind::Mathpix));
    assert_eq!(result.extracted_latex.as_deref(), Some("x^{2}=4"));
    assert_eq!(result.final_answer, "x = 2 or x = -2");
}

#[tokio::test]
async fn test_total_failure_is_well_formed() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/v3/text")
        .with_status(401)
        .create_async()
        .await;
    server
        .mock("POST", "/v1/images:annotate")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;
    let chat = server
        .mock("POST", "/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let mut config = config_for(&server);
    config.fallback_enabled = false;
    let result = MathSolver::from_config(&config).solve(b"img".to_vec()).await;

    chat.assert_async().await;
    assert_eq!(result.problem_type, "error");
    assert_eq!(result.confidence_score, 0.0);
    assert_eq!(result.method_used, SolveMethod::Failed);
    assert!(!result.final_answer.is_empty());
    assert!(!result.study_tips.is_empty());
}

#[tokio::test]
async fn test_text_solve_without_ocr_credentials() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(chat_reply("x equals five."))
        .create_async()
        .await;

    let mut config = SolverConfig::default();
    config.reasoning.api_key = Some("llm-key".to_string());
    config.reasoning.base_url = server.url();

    let result = MathSolver::from_config(&config)
        .solve_from_text("Solve for x: 2x + 5 = 15")
        .await;

    assert_eq!(result.method_used, SolveMethod::Text);
    assert_eq!(result.confidence_score, 0.7);
    assert_eq!(result.solution_steps, vec!["x equals five.".to_string()]);
}

#[tokio::test]
async fn test_reasoning_outage_yields_error_result() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let mut config = SolverConfig::default();
    config.reasoning.api_key = Some("llm-key".to_string());
    config.reasoning.base_url = server.url();

    let result = MathSolver::from_config(&config)
        .solve_from_text("1 + 1")
        .await;

    assert!(result.is_error());
    assert_eq!(result.confidence_score, 0.0);
    assert!(result.explanation.contains("503"));
}
