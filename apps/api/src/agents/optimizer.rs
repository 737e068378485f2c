//! Optimization agent — produces a candidate resume draft for one iteration
//! of the generate→validate loop. Refinement iterations carry the previous
//! iteration's failing validator feedback into the prompt.

use serde::{Deserialize, Serialize};

use crate::agents::job_parser::ParsedJob;
use crate::agents::prompts::{FEEDBACK_HEADER, OPTIMIZE_PROMPT_TEMPLATE, OPTIMIZE_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::LlmClient;

/// A candidate output document. `content` is the full Markdown draft the
/// validation pipeline judges and the renderer turns into the final artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedDraft {
    pub content: String,
    #[serde(default)]
    pub keywords_used: Vec<String>,
}

/// Generates one candidate draft. `prior_feedback` is the aggregated failing
/// validator output of the previous iteration, absent on the first pass.
pub async fn generate_draft(
    llm: &LlmClient,
    source_text: &str,
    job: &ParsedJob,
    prior_feedback: Option<&str>,
) -> Result<OptimizedDraft, AppError> {
    let prompt = build_prompt(source_text, job, prior_feedback)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize job for prompt: {e}")))?;

    let draft: OptimizedDraft = llm
        .call_json(&prompt, OPTIMIZE_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Draft generation failed: {e}")))?;

    if draft.content.trim().is_empty() {
        return Err(AppError::Llm("Optimizer returned an empty draft".to_string()));
    }
    Ok(draft)
}

fn build_prompt(
    source_text: &str,
    job: &ParsedJob,
    prior_feedback: Option<&str>,
) -> Result<String, serde_json::Error> {
    let job_json = serde_json::to_string_pretty(job)?;
    let feedback_block = match prior_feedback {
        Some(feedback) if !feedback.trim().is_empty() => {
            format!("\n{FEEDBACK_HEADER}\n{feedback}\n")
        }
        _ => String::new(),
    };
    Ok(OPTIMIZE_PROMPT_TEMPLATE
        .replace("{source}", source_text)
        .replace("{job_json}", &job_json)
        .replace("{feedback_block}", &feedback_block))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ParsedJob {
        ParsedJob {
            title: "Senior Rust Engineer".to_string(),
            company: "Acme Robotics".to_string(),
            location: "Remote".to_string(),
            requirements: vec!["Rust".to_string()],
            responsibilities: vec![],
            keywords: vec!["tokio".to_string(), "Postgres".to_string()],
            description: String::new(),
        }
    }

    #[test]
    fn test_first_iteration_prompt_has_no_feedback_block() {
        let prompt = build_prompt("my resume", &job(), None).unwrap();
        assert!(prompt.contains("my resume"));
        assert!(prompt.contains("Senior Rust Engineer"));
        assert!(!prompt.contains(FEEDBACK_HEADER));
    }

    #[test]
    fn test_refinement_prompt_carries_feedback() {
        let prompt =
            build_prompt("my resume", &job(), Some("KeywordCoverage: missing tokio")).unwrap();
        assert!(prompt.contains(FEEDBACK_HEADER));
        assert!(prompt.contains("missing tokio"));
    }

    #[test]
    fn test_blank_feedback_is_treated_as_absent() {
        let prompt = build_prompt("my resume", &job(), Some("   ")).unwrap();
        assert!(!prompt.contains(FEEDBACK_HEADER));
    }

    #[test]
    fn test_draft_deserializes_without_keywords_used() {
        let json = r##"{"content": "# Jane Doe"}"##;
        let draft: OptimizedDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.content, "# Jane Doe");
        assert!(draft.keywords_used.is_empty());
    }
}
