//! Content-integrity check: an LLM compares the draft against the source
//! document and reports fabricated claims and AI-sounding boilerplate in one
//! call. Conservative by construction — the score is the minimum of the two
//! sub-scores, and any fabrication fails the draft regardless of score.

use async_trait::async_trait;
use serde::Deserialize;

use crate::agents::optimizer::OptimizedDraft;
use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::pipeline::{ValidationContext, Validator, ValidatorReport};

const INTEGRITY_SYSTEM: &str = r#"You are a resume integrity checker. Compare an optimized resume draft against the candidate's original source resume.

Report two things:
1. fabrications: every claim in the draft that is NOT supported by the source — invented employers, titles, dates, degrees, skills, or metrics that appear nowhere in the source. Rephrasing and reordering are fine; new facts are not.
2. ai_tells: phrases that read as generated boilerplate ("results-driven professional", "proven track record", "leveraging synergies").

Score each dimension from 0.0 (hopeless) to 1.0 (clean).
Respond with a single JSON object and nothing else:
{"fabrication_score": 0.0, "authenticity_score": 0.0, "fabrications": ["..."], "ai_tells": ["..."]}"#;

const INTEGRITY_PROMPT_TEMPLATE: &str = r#"SOURCE RESUME:
{source}

OPTIMIZED DRAFT:
{draft}

Check the draft's integrity."#;

/// The model's verdict for one draft.
#[derive(Debug, Deserialize)]
struct IntegrityVerdict {
    fabrication_score: f32,
    authenticity_score: f32,
    #[serde(default)]
    fabrications: Vec<String>,
    #[serde(default)]
    ai_tells: Vec<String>,
}

pub struct ContentIntegrity {
    llm: LlmClient,
    threshold: f32,
}

impl ContentIntegrity {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm,
            threshold: 0.8,
        }
    }
}

#[async_trait]
impl Validator for ContentIntegrity {
    fn name(&self) -> &'static str {
        "ContentIntegrity"
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    async fn validate(
        &self,
        draft: &OptimizedDraft,
        ctx: &ValidationContext<'_>,
    ) -> Result<ValidatorReport, AppError> {
        let prompt = INTEGRITY_PROMPT_TEMPLATE
            .replace("{source}", ctx.source_text)
            .replace("{draft}", &draft.content);

        let verdict: IntegrityVerdict = self
            .llm
            .call_json(&prompt, INTEGRITY_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Integrity check failed: {e}")))?;

        Ok(report_from_verdict(verdict, self.threshold))
    }
}

fn report_from_verdict(verdict: IntegrityVerdict, threshold: f32) -> ValidatorReport {
    let score = verdict.fabrication_score.min(verdict.authenticity_score);
    let passed = score >= threshold && verdict.fabrications.is_empty();

    let mut issues: Vec<String> = verdict
        .fabrications
        .iter()
        .map(|f| format!("Unsupported claim: {f}"))
        .collect();
    issues.extend(verdict.ai_tells.iter().map(|t| format!("Reads as AI boilerplate: {t}")));

    ValidatorReport {
        name: "ContentIntegrity".to_string(),
        passed,
        score,
        threshold,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_verdict_passes() {
        let report = report_from_verdict(
            IntegrityVerdict {
                fabrication_score: 0.95,
                authenticity_score: 0.9,
                fabrications: vec![],
                ai_tells: vec![],
            },
            0.8,
        );
        assert!(report.passed);
        assert!((report.score - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_score_is_the_minimum_of_both_dimensions() {
        let report = report_from_verdict(
            IntegrityVerdict {
                fabrication_score: 0.95,
                authenticity_score: 0.4,
                fabrications: vec![],
                ai_tells: vec!["proven track record".to_string()],
            },
            0.8,
        );
        assert!(!report.passed);
        assert!((report.score - 0.4).abs() < f32::EPSILON);
        assert!(report.issues[0].contains("proven track record"));
    }

    #[test]
    fn test_any_fabrication_fails_even_with_high_score() {
        let report = report_from_verdict(
            IntegrityVerdict {
                fabrication_score: 0.9,
                authenticity_score: 0.9,
                fabrications: vec!["claims a PhD the source does not mention".to_string()],
                ai_tells: vec![],
            },
            0.8,
        );
        assert!(!report.passed);
        assert!(report.issues[0].contains("PhD"));
    }

    #[test]
    fn test_verdict_deserializes_with_missing_lists() {
        let json = r#"{"fabrication_score": 1.0, "authenticity_score": 0.85}"#;
        let verdict: IntegrityVerdict = serde_json::from_str(json).unwrap();
        assert!(verdict.fabrications.is_empty());
        assert!(verdict.ai_tells.is_empty());
    }
}
