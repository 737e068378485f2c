//! Validation pipeline — an ordered set of pluggable validators, each judging
//! a candidate draft independently and returning pass/fail + score + issues.
//! The pipeline aggregates per-iteration results into one decision; the
//! orchestrator appends that record to the run's feedback log and feeds the
//! failing reports back into the next refinement.

pub mod integrity;
pub mod keyword_coverage;
pub mod quantified_impact;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::job_parser::ParsedJob;
use crate::agents::optimizer::OptimizedDraft;
use crate::errors::AppError;
use crate::llm_client::LlmClient;

/// What every validator hands back for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorReport {
    pub name: String,
    pub passed: bool,
    pub score: f32,
    pub threshold: f32,
    pub issues: Vec<String>,
}

/// Read-only context shared by all validators for one iteration.
pub struct ValidationContext<'a> {
    pub source_text: &'a str,
    pub job: &'a ParsedJob,
}

/// A pluggable check. Implementations must be deterministic about their
/// verdict shape: `passed` must agree with `score >= threshold` unless the
/// validator documents a stricter rule.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn threshold(&self) -> f32;
    async fn validate(
        &self,
        draft: &OptimizedDraft,
        ctx: &ValidationContext<'_>,
    ) -> Result<ValidatorReport, AppError>;
}

/// Aggregated outcome of one generate→validate iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub passed: bool,
    pub results: Vec<ValidatorReport>,
}

impl IterationOutcome {
    pub fn from_results(results: Vec<ValidatorReport>) -> Self {
        IterationOutcome {
            passed: results.iter().all(|r| r.passed),
            results,
        }
    }

    pub fn failing_names(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Flattens the failing reports into the feedback text handed to the next
    /// `generating` call. Empty when the iteration passed.
    pub fn feedback_text(&self) -> String {
        let mut out = String::new();
        for report in self.results.iter().filter(|r| !r.passed) {
            out.push_str(&format!(
                "{} (score {:.2}, needs {:.2}):\n",
                report.name, report.score, report.threshold
            ));
            for issue in &report.issues {
                out.push_str(&format!("- {issue}\n"));
            }
        }
        out
    }
}

/// Ordered validator set. Runs every validator for every iteration — a draft
/// failing the first check still collects feedback from the rest, which is
/// what makes the refinement prompt useful.
pub struct ValidationPipeline {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidationPipeline {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }

    /// The production set, in order: cheap deterministic checks first, the
    /// LLM-backed integrity check last.
    pub fn standard(llm: LlmClient) -> Self {
        Self::new(vec![
            Arc::new(keyword_coverage::KeywordCoverage::default()),
            Arc::new(quantified_impact::QuantifiedImpact::default()),
            Arc::new(integrity::ContentIntegrity::new(llm)),
        ])
    }

    pub async fn run(
        &self,
        draft: &OptimizedDraft,
        ctx: &ValidationContext<'_>,
    ) -> Result<IterationOutcome, AppError> {
        let mut results = Vec::with_capacity(self.validators.len());
        for validator in &self.validators {
            let report = validator.validate(draft, ctx).await?;
            info!(
                "Validator {}: {} (score {:.2} / threshold {:.2})",
                report.name,
                if report.passed { "pass" } else { "fail" },
                report.score,
                report.threshold
            );
            results.push(report);
        }
        Ok(IterationOutcome::from_results(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, passed: bool, issues: &[&str]) -> ValidatorReport {
        ValidatorReport {
            name: name.to_string(),
            passed,
            score: if passed { 1.0 } else { 0.3 },
            threshold: 0.6,
            issues: issues.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_outcome_passes_only_when_all_validators_pass() {
        let outcome = IterationOutcome::from_results(vec![
            report("KeywordCoverage", true, &[]),
            report("QuantifiedImpact", true, &[]),
        ]);
        assert!(outcome.passed);

        let outcome = IterationOutcome::from_results(vec![
            report("KeywordCoverage", true, &[]),
            report("QuantifiedImpact", false, &["vague bullet"]),
        ]);
        assert!(!outcome.passed);
    }

    #[test]
    fn test_outcome_of_zero_validators_passes_vacuously() {
        let outcome = IterationOutcome::from_results(vec![]);
        assert!(outcome.passed);
        assert!(outcome.feedback_text().is_empty());
    }

    #[test]
    fn test_failing_names_preserve_pipeline_order() {
        let outcome = IterationOutcome::from_results(vec![
            report("KeywordCoverage", false, &["missing 'tokio'"]),
            report("QuantifiedImpact", true, &[]),
            report("ContentIntegrity", false, &["fabricated metric"]),
        ]);
        assert_eq!(
            outcome.failing_names(),
            vec!["KeywordCoverage", "ContentIntegrity"]
        );
    }

    #[test]
    fn test_feedback_text_contains_only_failing_reports() {
        let outcome = IterationOutcome::from_results(vec![
            report("KeywordCoverage", false, &["missing 'tokio'", "missing 'sqlx'"]),
            report("QuantifiedImpact", true, &[]),
        ]);
        let feedback = outcome.feedback_text();
        assert!(feedback.contains("KeywordCoverage"));
        assert!(feedback.contains("missing 'tokio'"));
        assert!(feedback.contains("missing 'sqlx'"));
        assert!(!feedback.contains("QuantifiedImpact"));
    }
}
