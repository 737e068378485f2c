//! ATS-style keyword coverage check: what fraction of the parsed job's
//! keywords actually appear in the draft. Pure Rust, deterministic, no LLM.

use async_trait::async_trait;

use crate::agents::optimizer::OptimizedDraft;
use crate::errors::AppError;
use crate::pipeline::{ValidationContext, Validator, ValidatorReport};

pub struct KeywordCoverage {
    threshold: f32,
}

impl Default for KeywordCoverage {
    fn default() -> Self {
        // 60% coverage clears most ATS keyword screens without forcing the
        // optimizer to stuff terms the source cannot support.
        Self { threshold: 0.6 }
    }
}

#[async_trait]
impl Validator for KeywordCoverage {
    fn name(&self) -> &'static str {
        "KeywordCoverage"
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    async fn validate(
        &self,
        draft: &OptimizedDraft,
        ctx: &ValidationContext<'_>,
    ) -> Result<ValidatorReport, AppError> {
        Ok(score_coverage(
            &draft.content,
            &ctx.job.keywords,
            self.threshold,
        ))
    }
}

fn score_coverage(content: &str, keywords: &[String], threshold: f32) -> ValidatorReport {
    if keywords.is_empty() {
        // Nothing to cover — vacuous pass rather than penalizing the draft
        // for a sparse posting.
        return ValidatorReport {
            name: "KeywordCoverage".to_string(),
            passed: true,
            score: 1.0,
            threshold,
            issues: vec![],
        };
    }

    let content_lower = content.to_lowercase();
    let mut missing = Vec::new();
    let mut matched = 0usize;

    for keyword in keywords {
        if content_lower.contains(&keyword.to_lowercase()) {
            matched += 1;
        } else {
            missing.push(keyword.clone());
        }
    }

    let score = matched as f32 / keywords.len() as f32;
    let issues = missing
        .iter()
        .map(|k| format!("Job keyword '{k}' does not appear in the draft"))
        .collect();

    ValidatorReport {
        name: "KeywordCoverage".to_string(),
        passed: score >= threshold,
        score,
        threshold,
        issues,
    }
}
