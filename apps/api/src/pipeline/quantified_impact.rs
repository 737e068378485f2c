//! Quantified-impact check: experience bullets must carry a number, a
//! percentage, a currency amount, or a multiplier — vague verbs and scale
//! words without metrics are flagged. Pure Rust, deterministic.

use async_trait::async_trait;

use crate::agents::optimizer::OptimizedDraft;
use crate::errors::AppError;
use crate::pipeline::{ValidationContext, Validator, ValidatorReport};

const VAGUE_VERBS: &[&str] = &[
    "improved",
    "enhanced",
    "helped",
    "worked on",
    "assisted",
    "supported",
    "participated",
    "involved",
];

const VAGUE_SCALE_WORDS: &[&str] = &[
    "significant",
    "major",
    "large",
    "huge",
    "massive",
    "substantial",
    "considerable",
    "many",
    "numerous",
    "various",
    "several",
];

pub struct QuantifiedImpact {
    threshold: f32,
}

impl Default for QuantifiedImpact {
    fn default() -> Self {
        // Half the bullets quantified is the floor; below that the draft
        // reads as hand-waving.
        Self { threshold: 0.5 }
    }
}

#[async_trait]
impl Validator for QuantifiedImpact {
    fn name(&self) -> &'static str {
        "QuantifiedImpact"
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    async fn validate(
        &self,
        draft: &OptimizedDraft,
        _ctx: &ValidationContext<'_>,
    ) -> Result<ValidatorReport, AppError> {
        Ok(score_impact(&draft.content, self.threshold))
    }
}

fn score_impact(content: &str, threshold: f32) -> ValidatorReport {
    let bullets: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("- ") || l.starts_with("* "))
        .collect();

    if bullets.is_empty() {
        return ValidatorReport {
            name: "QuantifiedImpact".to_string(),
            passed: false,
            score: 0.0,
            threshold,
            issues: vec!["Draft contains no bullet points to evaluate".to_string()],
        };
    }

    let mut issues = Vec::new();
    let mut quantified = 0usize;

    for bullet in &bullets {
        if is_quantified(bullet) {
            quantified += 1;
        } else if let Some(issue) = vague_issue(bullet) {
            issues.push(issue);
        }
    }

    let score = quantified as f32 / bullets.len() as f32;

    ValidatorReport {
        name: "QuantifiedImpact".to_string(),
        passed: score >= threshold,
        score,
        threshold,
        issues,
    }
}

/// Quantified means: any digit, a `~N` estimate, `%`, a currency symbol, or
/// an `Nx` multiplier phrase.
fn is_quantified(text: &str) -> bool {
    let text_lower = text.to_lowercase();
    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    let has_tilde = text.contains('~') && has_digit;
    let has_percent = text.contains('%');
    let has_currency = text.contains('$') || text.contains('€') || text.contains('£');
    let has_multiplier = has_digit
        && (text_lower.contains("x faster")
            || text_lower.contains("x improvement")
            || text_lower.contains("x reduction")
            || text_lower.contains("x more"));

    has_digit || has_tilde || has_percent || has_currency || has_multiplier
}

/// Names the first vague verb or scale word in an unquantified bullet.
fn vague_issue(bullet: &str) -> Option<String> {
    let lower = bullet.to_lowercase();

    for &verb in VAGUE_VERBS {
        if lower.contains(verb) {
            return Some(format!(
                "Bullet uses vague verb '{verb}' without a metric: \"{}\"",
                truncate(bullet, 80)
            ));
        }
    }
    for &word in VAGUE_SCALE_WORDS {
        if lower.contains(word) {
            return Some(format!(
                "Bullet uses vague scale word '{word}' without a number: \"{}\"",
                truncate(bullet, 80)
            ));
        }
    }
    Some(format!("Bullet has no quantified impact: \"{}\"", truncate(bullet, 80)))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect::<String>() + "…"
    }
}
