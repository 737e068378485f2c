use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Panics at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub stripe_webhook_secret: String,
    pub port: u16,
    pub rust_log: String,
    pub quota: QuotaConfig,
    pub runs: RunConfig,
}

/// Quota limits for the three layered sources: lifetime trial, billing-period
/// subscription quota, and purchased add-on credits.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub trial_limit: i32,
    pub subscription_limit: i32,
    /// Credits granted per add-on pack purchase.
    pub addon_pack_size: i32,
    /// Lowercased emails with administrative unlimited access. Never persisted
    /// as consumed quota.
    pub unlimited_users: Vec<String>,
}

impl QuotaConfig {
    pub fn is_unlimited(&self, email: &str) -> bool {
        self.unlimited_users
            .iter()
            .any(|u| u == &email.to_lowercase())
    }
}

/// Bounds on a single optimization run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Default generate→validate iterations when the request does not specify.
    pub default_max_iterations: u32,
    /// Per-step ceiling: each agent call, the validation pipeline, and the
    /// render step are bounded individually.
    pub step_timeout_secs: u64,
    /// Wall-clock ceiling on a whole run, independent of per-step timeouts.
    pub run_deadline_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            stripe_webhook_secret: require_env("STRIPE_WEBHOOK_SECRET")?,
            port: env_or("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
            quota: QuotaConfig {
                trial_limit: parse_env("TRIAL_REQUEST_LIMIT", "3")?,
                subscription_limit: parse_env("SUBSCRIPTION_REQUEST_LIMIT", "50")?,
                addon_pack_size: parse_env("ADDON_REQUEST_COUNT", "10")?,
                unlimited_users: std::env::var("UNLIMITED_USERS")
                    .unwrap_or_default()
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            runs: RunConfig {
                default_max_iterations: parse_env("RUN_MAX_ITERATIONS", "5")?,
                step_timeout_secs: parse_env("RUN_STEP_TIMEOUT_SECS", "180")?,
                run_deadline_secs: parse_env("RUN_DEADLINE_SECS", "1200")?,
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_or(key, default)
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' is not a valid value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota_cfg(unlimited: &[&str]) -> QuotaConfig {
        QuotaConfig {
            trial_limit: 3,
            subscription_limit: 50,
            addon_pack_size: 10,
            unlimited_users: unlimited.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_unlimited_user_match_is_case_insensitive() {
        let cfg = quota_cfg(&["admin@refit.dev"]);
        assert!(cfg.is_unlimited("Admin@Refit.Dev"));
        assert!(cfg.is_unlimited("admin@refit.dev"));
        assert!(!cfg.is_unlimited("user@refit.dev"));
    }

    #[test]
    fn test_empty_unlimited_list_matches_nobody() {
        let cfg = quota_cfg(&[]);
        assert!(!cfg.is_unlimited(""));
        assert!(!cfg.is_unlimited("admin@refit.dev"));
    }
}
