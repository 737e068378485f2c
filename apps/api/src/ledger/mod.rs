//! Quota ledger — admission checks and atomic usage debits.
//!
//! Three quota sources are consulted in fixed precedence: administrative
//! unlimited access, subscription-period quota (+ add-on credits), lifetime
//! trial. `check_access` is a pure read; `debit` mutates counters only through
//! single conditional UPDATE statements, so two concurrent debits against one
//! remaining unit resolve to exactly one success at the database, not in
//! application code.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::models::account::AccountRow;

/// Why an admission check denied access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    TrialExhausted,
    QuotaExhausted,
}

/// The outcome of an admission check. Computed fresh on every call and never
/// cached across a decision boundary.
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub remaining: Option<i64>,
    pub unlimited: bool,
    pub is_trial: bool,
    pub reason: Option<DenialReason>,
    pub can_subscribe: bool,
    pub can_buy_addon: bool,
    pub renewal_date: Option<DateTime<Utc>>,
}

impl AccessDecision {
    fn allowed_unlimited() -> Self {
        AccessDecision {
            allowed: true,
            remaining: None,
            unlimited: true,
            is_trial: false,
            reason: None,
            can_subscribe: false,
            can_buy_addon: false,
            renewal_date: None,
        }
    }

    /// Actionable denial text — every rejection tells the user what to do next.
    pub fn denial_message(&self) -> &'static str {
        match self.reason {
            Some(DenialReason::TrialExhausted) => "Trial exhausted. Subscribe to continue.",
            Some(DenialReason::QuotaExhausted) => {
                "Monthly quota exhausted. Purchase an add-on pack or wait for renewal."
            }
            None => "Access denied",
        }
    }
}

/// Decides whether the account may start a run. Pure function of the account
/// row, quota configuration, and `now` — no I/O, no side effects.
///
/// Precedence, first match wins:
/// 1. administrative unlimited access
/// 2. paid-through subscriber (period quota + add-on credits)
/// 3. lifetime trial
/// 4. denied, trial exhausted
pub fn check_access(account: &AccountRow, cfg: &QuotaConfig, now: DateTime<Utc>) -> AccessDecision {
    if cfg.is_unlimited(&account.email) {
        return AccessDecision::allowed_unlimited();
    }

    if account.in_paid_period(now) {
        let remaining_period = i64::from(cfg.subscription_limit - account.period_usage).max(0);
        let remaining = remaining_period + i64::from(account.addon_credits);

        if remaining > 0 {
            return AccessDecision {
                allowed: true,
                remaining: Some(remaining),
                unlimited: false,
                is_trial: false,
                reason: None,
                can_subscribe: false,
                can_buy_addon: false,
                renewal_date: account.period_end,
            };
        }
        return AccessDecision {
            allowed: false,
            remaining: Some(0),
            unlimited: false,
            is_trial: false,
            reason: Some(DenialReason::QuotaExhausted),
            can_subscribe: false,
            can_buy_addon: true,
            renewal_date: account.period_end,
        };
    }

    if account.trial_usage < cfg.trial_limit {
        return AccessDecision {
            allowed: true,
            remaining: Some(i64::from(cfg.trial_limit - account.trial_usage)),
            unlimited: false,
            is_trial: true,
            reason: None,
            can_subscribe: true,
            can_buy_addon: false,
            renewal_date: None,
        };
    }

    AccessDecision {
        allowed: false,
        remaining: Some(0),
        unlimited: false,
        is_trial: false,
        reason: Some(DenialReason::TrialExhausted),
        can_subscribe: true,
        can_buy_addon: false,
        renewal_date: None,
    }
}

/// Consumes one quota unit. Returns false only when every source failed its
/// conditional update — the caller must treat that as a late race loss, not a
/// programming error.
///
/// Subscribers drain period quota first, then add-on credits; each attempt is
/// a single conditional UPDATE whose `rows_affected` is the verdict. Trial
/// usage is incremented unconditionally: the boundary was already checked at
/// admission, and a brief overshoot under concurrency is caught by the next
/// admission check rather than enforced as a strict ceiling here.
pub async fn debit(pool: &PgPool, account: &AccountRow, cfg: &QuotaConfig) -> sqlx::Result<bool> {
    if cfg.is_unlimited(&account.email) {
        return Ok(true);
    }

    if account.in_paid_period(Utc::now()) {
        let period = sqlx::query(
            "UPDATE accounts SET period_usage = period_usage + 1
             WHERE id = $1 AND period_usage < $2",
        )
        .bind(account.id)
        .bind(cfg.subscription_limit)
        .execute(pool)
        .await?;
        if period.rows_affected() == 1 {
            return Ok(true);
        }

        let addon = sqlx::query(
            "UPDATE accounts SET addon_credits = addon_credits - 1
             WHERE id = $1 AND addon_credits > 0",
        )
        .bind(account.id)
        .execute(pool)
        .await?;
        return Ok(addon.rows_affected() == 1);
    }

    sqlx::query("UPDATE accounts SET trial_usage = trial_usage + 1 WHERE id = $1")
        .bind(account.id)
        .execute(pool)
        .await?;
    Ok(true)
}

/// Debits exactly once for a completed run.
///
/// The per-run marker is claimed first, so a resumed or replayed completion
/// never reaches the counters twice. A false debit after a completed run is a
/// billing-reconciliation alert: logged loudly, never retried against a
/// different quota source.
pub async fn debit_for_run(
    pool: &PgPool,
    run_id: Uuid,
    account: &AccountRow,
    cfg: &QuotaConfig,
) -> sqlx::Result<()> {
    let claimed = sqlx::query("UPDATE runs SET debited = TRUE WHERE id = $1 AND NOT debited")
        .bind(run_id)
        .execute(pool)
        .await?;
    if claimed.rows_affected() == 0 {
        info!("Run {run_id} already debited, skipping");
        return Ok(());
    }

    if debit(pool, account, cfg).await? {
        info!("Debited one quota unit from account {} for run {run_id}", account.id);
    } else {
        error!(
            "BILLING ALERT: run {run_id} completed but no quota source could be debited \
             for account {} — reconcile manually",
            account.id
        );
    }
    Ok(())
}

/// Activates a subscription from a completed checkout: tier `active`,
/// external ids recorded, fresh period, usage zeroed.
pub async fn activate_subscription(
    exec: impl PgExecutor<'_>,
    account_id: Uuid,
    subscription_id: &str,
    customer_id: Option<&str>,
    period_end: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE accounts
         SET tier = 'active', stripe_subscription_id = $2, stripe_customer_id = COALESCE($3, stripe_customer_id),
             period_end = $4, period_usage = 0
         WHERE id = $1",
    )
    .bind(account_id)
    .bind(subscription_id)
    .bind(customer_id)
    .bind(period_end)
    .execute(exec)
    .await?;
    info!("Activated subscription {subscription_id} for account {account_id}");
    Ok(())
}

/// Renewal: reset period usage, extend the period, ensure tier `active`.
/// Idempotent by compare-and-skip on `period_end` — replaying the same
/// renewal leaves state unchanged.
pub async fn apply_renewal(
    exec: impl PgExecutor<'_>,
    account_id: Uuid,
    new_period_end: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE accounts SET tier = 'active', period_usage = 0, period_end = $2
         WHERE id = $1 AND (period_end IS NULL OR period_end <> $2)",
    )
    .bind(account_id)
    .bind(new_period_end)
    .execute(exec)
    .await?;

    let applied = result.rows_affected() == 1;
    if applied {
        info!("Renewed subscription for account {account_id} through {new_period_end}");
    } else {
        warn!("Renewal for account {account_id} already at period end {new_period_end}, skipping");
    }
    Ok(applied)
}

/// Hard terminal signal only — the subscription is gone at the processor.
/// Soft payment-failure states never reach this; the processor's own retry
/// window governs those.
pub async fn apply_cancellation_terminal(
    exec: impl PgExecutor<'_>,
    account_id: Uuid,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE accounts SET tier = 'expired' WHERE id = $1")
        .bind(account_id)
        .execute(exec)
        .await?;
    info!("Subscription expired for account {account_id}");
    Ok(())
}

/// Monotonic credit grant. Credits never decrease here — only `debit` spends
/// them, one at a time.
pub async fn add_credits(
    exec: impl PgExecutor<'_>,
    account_id: Uuid,
    credits: i32,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE accounts SET addon_credits = addon_credits + $2 WHERE id = $1")
        .bind(account_id)
        .bind(credits)
        .execute(exec)
        .await?;
    info!("Added {credits} add-on credits to account {account_id}");
    Ok(())
}

pub async fn get_account(pool: &PgPool, account_id: Uuid) -> sqlx::Result<Option<AccountRow>> {
    sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_account_by_subscription(
    exec: impl PgExecutor<'_>,
    subscription_id: &str,
) -> sqlx::Result<Option<AccountRow>> {
    sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE stripe_subscription_id = $1")
        .bind(subscription_id)
        .fetch_optional(exec)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cfg() -> QuotaConfig {
        QuotaConfig {
            trial_limit: 3,
            subscription_limit: 50,
            addon_pack_size: 10,
            unlimited_users: vec!["admin@refit.dev".to_string()],
        }
    }

    fn account() -> AccountRow {
        AccountRow {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            tier: "trial".to_string(),
            trial_usage: 0,
            period_usage: 0,
            period_end: None,
            addon_credits: 0,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_unlimited_user_wins_over_everything() {
        let mut acct = account();
        acct.email = "admin@refit.dev".to_string();
        acct.tier = "expired".to_string();
        acct.trial_usage = 999;

        let decision = check_access(&acct, &cfg(), Utc::now());
        assert!(decision.allowed);
        assert!(decision.unlimited);
        assert_eq!(decision.remaining, None);
    }

    #[test]
    fn test_fresh_trial_account_is_allowed_with_remaining() {
        let acct = account();
        let decision = check_access(&acct, &cfg(), Utc::now());
        assert!(decision.allowed);
        assert!(decision.is_trial);
        assert_eq!(decision.remaining, Some(3));
        assert!(decision.can_subscribe);
    }

    #[test]
    fn test_trial_exhaustion_denies_with_subscribe_hint() {
        let mut acct = account();
        acct.trial_usage = 3;

        let decision = check_access(&acct, &cfg(), Utc::now());
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenialReason::TrialExhausted));
        assert!(decision.can_subscribe);
        assert!(!decision.can_buy_addon);
        assert_eq!(decision.remaining, Some(0));
    }

    #[test]
    fn test_active_subscriber_combines_period_and_addon_quota() {
        let now = Utc::now();
        let mut acct = account();
        acct.tier = "active".to_string();
        acct.period_end = Some(now + Duration::days(20));
        acct.period_usage = 48;
        acct.addon_credits = 5;

        let decision = check_access(&acct, &cfg(), now);
        assert!(decision.allowed);
        assert!(!decision.is_trial);
        assert_eq!(decision.remaining, Some(7)); // (50-48) + 5
        assert_eq!(decision.renewal_date, acct.period_end);
    }

    #[test]
    fn test_subscriber_with_addon_overflow_scenario() {
        // Period quota fully used, add-on credits keep the account allowed.
        let now = Utc::now();
        let mut acct = account();
        acct.tier = "active".to_string();
        acct.period_end = Some(now + Duration::days(10));
        acct.period_usage = 50;
        acct.addon_credits = 3;

        let decision = check_access(&acct, &cfg(), now);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(3));
    }

    #[test]
    fn test_quota_exhaustion_denies_with_addon_hint_and_renewal_date() {
        let now = Utc::now();
        let mut acct = account();
        acct.tier = "active".to_string();
        acct.period_end = Some(now + Duration::days(10));
        acct.period_usage = 50;
        acct.addon_credits = 0;

        let decision = check_access(&acct, &cfg(), now);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenialReason::QuotaExhausted));
        assert!(decision.can_buy_addon);
        assert!(!decision.can_subscribe);
        assert_eq!(decision.renewal_date, acct.period_end);
    }

    #[test]
    fn test_lapsed_subscriber_falls_through_to_trial_rules() {
        let now = Utc::now();
        let mut acct = account();
        acct.tier = "active".to_string();
        acct.period_end = Some(now - Duration::days(1));
        acct.trial_usage = 3;

        let decision = check_access(&acct, &cfg(), now);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenialReason::TrialExhausted));
    }

    #[test]
    fn test_cancelled_but_paid_through_keeps_access() {
        let now = Utc::now();
        let mut acct = account();
        acct.tier = "cancelled".to_string();
        acct.period_end = Some(now + Duration::days(5));
        acct.period_usage = 10;

        let decision = check_access(&acct, &cfg(), now);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(40));
    }

    #[test]
    fn test_over_limit_period_usage_never_yields_negative_remaining() {
        // period_usage can briefly overshoot under the eventual trial rule;
        // remaining must still clamp at the credit balance.
        let now = Utc::now();
        let mut acct = account();
        acct.tier = "active".to_string();
        acct.period_end = Some(now + Duration::days(10));
        acct.period_usage = 53;
        acct.addon_credits = 2;

        let decision = check_access(&acct, &cfg(), now);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(2));
    }

    #[test]
    fn test_denial_messages_are_actionable() {
        let mut acct = account();
        acct.trial_usage = 3;
        let decision = check_access(&acct, &cfg(), Utc::now());
        assert!(decision.denial_message().contains("Subscribe"));

        let now = Utc::now();
        acct.tier = "active".to_string();
        acct.period_end = Some(now + Duration::days(1));
        acct.period_usage = 50;
        let decision = check_access(&acct, &cfg(), now);
        assert!(decision.denial_message().contains("add-on"));
    }
}
