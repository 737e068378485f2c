use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription classification of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Trial,
    Active,
    Cancelled,
    Expired,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Trial => "trial",
            Tier::Active => "active",
            Tier::Cancelled => "cancelled",
            Tier::Expired => "expired",
        }
    }

    /// Unknown values degrade to `trial` rather than erroring — an account row
    /// with a bad tier should lose privileges, not break every request.
    pub fn parse(s: &str) -> Tier {
        match s {
            "active" => Tier::Active,
            "cancelled" => Tier::Cancelled,
            "expired" => Tier::Expired,
            _ => Tier::Trial,
        }
    }
}

/// One row of the `accounts` table. Counters are mutated exclusively through
/// the conditional UPDATEs in the `ledger` module.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub tier: String,
    pub trial_usage: i32,
    pub period_usage: i32,
    pub period_end: Option<DateTime<Utc>>,
    pub addon_credits: i32,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AccountRow {
    pub fn tier(&self) -> Tier {
        Tier::parse(&self.tier)
    }

    /// True while the account's billing period covers `now`. Cancelled
    /// subscribers keep access until the period they already paid for ends.
    pub fn in_paid_period(&self, now: DateTime<Utc>) -> bool {
        matches!(self.tier(), Tier::Active | Tier::Cancelled)
            && self.period_end.is_some_and(|end| now < end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(tier: &str, period_end: Option<DateTime<Utc>>) -> AccountRow {
        AccountRow {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            tier: tier.to_string(),
            trial_usage: 0,
            period_usage: 0,
            period_end,
            addon_credits: 0,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tier_parse_round_trips_known_values() {
        for tier in [Tier::Trial, Tier::Active, Tier::Cancelled, Tier::Expired] {
            assert_eq!(Tier::parse(tier.as_str()), tier);
        }
    }

    #[test]
    fn test_tier_parse_unknown_degrades_to_trial() {
        assert_eq!(Tier::parse("gold"), Tier::Trial);
        assert_eq!(Tier::parse(""), Tier::Trial);
    }

    #[test]
    fn test_in_paid_period_requires_future_period_end() {
        let now = Utc::now();
        let acct = account("active", Some(now + Duration::days(10)));
        assert!(acct.in_paid_period(now));

        let lapsed = account("active", Some(now - Duration::days(1)));
        assert!(!lapsed.in_paid_period(now));

        let no_period = account("active", None);
        assert!(!no_period.in_paid_period(now));
    }

    #[test]
    fn test_cancelled_subscriber_is_paid_through_period_end() {
        let now = Utc::now();
        let acct = account("cancelled", Some(now + Duration::days(3)));
        assert!(acct.in_paid_period(now));
    }

    #[test]
    fn test_trial_and_expired_are_never_in_paid_period() {
        let now = Utc::now();
        assert!(!account("trial", Some(now + Duration::days(3))).in_paid_period(now));
        assert!(!account("expired", Some(now + Duration::days(3))).in_paid_period(now));
    }
}
