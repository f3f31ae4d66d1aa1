//! Subscription plan and status types.
//!
//! A subscription is a prepaid 30-day period. Buying a plan extends
//! `expires_at` and tops up the credit balance with the plan's monthly credits.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::price::{CurrencyCode, Price};

/// Length of one paid subscription period.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

/// Subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "subscription_plan", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    #[default]
    Free,
    Basic,
    Pro,
}

impl SubscriptionPlan {
    /// Plans that can be purchased.
    pub const PAID: [Self; 2] = [Self::Basic, Self::Pro];

    /// Credits granted per paid period.
    #[must_use]
    pub const fn monthly_credits(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Basic => 50,
            Self::Pro => 200,
        }
    }

    /// Price of one period.
    #[must_use]
    pub fn price(self) -> Price {
        match self {
            Self::Free => Price::new(Decimal::ZERO, CurrencyCode::USD),
            Self::Basic => Price::from_cents(999, CurrencyCode::USD),
            Self::Pro => Price::from_cents(2999, CurrencyCode::USD),
        }
    }

    /// Human-readable plan name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Basic => "Basic",
            Self::Pro => "Pro",
        }
    }

    /// Whether the plan can be bought.
    #[must_use]
    pub const fn is_paid(self) -> bool {
        !matches!(self, Self::Free)
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "subscription_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Inactive,
    Active,
    Cancelled,
    Expired,
}

/// A user's subscription record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Whether the subscription grants paid benefits at `now`.
    ///
    /// A cancelled subscription stays usable until the end of the paid period.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled
        ) && self.plan.is_paid()
            && self.expires_at.is_some_and(|exp| exp > now)
    }

    /// The subscription as it should be reported at `now`.
    ///
    /// Active or cancelled records past their expiry are reported as expired.
    #[must_use]
    pub fn effective_at(&self, now: DateTime<Utc>) -> Self {
        let lapsed = self.expires_at.is_none_or(|exp| exp <= now);
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled if lapsed => Self {
                status: SubscriptionStatus::Expired,
                ..*self
            },
            _ => *self,
        }
    }

    /// The subscription after paying for one more period of `plan`.
    ///
    /// Time left on the current period is kept when renewing.
    #[must_use]
    pub fn renewed(&self, plan: SubscriptionPlan, now: DateTime<Utc>) -> Self {
        let start = self.expires_at.filter(|exp| *exp > now).unwrap_or(now);
        Self {
            plan,
            status: SubscriptionStatus::Active,
            expires_at: Some(start + Duration::days(SUBSCRIPTION_PERIOD_DAYS)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_default_is_free_inactive() {
        let sub = Subscription::default();
        assert_eq!(sub.plan, SubscriptionPlan::Free);
        assert_eq!(sub.status, SubscriptionStatus::Inactive);
        assert!(!sub.is_active_at(now()));
    }

    #[test]
    fn test_renew_from_nothing_starts_now() {
        let sub = Subscription::default().renewed(SubscriptionPlan::Basic, now());
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expires_at, Some(now() + Duration::days(30)));
        assert!(sub.is_active_at(now()));
    }

    #[test]
    fn test_renew_extends_remaining_period() {
        let current = Subscription {
            plan: SubscriptionPlan::Basic,
            status: SubscriptionStatus::Active,
            expires_at: Some(now() + Duration::days(10)),
        };
        let renewed = current.renewed(SubscriptionPlan::Pro, now());
        assert_eq!(renewed.plan, SubscriptionPlan::Pro);
        assert_eq!(renewed.expires_at, Some(now() + Duration::days(40)));
    }

    #[test]
    fn test_cancelled_keeps_access_until_expiry() {
        let sub = Subscription {
            plan: SubscriptionPlan::Pro,
            status: SubscriptionStatus::Cancelled,
            expires_at: Some(now() + Duration::days(3)),
        };
        assert!(sub.is_active_at(now()));
        assert!(!sub.is_active_at(now() + Duration::days(4)));
    }

    #[test]
    fn test_effective_reports_expired() {
        let sub = Subscription {
            plan: SubscriptionPlan::Basic,
            status: SubscriptionStatus::Active,
            expires_at: Some(now() - Duration::seconds(1)),
        };
        assert_eq!(sub.effective_at(now()).status, SubscriptionStatus::Expired);

        let inactive = Subscription::default();
        assert_eq!(
            inactive.effective_at(now()).status,
            SubscriptionStatus::Inactive
        );
    }

    #[test]
    fn test_plan_catalogue() {
        assert_eq!(SubscriptionPlan::Basic.monthly_credits(), 50);
        assert_eq!(SubscriptionPlan::Pro.price().display(), "$29.99");
        assert!(!SubscriptionPlan::Free.is_paid());
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(Subscription::default()).unwrap();
        assert_eq!(json["plan"], "free");
        assert_eq!(json["status"], "inactive");
        assert!(json.get("expiresAt").is_some());
    }
}
