//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pawdia_core::{Credits, Email, Subscription, UserId};

/// A Pawdia account.
///
/// The password hash and token hashes never leave the repository layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Normalized (lowercase) email address.
    pub email: Email,
    /// Current credit balance.
    pub credits: Credits,
    /// Current subscription record.
    pub subscription: Subscription,
    /// Whether the user can access admin routes.
    pub is_admin: bool,
    /// Whether the email address has been verified.
    pub is_verified: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The user as reported at `now`, with a lapsed subscription shown as expired.
    #[must_use]
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.subscription = self.subscription.effective_at(now);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use pawdia_core::{SubscriptionPlan, SubscriptionStatus};

    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(1),
            name: "Mochi Owner".to_owned(),
            email: Email::parse("owner@pawdia.ai").unwrap(),
            credits: Credits::new(3).unwrap(),
            subscription: Subscription {
                plan: SubscriptionPlan::Basic,
                status: SubscriptionStatus::Active,
                expires_at: Some(now - Duration::days(1)),
            },
            is_admin: false,
            is_verified: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_serializes_camel_case_without_secrets() {
        let json = serde_json::to_value(user()).unwrap();
        assert_eq!(json["isAdmin"], false);
        assert_eq!(json["isVerified"], true);
        assert_eq!(json["credits"], 3);
        assert!(json.get("passwordHash").is_none());
        assert!(json["subscription"].get("expiresAt").is_some());
    }

    #[test]
    fn test_as_of_reports_lapsed_subscription() {
        let user = user().as_of(Utc::now());
        assert_eq!(user.subscription.status, SubscriptionStatus::Expired);
    }
}
