//! Credit balance type.
//!
//! Credits are the unit consumed by AI generations. A balance is never
//! negative; arithmetic that would cross zero is rejected instead of clamped.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing or changing [`Credits`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CreditsError {
    /// The value is negative.
    #[error("credit balance cannot be negative (got {0})")]
    Negative(i32),
    /// The balance does not cover the requested debit.
    #[error("insufficient credits: balance {balance}, requested {requested}")]
    Insufficient {
        /// Current balance.
        balance: i32,
        /// Amount that was requested.
        requested: i32,
    },
    /// The result does not fit in the balance type.
    #[error("credit balance overflow")]
    Overflow,
}

/// A non-negative credit balance.
///
/// ```
/// use pawdia_core::Credits;
///
/// let balance = Credits::new(5).unwrap();
/// assert_eq!(balance.apply(-2).unwrap().value(), 3);
/// assert!(balance.apply(-6).is_err());
/// assert!(Credits::new(-1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Credits(i32);

impl Credits {
    /// An empty balance.
    pub const ZERO: Self = Self(0);

    /// Create a balance from a raw value.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Negative` if `value < 0`.
    pub const fn new(value: i32) -> Result<Self, CreditsError> {
        if value < 0 {
            return Err(CreditsError::Negative(value));
        }
        Ok(Self(value))
    }

    /// Get the raw balance.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Add credits, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, amount: u32) -> Option<Self> {
        let amount = i32::try_from(amount).ok()?;
        self.0.checked_add(amount).map(Self)
    }

    /// Remove credits, returning `None` if the balance would go below zero.
    #[must_use]
    pub fn checked_sub(self, amount: u32) -> Option<Self> {
        let amount = i32::try_from(amount).ok()?;
        let remaining = self.0.checked_sub(amount)?;
        (remaining >= 0).then_some(Self(remaining))
    }

    /// Whether the balance covers `amount`.
    #[must_use]
    pub fn covers(self, amount: u32) -> bool {
        self.checked_sub(amount).is_some()
    }

    /// Apply a signed delta (positive adds, negative removes).
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Insufficient` if a debit exceeds the balance and
    /// `CreditsError::Overflow` if a credit overflows.
    pub fn apply(self, delta: i32) -> Result<Self, CreditsError> {
        if delta >= 0 {
            match self.checked_add(delta.unsigned_abs()) {
                Some(v) => Ok(v),
                None => Err(CreditsError::Overflow),
            }
        } else {
            match self.checked_sub(delta.unsigned_abs()) {
                Some(v) => Ok(v),
                None => Err(CreditsError::Insufficient {
                    balance: self.0,
                    requested: delta.saturating_neg(),
                }),
            }
        }
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i32> for Credits {
    type Error = CreditsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Credits> for i32 {
    fn from(credits: Credits) -> Self {
        credits.0
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i32::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_negative() {
        assert_eq!(Credits::new(-3), Err(CreditsError::Negative(-3)));
        assert_eq!(Credits::new(0).unwrap(), Credits::ZERO);
    }

    #[test]
    fn test_checked_sub_floors_at_zero() {
        let c = Credits::new(3).unwrap();
        assert_eq!(c.checked_sub(3), Some(Credits::ZERO));
        assert_eq!(c.checked_sub(4), None);
    }

    #[test]
    fn test_checked_add_overflow() {
        let c = Credits::new(i32::MAX).unwrap();
        assert_eq!(c.checked_add(1), None);
        assert_eq!(Credits::ZERO.checked_add(u32::MAX), None);
    }

    #[test]
    fn test_apply_signed_delta() {
        let c = Credits::new(10).unwrap();
        assert_eq!(c.apply(5).unwrap().value(), 15);
        assert_eq!(c.apply(-10).unwrap().value(), 0);
        assert_eq!(
            c.apply(-11),
            Err(CreditsError::Insufficient {
                balance: 10,
                requested: 11
            })
        );
    }

    #[test]
    fn test_covers() {
        let c = Credits::new(2).unwrap();
        assert!(c.covers(2));
        assert!(!c.covers(3));
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Credits>("-1").is_err());
        assert_eq!(serde_json::from_str::<Credits>("12").unwrap().value(), 12);
    }
}
