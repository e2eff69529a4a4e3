//! Charge status and charge type as reported by Stripe.
//!
//! Stripe owns both enums, so unknown values are kept verbatim in an
//! `Other` variant instead of failing deserialization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a subscription-like object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChargeStatus {
    Active,
    Trialing,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Unpaid,
    Paused,
    /// Set locally once the paid period has lapsed.
    Expired,
    Other(String),
}

impl ChargeStatus {
    /// Parses a Stripe status string.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "canceled" => Self::Canceled,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "past_due" => Self::PastDue,
            "unpaid" => Self::Unpaid,
            "paused" => Self::Paused,
            "expired" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the Stripe wire string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
            Self::Expired => "expired",
            Self::Other(s) => s,
        }
    }

    /// Statuses for which the period end is checked before granting access.
    pub fn is_period_bound(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::Canceled)
    }
}

impl From<String> for ChargeStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ChargeStatus> for String {
    fn from(status: ChargeStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of Stripe object a charge record mirrors (`object` field).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChargeType {
    Subscription,
    Invoice,
    Other(String),
}

impl ChargeType {
    pub fn parse(s: &str) -> Self {
        match s {
            "subscription" => Self::Subscription,
            "invoice" => Self::Invoice,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Subscription => "subscription",
            Self::Invoice => "invoice",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ChargeType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ChargeType> for String {
    fn from(kind: ChargeType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
