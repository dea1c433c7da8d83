//! User model
//!
//! Wallet owner. Users are created by the identity service once a phone
//! number is verified; the billing core only reads them and moves their
//! balance through the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role carried in access tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular app user
    #[default]
    User,
    /// Operator allowed to manage rates
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl UserRole {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,

    /// Verified phone number
    pub phone: Option<String>,

    /// Display name
    pub name: Option<String>,

    /// Wallet balance, changed only through ledger entries
    pub balance: Decimal,

    /// Provider-side client identity used to originate calls
    pub billing_identity: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the wallet covers `amount`
    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

/// Registration payload; new users start with an empty wallet
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub phone: Option<String>,
    pub name: Option<String>,
    pub billing_identity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_role_parsing() {
        assert_eq!(UserRole::from_str("ADMIN"), Some(UserRole::Admin));
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::User.is_admin());
        assert_eq!(UserRole::from_str("root"), None);
    }

    #[test]
    fn test_can_afford() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            phone: Some("+8801712345678".to_string()),
            name: None,
            balance: dec!(0.35),
            billing_identity: None,
            created_at: now,
            updated_at: now,
        };
        assert!(user.can_afford(dec!(0.35)));
        assert!(!user.can_afford(dec!(0.36)));
    }
}
