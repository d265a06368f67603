//! Recipient types for outbound notifications.
//!
//! A recipient is either an opaque delivery address or a reference to a known
//! user. User references carry an identity that can be used to look up a
//! locale preference; opaque addresses never have one.

use serde::{Deserialize, Serialize};

/// A reference to a known user with an associated delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User identity, used as the key for locale preference lookup
    pub id: String,
    /// Delivery address associated with this user
    pub email: String,
}

impl UserRef {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// An addressable target for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Recipient {
    /// A raw address used directly as the delivery target
    Address(String),
    /// A known user whose address and locale preference are resolvable
    User(UserRef),
}

impl Recipient {
    /// Create an opaque address recipient
    pub fn address(addr: impl Into<String>) -> Self {
        Self::Address(addr.into())
    }

    /// Create a user reference recipient
    pub fn user(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self::User(UserRef::new(id, email))
    }

    /// The delivery address for this recipient.
    ///
    /// Every recipient resolves to exactly one address: opaque addresses are
    /// used as-is, user references contribute their associated address.
    pub fn delivery_address(&self) -> &str {
        match self {
            Self::Address(addr) => addr,
            Self::User(user) => &user.email,
        }
    }

    /// The user identity for locale preference lookup.
    ///
    /// Only user references carry one; opaque addresses have no preference.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Address(_) => None,
            Self::User(user) => Some(&user.id),
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address(addr) => write!(f, "{}", addr),
            Self::User(user) => write!(f, "{} <{}>", user.id, user.email),
        }
    }
}

impl From<&str> for Recipient {
    fn from(addr: &str) -> Self {
        Self::Address(addr.to_string())
    }
}

impl From<String> for Recipient {
    fn from(addr: String) -> Self {
        Self::Address(addr)
    }
}

impl From<UserRef> for Recipient {
    fn from(user: UserRef) -> Self {
        Self::User(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_recipient() {
        let recipient = Recipient::address("someone@example.com");
        assert_eq!(recipient.delivery_address(), "someone@example.com");
        assert_eq!(recipient.user_id(), None);
    }

    #[test]
    fn test_user_recipient() {
        let recipient = Recipient::user("user-42", "alice@example.com");
        assert_eq!(recipient.delivery_address(), "alice@example.com");
        assert_eq!(recipient.user_id(), Some("user-42"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Recipient::address("a@b.com").to_string(),
            "a@b.com"
        );
        assert_eq!(
            Recipient::user("user-1", "a@b.com").to_string(),
            "user-1 <a@b.com>"
        );
    }

    #[test]
    fn test_from_conversions() {
        let from_str: Recipient = "x@y.com".into();
        assert_eq!(from_str.delivery_address(), "x@y.com");

        let from_user: Recipient = UserRef::new("u", "u@y.com").into();
        assert_eq!(from_user.user_id(), Some("u"));
    }
}
