//! Locale preference resolution.
//!
//! This module provides:
//! - The `Locale` value threaded through rendering
//! - The `LocaleStore` abstraction over an external preference store
//! - A `LocaleResolver` that degrades every lookup failure to "no preference"
//!
//! The resolver is deliberately lenient: a missing store, a lookup miss, and a
//! store that cannot be reached all produce `None`, and dispatch continues
//! under the ambient locale. Store failures are logged at `warn` so a
//! misconfigured store is still visible.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LocaleStoreConfig;
use crate::recipient::Recipient;

/// A language/region preference controlling which template variant is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Locale {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

/// Errors from a locale preference lookup.
///
/// `NoPreference` and `Unavailable` are distinct outcomes, but the resolver
/// treats them identically: the recipient renders under the ambient locale.
#[derive(Debug, Error)]
pub enum LocaleLookupError {
    /// The store has no preference recorded for this user
    #[error("No locale preference stored for user")]
    NoPreference,

    /// The store could not be reached or is misconfigured
    #[error("Locale store unavailable: {0}")]
    Unavailable(String),
}

/// Abstraction over an external locale preference store.
#[async_trait]
pub trait LocaleStore: Send + Sync {
    /// Look up the stored locale preference for a user identity.
    async fn lookup(&self, user_id: &str) -> Result<Locale, LocaleLookupError>;
}

/// In-memory locale preference store.
///
/// Backed by a `DashMap` for concurrent access. The `fail_lookups` toggle
/// makes every lookup report `Unavailable`, which tests use to exercise the
/// degradation path.
#[derive(Default)]
pub struct MemoryLocaleStore {
    preferences: DashMap<String, Locale>,
    fail_lookups: std::sync::atomic::AtomicBool,
}

impl MemoryLocaleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a locale preference for a user
    pub fn set(&self, user_id: impl Into<String>, locale: Locale) {
        self.preferences.insert(user_id.into(), locale);
    }

    /// Remove a user's preference
    pub fn remove(&self, user_id: &str) {
        self.preferences.remove(user_id);
    }

    /// Make every subsequent lookup fail with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_lookups
            .store(unavailable, std::sync::atomic::Ordering::Relaxed);
    }
}

#[async_trait]
impl LocaleStore for MemoryLocaleStore {
    async fn lookup(&self, user_id: &str) -> Result<Locale, LocaleLookupError> {
        if self.fail_lookups.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(LocaleLookupError::Unavailable(
                "store marked unavailable".to_string(),
            ));
        }

        self.preferences
            .get(user_id)
            .map(|entry| entry.clone())
            .ok_or(LocaleLookupError::NoPreference)
    }
}

/// Resolves a recipient's preferred locale, degrading failures to "no
/// preference".
#[derive(Clone, Default)]
pub struct LocaleResolver {
    store: Option<Arc<dyn LocaleStore>>,
}

impl LocaleResolver {
    /// A resolver with no backing store; every recipient resolves to `None`.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    /// A resolver backed by a preference store.
    pub fn new(store: Arc<dyn LocaleStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Build a resolver from configuration.
    ///
    /// When the gate is off, lookup is disabled entirely and every recipient
    /// resolves to `None`, even though a store is available.
    pub fn from_config(config: &LocaleStoreConfig, store: Arc<dyn LocaleStore>) -> Self {
        if config.enabled {
            Self::new(store)
        } else {
            tracing::debug!("Locale store disabled by configuration");
            Self::disabled()
        }
    }

    /// Resolve the preferred locale for a recipient.
    ///
    /// Opaque addresses never have a preference. For user references, any
    /// lookup failure degrades to `None` and processing continues under the
    /// ambient locale.
    pub async fn resolve(&self, recipient: &Recipient) -> Option<Locale> {
        let user_id = recipient.user_id()?;
        let store = self.store.as_ref()?;

        match store.lookup(user_id).await {
            Ok(locale) => {
                tracing::debug!(
                    user_id = %user_id,
                    locale = %locale,
                    "Resolved locale preference"
                );
                Some(locale)
            }
            Err(LocaleLookupError::NoPreference) => {
                tracing::debug!(user_id = %user_id, "No locale preference stored");
                None
            }
            Err(LocaleLookupError::Unavailable(reason)) => {
                tracing::warn!(
                    user_id = %user_id,
                    reason = %reason,
                    "Locale store unavailable, continuing without locale switch"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_lookup_hit() {
        let store = MemoryLocaleStore::new();
        store.set("user-1", Locale::new("fr"));

        let locale = store.lookup("user-1").await.unwrap();
        assert_eq!(locale.as_str(), "fr");
    }

    #[tokio::test]
    async fn test_store_lookup_miss() {
        let store = MemoryLocaleStore::new();
        assert!(matches!(
            store.lookup("unknown").await,
            Err(LocaleLookupError::NoPreference)
        ));
    }

    #[tokio::test]
    async fn test_store_unavailable() {
        let store = MemoryLocaleStore::new();
        store.set("user-1", Locale::new("fr"));
        store.set_unavailable(true);

        assert!(matches!(
            store.lookup("user-1").await,
            Err(LocaleLookupError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_resolver_address_has_no_preference() {
        let store = Arc::new(MemoryLocaleStore::new());
        store.set("user-1", Locale::new("fr"));
        let resolver = LocaleResolver::new(store);

        let recipient = Recipient::address("someone@example.com");
        assert_eq!(resolver.resolve(&recipient).await, None);
    }

    #[tokio::test]
    async fn test_resolver_user_preference() {
        let store = Arc::new(MemoryLocaleStore::new());
        store.set("user-1", Locale::new("fr"));
        let resolver = LocaleResolver::new(store);

        let recipient = Recipient::user("user-1", "alice@example.com");
        assert_eq!(resolver.resolve(&recipient).await, Some(Locale::new("fr")));
    }

    #[tokio::test]
    async fn test_resolver_degrades_when_store_unavailable() {
        let store = Arc::new(MemoryLocaleStore::new());
        store.set("user-1", Locale::new("fr"));
        store.set_unavailable(true);
        let resolver = LocaleResolver::new(store);

        let recipient = Recipient::user("user-1", "alice@example.com");
        assert_eq!(resolver.resolve(&recipient).await, None);
    }

    #[tokio::test]
    async fn test_resolver_config_gate_off_ignores_store() {
        let store = Arc::new(MemoryLocaleStore::new());
        store.set("user-1", Locale::new("fr"));
        let config = LocaleStoreConfig { enabled: false };
        let resolver = LocaleResolver::from_config(&config, store);

        let recipient = Recipient::user("user-1", "alice@example.com");
        assert_eq!(resolver.resolve(&recipient).await, None);
    }

    #[tokio::test]
    async fn test_resolver_config_gate_on_uses_store() {
        let store = Arc::new(MemoryLocaleStore::new());
        store.set("user-1", Locale::new("fr"));
        let config = LocaleStoreConfig { enabled: true };
        let resolver = LocaleResolver::from_config(&config, store);

        let recipient = Recipient::user("user-1", "alice@example.com");
        assert_eq!(resolver.resolve(&recipient).await, Some(Locale::new("fr")));
    }

    #[tokio::test]
    async fn test_resolver_disabled() {
        let resolver = LocaleResolver::disabled();
        let recipient = Recipient::user("user-1", "alice@example.com");
        assert_eq!(resolver.resolve(&recipient).await, None);
    }
}
