//! Template resolution and rendering.
//!
//! A logical template path (e.g. `"welcome"`) maps to three rendering slots:
//! subject, plain-text body, and rich (HTML) body. The `TemplateEngine` trait
//! abstracts the actual rendering engine; the in-memory implementation stores
//! template sources keyed by (path, slot, locale) and renders them with
//! `{{variable}}` substitution.
//!
//! # Example
//!
//! ```ignore
//! let engine = MemoryTemplateEngine::new();
//! engine.register("welcome", TemplateSlot::Subject, "Welcome {{name}}");
//! engine.register_localized("welcome", TemplateSlot::Subject, "fr", "Bienvenue {{name}}");
//!
//! let mut context = RenderContext::new();
//! context.insert("name".to_string(), json!("Alice"));
//!
//! let subject = engine.render("welcome", TemplateSlot::Subject, &Locale::new("fr"), &context)?;
//! ```

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locale::Locale;

/// Per-recipient rendering context: a mapping of unique keys to values.
///
/// One fresh copy is built per recipient; it is never shared or mutated
/// concurrently across recipients.
pub type RenderContext = serde_json::Map<String, serde_json::Value>;

/// One of the three rendering targets for a template path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSlot {
    /// Single-line subject
    Subject,
    /// Plain-text body
    Text,
    /// Rich HTML body (optional per path)
    Html,
}

impl TemplateSlot {
    /// File name for this slot under a template path directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Subject => "short.txt",
            Self::Text => "email.txt",
            Self::Html => "email.html",
        }
    }
}

impl std::fmt::Display for TemplateSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Template-specific error type
#[derive(Debug, Error)]
pub enum RenderError {
    /// No template registered for this (path, slot) under any applicable locale
    #[error("Template not found: {path}/{slot}")]
    NotFound { path: String, slot: TemplateSlot },

    /// The template exists but failed to render
    #[error("Template render failed for {path}/{slot}: {reason}")]
    Render {
        path: String,
        slot: TemplateSlot,
        reason: String,
    },
}

impl RenderError {
    /// Whether this error is a missing-template condition, as opposed to a
    /// rendering failure. The dispatch engine downgrades `NotFound` for the
    /// HTML slot to a soft failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Abstraction over the template rendering engine.
///
/// Implementations must be safely callable from multiple concurrent tasks.
pub trait TemplateEngine: Send + Sync {
    /// Render one slot of a template path under the given locale.
    ///
    /// A missing template must be reported as `RenderError::NotFound` so
    /// callers can distinguish it from a rendering failure.
    fn render(
        &self,
        path: &str,
        slot: TemplateSlot,
        locale: &Locale,
        context: &RenderContext,
    ) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TemplateKey {
    path: String,
    slot: TemplateSlot,
    /// `None` is the locale-neutral fallback entry
    locale: Option<String>,
}

/// In-memory template engine with `{{variable}}` substitution.
///
/// Locale resolution policy: the exact-locale entry wins, then the
/// locale-neutral entry. Missing both is `NotFound`.
#[derive(Default)]
pub struct MemoryTemplateEngine {
    templates: DashMap<TemplateKey, String>,
}

impl MemoryTemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a locale-neutral template source for a (path, slot) pair
    pub fn register(&self, path: impl Into<String>, slot: TemplateSlot, source: impl Into<String>) {
        self.templates.insert(
            TemplateKey {
                path: path.into(),
                slot,
                locale: None,
            },
            source.into(),
        );
    }

    /// Register a template source for a specific locale
    pub fn register_localized(
        &self,
        path: impl Into<String>,
        slot: TemplateSlot,
        locale: impl Into<String>,
        source: impl Into<String>,
    ) {
        self.templates.insert(
            TemplateKey {
                path: path.into(),
                slot,
                locale: Some(locale.into()),
            },
            source.into(),
        );
    }

    /// Remove a locale-neutral template (used by tests to simulate missing slots)
    pub fn unregister(&self, path: &str, slot: TemplateSlot) {
        self.templates.remove(&TemplateKey {
            path: path.to_string(),
            slot,
            locale: None,
        });
    }

    fn lookup(&self, path: &str, slot: TemplateSlot, locale: &Locale) -> Option<String> {
        let localized = TemplateKey {
            path: path.to_string(),
            slot,
            locale: Some(locale.as_str().to_string()),
        };
        if let Some(source) = self.templates.get(&localized) {
            return Some(source.clone());
        }

        let neutral = TemplateKey {
            path: path.to_string(),
            slot,
            locale: None,
        };
        self.templates.get(&neutral).map(|source| source.clone())
    }
}

impl TemplateEngine for MemoryTemplateEngine {
    fn render(
        &self,
        path: &str,
        slot: TemplateSlot,
        locale: &Locale,
        context: &RenderContext,
    ) -> Result<String, RenderError> {
        let source = self
            .lookup(path, slot, locale)
            .ok_or_else(|| RenderError::NotFound {
                path: path.to_string(),
                slot,
            })?;

        Ok(substitute_string(&source, context))
    }
}

/// Substitute `{{variable}}` placeholders in a template source string.
///
/// Strings are inserted as-is; numbers, booleans and null use their display
/// form; arrays and objects use their JSON representation. Unknown
/// placeholders are left untouched.
pub fn substitute_string(template: &str, variables: &RenderContext) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let pattern = format!("{{{{{}}}}}", key);
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => "".to_string(),
            _ => value.to_string(),
        };
        result = result.replace(&pattern, &replacement);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(pairs: &[(&str, serde_json::Value)]) -> RenderContext {
        let mut ctx = RenderContext::new();
        for (key, value) in pairs {
            ctx.insert(key.to_string(), value.clone());
        }
        ctx
    }

    #[test]
    fn test_slot_file_names() {
        assert_eq!(TemplateSlot::Subject.file_name(), "short.txt");
        assert_eq!(TemplateSlot::Text.file_name(), "email.txt");
        assert_eq!(TemplateSlot::Html.file_name(), "email.html");
    }

    #[test]
    fn test_substitute_simple() {
        let ctx = context(&[("name", json!("World"))]);
        assert_eq!(substitute_string("Hello, {{name}}!", &ctx), "Hello, World!");
    }

    #[test]
    fn test_substitute_multiple() {
        let ctx = context(&[("order_id", json!("ORD-123")), ("carrier", json!("FedEx"))]);
        assert_eq!(
            substitute_string("Order {{order_id}} via {{carrier}}", &ctx),
            "Order ORD-123 via FedEx"
        );
    }

    #[test]
    fn test_substitute_number() {
        let ctx = context(&[("count", json!(42))]);
        assert_eq!(
            substitute_string("You have {{count}} items", &ctx),
            "You have 42 items"
        );
    }

    #[test]
    fn test_substitute_unknown_placeholder_untouched() {
        let ctx = context(&[]);
        assert_eq!(substitute_string("Hi {{name}}", &ctx), "Hi {{name}}");
    }

    #[test]
    fn test_render_neutral_template() {
        let engine = MemoryTemplateEngine::new();
        engine.register("welcome", TemplateSlot::Subject, "Welcome {{name}}");

        let ctx = context(&[("name", json!("Alice"))]);
        let rendered = engine
            .render("welcome", TemplateSlot::Subject, &Locale::new("en"), &ctx)
            .unwrap();
        assert_eq!(rendered, "Welcome Alice");
    }

    #[test]
    fn test_render_prefers_localized_template() {
        let engine = MemoryTemplateEngine::new();
        engine.register("welcome", TemplateSlot::Subject, "Welcome {{name}}");
        engine.register_localized("welcome", TemplateSlot::Subject, "fr", "Bienvenue {{name}}");

        let ctx = context(&[("name", json!("Alice"))]);

        let fr = engine
            .render("welcome", TemplateSlot::Subject, &Locale::new("fr"), &ctx)
            .unwrap();
        assert_eq!(fr, "Bienvenue Alice");

        let en = engine
            .render("welcome", TemplateSlot::Subject, &Locale::new("en"), &ctx)
            .unwrap();
        assert_eq!(en, "Welcome Alice");
    }

    #[test]
    fn test_render_missing_template() {
        let engine = MemoryTemplateEngine::new();
        let ctx = RenderContext::new();

        let err = engine
            .render("welcome", TemplateSlot::Html, &Locale::new("en"), &ctx)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unregister() {
        let engine = MemoryTemplateEngine::new();
        engine.register("welcome", TemplateSlot::Text, "body");
        engine.unregister("welcome", TemplateSlot::Text);

        let ctx = RenderContext::new();
        assert!(engine
            .render("welcome", TemplateSlot::Text, &Locale::new("en"), &ctx)
            .is_err());
    }
}
