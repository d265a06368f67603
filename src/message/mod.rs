//! Message composition.
//!
//! The composer turns rendered template parts into one immutable
//! `ComposedMessage` per recipient: it normalizes the subject to a single
//! line, attaches the optional rich body, and applies the configured HTML
//! post-processing (e.g. style inlining) without ever touching the plain-text
//! body.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A fully rendered, ready-to-send message.
///
/// Immutable once built; consumed exactly once by the transport.
#[derive(Debug, Clone, Serialize)]
pub struct ComposedMessage {
    /// Unique identifier for this message
    pub id: Uuid,
    /// Single-line subject, no embedded line breaks
    pub subject: String,
    /// Plain-text body
    pub text_body: String,
    /// Optional rich HTML alternative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    /// Sender address
    pub from: String,
    /// Delivery targets (one per recipient, singleton in practice)
    pub to: Vec<String>,
    /// Extra headers attached to the message
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// When the message was composed
    pub composed_at: DateTime<Utc>,
}

impl ComposedMessage {
    /// Whether the message carries a rich HTML alternative
    pub fn has_html(&self) -> bool {
        self.html_body.is_some()
    }
}

/// Post-processing hook for the rich HTML body.
///
/// Style inlining lives behind this seam. Implementations must not depend on
/// or alter the plain-text body.
pub trait HtmlPostProcessor: Send + Sync {
    fn process(&self, html: &str) -> String;
}

/// Builds outbound messages from rendered template parts.
#[derive(Clone, Default)]
pub struct Composer {
    post_processor: Option<Arc<dyn HtmlPostProcessor>>,
    post_processing_enabled: bool,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an HTML post-processor. It only runs when enabled.
    pub fn with_post_processor(mut self, processor: Arc<dyn HtmlPostProcessor>) -> Self {
        self.post_processor = Some(processor);
        self
    }

    /// Toggle HTML post-processing on or off
    pub fn with_post_processing_enabled(mut self, enabled: bool) -> Self {
        self.post_processing_enabled = enabled;
        self
    }

    /// Compose one outbound message for a single recipient address.
    pub fn compose(
        &self,
        to: impl Into<String>,
        rendered_subject: &str,
        rendered_text: String,
        rendered_html: Option<String>,
        from: impl Into<String>,
        headers: HashMap<String, String>,
    ) -> ComposedMessage {
        let html_body = rendered_html.map(|html| {
            match (&self.post_processor, self.post_processing_enabled) {
                (Some(processor), true) => processor.process(&html),
                _ => html,
            }
        });

        ComposedMessage {
            id: Uuid::new_v4(),
            subject: normalize_subject(rendered_subject),
            text_body: rendered_text,
            html_body,
            from: from.into(),
            to: vec![to.into()],
            headers,
            composed_at: Utc::now(),
        }
    }
}

/// Collapse a rendered subject to a single line.
///
/// The subject is trimmed, then its lines are concatenated with no separator:
/// `"Hello\nWorld"` becomes `"HelloWorld"`, not `"Hello World"`.
pub fn normalize_subject(raw: &str) -> String {
    raw.trim().lines().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UppercaseProcessor;

    impl HtmlPostProcessor for UppercaseProcessor {
        fn process(&self, html: &str) -> String {
            html.to_uppercase()
        }
    }

    #[test]
    fn test_normalize_subject_single_line() {
        assert_eq!(normalize_subject("  Hello  "), "Hello");
    }

    #[test]
    fn test_normalize_subject_collapses_without_separator() {
        assert_eq!(normalize_subject("Hello\nWorld"), "HelloWorld");
        assert_eq!(normalize_subject("Hello\r\nWorld"), "HelloWorld");
        assert_ne!(normalize_subject("Hello\nWorld"), "Hello World");
    }

    #[test]
    fn test_normalize_subject_trailing_newline() {
        assert_eq!(normalize_subject("Welcome aboard\n"), "Welcome aboard");
    }

    #[test]
    fn test_compose_without_html() {
        let composer = Composer::new();
        let message = composer.compose(
            "alice@example.com",
            "Subject",
            "Body".to_string(),
            None,
            "noreply@example.com",
            HashMap::new(),
        );

        assert_eq!(message.subject, "Subject");
        assert_eq!(message.text_body, "Body");
        assert!(!message.has_html());
        assert_eq!(message.to, vec!["alice@example.com".to_string()]);
        assert_eq!(message.from, "noreply@example.com");
    }

    #[test]
    fn test_compose_post_processing_applies_to_html_only() {
        let composer = Composer::new()
            .with_post_processor(Arc::new(UppercaseProcessor))
            .with_post_processing_enabled(true);

        let message = composer.compose(
            "alice@example.com",
            "Subject",
            "text body".to_string(),
            Some("<p>hi</p>".to_string()),
            "noreply@example.com",
            HashMap::new(),
        );

        assert_eq!(message.html_body.as_deref(), Some("<P>HI</P>"));
        // the plain-text body is never post-processed
        assert_eq!(message.text_body, "text body");
    }

    #[test]
    fn test_compose_post_processing_disabled() {
        let composer = Composer::new()
            .with_post_processor(Arc::new(UppercaseProcessor))
            .with_post_processing_enabled(false);

        let message = composer.compose(
            "alice@example.com",
            "Subject",
            "text".to_string(),
            Some("<p>hi</p>".to_string()),
            "noreply@example.com",
            HashMap::new(),
        );

        assert_eq!(message.html_body.as_deref(), Some("<p>hi</p>"));
    }

    #[test]
    fn test_compose_headers_preserved() {
        let mut headers = HashMap::new();
        headers.insert("Reply-To".to_string(), "support@example.com".to_string());

        let message = Composer::new().compose(
            "a@b.com",
            "s",
            "t".to_string(),
            None,
            "f@b.com",
            headers,
        );

        assert_eq!(
            message.headers.get("Reply-To").map(String::as_str),
            Some("support@example.com")
        );
    }
}
