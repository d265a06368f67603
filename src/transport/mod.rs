//! Outbound transport abstraction.
//!
//! The transport accepts a composed message and attempts delivery. Actual
//! SMTP/HTTP delivery is out of scope for this crate; the built-in backends
//! are a logging stub and an in-memory recorder used in tests.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::TransportConfig;
use crate::message::ComposedMessage;

/// Errors from a delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport rejected or failed to deliver the message
    #[error("Delivery failed for {recipient}: {reason}")]
    Failed { recipient: String, reason: String },

    /// The transport is not accepting messages
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Abstraction over the outbound delivery channel.
///
/// Implementations must be safely callable from multiple concurrent tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt delivery of a composed message. Succeeds silently.
    async fn send(&self, message: &ComposedMessage) -> Result<(), DeliveryError>;
}

/// Transport stub that logs each message instead of delivering it.
#[derive(Default)]
pub struct LogTransport;

impl LogTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &ComposedMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            message_id = %message.id,
            to = ?message.to,
            subject = %message.subject,
            has_html = message.has_html(),
            "Message handed to log transport"
        );
        Ok(())
    }
}

/// In-memory transport that records every sent message.
///
/// Delivery failures can be programmed per recipient address or globally,
/// which tests use to exercise the fail-silently and partial-failure paths.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<ComposedMessage>>,
    failing_addresses: dashmap::DashSet<String>,
    fail_all: std::sync::atomic::AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries to one address fail
    pub fn fail_for(&self, address: impl Into<String>) {
        self.failing_addresses.insert(address.into());
    }

    /// Make every delivery fail
    pub fn fail_all(&self, fail: bool) {
        self.fail_all
            .store(fail, std::sync::atomic::Ordering::Relaxed);
    }

    /// Messages recorded so far, in delivery order
    pub async fn sent_messages(&self) -> Vec<ComposedMessage> {
        self.sent.lock().await.clone()
    }

    /// Number of messages recorded so far
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, message: &ComposedMessage) -> Result<(), DeliveryError> {
        let recipient = message
            .to
            .first()
            .cloned()
            .unwrap_or_else(|| "<none>".to_string());

        if self.fail_all.load(std::sync::atomic::Ordering::Relaxed)
            || self.failing_addresses.contains(&recipient)
        {
            return Err(DeliveryError::Failed {
                recipient,
                reason: "programmed failure".to_string(),
            });
        }

        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Create a transport based on configuration.
///
/// Returns the backend selected by the `backend` setting:
/// - `"memory"`: an in-memory recording transport
/// - `"log"` (default): a transport that logs each message
pub fn create_transport(settings: &TransportConfig) -> Arc<dyn Transport> {
    match settings.backend.as_str() {
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory transport");
            Arc::new(MemoryTransport::new())
        }
        "log" => {
            tracing::info!(backend = "log", "Creating log transport");
            Arc::new(LogTransport::new())
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown transport backend, falling back to log"
            );
            Arc::new(LogTransport::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Composer;
    use std::collections::HashMap;

    fn test_message(to: &str) -> ComposedMessage {
        Composer::new().compose(
            to,
            "Subject",
            "Body".to_string(),
            None,
            "noreply@example.com",
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn test_memory_transport_records_messages() {
        let transport = MemoryTransport::new();

        transport.send(&test_message("a@example.com")).await.unwrap();
        transport.send(&test_message("b@example.com")).await.unwrap();

        assert_eq!(transport.sent_count().await, 2);
        let sent = transport.sent_messages().await;
        assert_eq!(sent[0].to, vec!["a@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_transport_programmed_failure() {
        let transport = MemoryTransport::new();
        transport.fail_for("bad@example.com");

        let err = transport
            .send(&test_message("bad@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Failed { .. }));

        transport.send(&test_message("ok@example.com")).await.unwrap();
        assert_eq!(transport.sent_count().await, 1);
    }

    #[tokio::test]
    async fn test_log_transport_always_succeeds() {
        let transport = LogTransport::new();
        assert!(transport.send(&test_message("a@example.com")).await.is_ok());
    }

    #[test]
    fn test_factory_fallback() {
        let config = TransportConfig {
            backend: "smtp".to_string(),
        };
        // Unknown backends fall back to the log transport
        let _transport = create_transport(&config);
    }
}
