//! Dispatch engine.
//!
//! Orchestrates the per-recipient pipeline: resolve the recipient's locale
//! preference, build the per-recipient render context, render the subject,
//! text, and optional HTML slots, compose the message, and hand it to the
//! transport. Recipients are processed independently; one recipient's failure
//! never prevents processing of subsequent recipients.
//!
//! The locale is threaded explicitly into every render call instead of living
//! in process-wide mutable state, so concurrent dispatch calls cannot observe
//! each other's locale and the caller's ambient locale is never disturbed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::{DispatchConfig, SiteConfig};
use crate::error::DispatchError;
use crate::locale::{Locale, LocaleResolver};
use crate::message::Composer;
use crate::metrics::DispatchMetrics;
use crate::recipient::Recipient;
use crate::template::{RenderContext, TemplateEngine, TemplateSlot};
use crate::transport::Transport;

/// One invocation of the engine over a batch of recipients sharing a template
/// path and base context.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Recipients to process, in order
    pub recipients: Vec<Recipient>,
    /// Logical template path (e.g. "welcome")
    pub template_path: String,
    /// Caller-supplied base context, copied per recipient
    pub context: RenderContext,
    /// Sender override; falls back to the configured default
    pub from: Option<String>,
    /// Fail-silently override; falls back to the configured default
    pub fail_silently: Option<bool>,
    /// Extra headers attached to every composed message
    pub extra_headers: HashMap<String, String>,
}

impl DispatchRequest {
    pub fn new(template_path: impl Into<String>) -> Self {
        Self {
            recipients: Vec::new(),
            template_path: template_path.into(),
            context: RenderContext::new(),
            from: None,
            fail_silently: None,
            extra_headers: HashMap::new(),
        }
    }

    /// Add a recipient
    pub fn recipient(mut self, recipient: impl Into<Recipient>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Add multiple recipients
    pub fn recipients(mut self, recipients: impl IntoIterator<Item = Recipient>) -> Self {
        self.recipients.extend(recipients);
        self
    }

    /// Set a base context value
    pub fn context_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Replace the base context
    pub fn context(mut self, context: RenderContext) -> Self {
        self.context = context;
        self
    }

    /// Override the sender address
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Override the fail-silently policy for this call
    pub fn fail_silently(mut self, fail_silently: bool) -> Self {
        self.fail_silently = Some(fail_silently);
        self
    }

    /// Attach an extra header to every composed message
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }
}

/// Terminal state of one recipient within a dispatch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// The composed message reached the transport successfully
    Delivered,
    /// Rendering or delivery hard-failed for this recipient
    Failed { reason: String },
    /// A transport failure was suppressed by the fail-silently policy
    Suppressed { reason: String },
}

/// Per-recipient result of a dispatch call.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// Delivery address of the recipient
    pub recipient: String,
    /// Terminal state
    #[serde(flatten)]
    pub status: DispatchStatus,
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, DispatchStatus::Delivered)
    }
}

/// Aggregated result of a dispatch call.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    /// Identifier of this dispatch call
    pub dispatch_id: Uuid,
    /// Per-recipient outcomes, in dispatch-call order
    pub outcomes: Vec<DispatchOutcome>,
    /// Recipients delivered successfully
    pub delivered: usize,
    /// Recipients that hard-failed
    pub failed: usize,
    /// Transport failures suppressed by fail-silently
    pub suppressed: usize,
    /// Whether every recipient was delivered
    pub success: bool,
}

impl DispatchReport {
    fn new(dispatch_id: Uuid, outcomes: Vec<DispatchOutcome>) -> Self {
        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o.status, DispatchStatus::Failed { .. }))
            .count();
        let suppressed = outcomes
            .iter()
            .filter(|o| matches!(o.status, DispatchStatus::Suppressed { .. }))
            .count();
        let success = failed == 0 && suppressed == 0;

        Self {
            dispatch_id,
            outcomes,
            delivered,
            failed,
            suppressed,
            success,
        }
    }
}

/// Statistics for the dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Total dispatch calls started
    pub dispatches: AtomicU64,
    /// Recipients delivered successfully
    pub recipients_delivered: AtomicU64,
    /// Recipients that hard-failed
    pub recipients_failed: AtomicU64,
    /// Transport failures suppressed by fail-silently
    pub recipients_suppressed: AtomicU64,
    /// Messages sent without a rich body because the HTML template was missing
    pub html_fallbacks: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            recipients_delivered: self.recipients_delivered.load(Ordering::Relaxed),
            recipients_failed: self.recipients_failed.load(Ordering::Relaxed),
            recipients_suppressed: self.recipients_suppressed.load(Ordering::Relaxed),
            html_fallbacks: self.html_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub dispatches: u64,
    pub recipients_delivered: u64,
    pub recipients_failed: u64,
    pub recipients_suppressed: u64,
    pub html_fallbacks: u64,
}

/// Dispatches templated messages to batches of recipients.
///
/// Cloning is cheap: template engine, transport, and statistics are shared
/// behind `Arc`, which is what lets a dispatch call detach into a background
/// task.
#[derive(Clone)]
pub struct Dispatcher {
    templates: Arc<dyn TemplateEngine>,
    transport: Arc<dyn Transport>,
    locale_resolver: LocaleResolver,
    composer: Composer,
    dispatch_config: DispatchConfig,
    site: SiteConfig,
    stats: Arc<DispatcherStats>,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration and no locale store.
    pub fn new(templates: Arc<dyn TemplateEngine>, transport: Arc<dyn Transport>) -> Self {
        Self {
            templates,
            transport,
            locale_resolver: LocaleResolver::disabled(),
            composer: Composer::new(),
            dispatch_config: DispatchConfig::default(),
            site: SiteConfig::default(),
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    /// Attach a locale resolver
    pub fn with_locale_resolver(mut self, resolver: LocaleResolver) -> Self {
        self.locale_resolver = resolver;
        self
    }

    /// Replace the composer (e.g. to attach an HTML post-processor)
    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = composer;
        self
    }

    /// Apply dispatch configuration
    pub fn with_dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.composer = self
            .composer
            .with_post_processing_enabled(config.inline_styles);
        self.dispatch_config = config;
        self
    }

    /// Apply site metadata exposed to templates
    pub fn with_site_config(mut self, site: SiteConfig) -> Self {
        self.site = site;
        self
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// The locale used when a recipient has no preference.
    pub fn ambient_locale(&self) -> Locale {
        Locale::new(&self.dispatch_config.default_locale)
    }

    /// Dispatch synchronously, processing recipients in order.
    ///
    /// Every recipient is processed even when earlier ones fail; the report
    /// always contains one outcome per recipient. After the batch completes,
    /// the first hard failure is propagated unless it was a transport failure
    /// suppressed by fail-silently. Template failures for the subject or text
    /// slot are never suppressed.
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, request),
        fields(
            template_path = %request.template_path,
            recipient_count = request.recipients.len()
        )
    )]
    pub async fn dispatch(&self, request: DispatchRequest) -> crate::Result<DispatchReport> {
        let (report, first_error) = self.run(request).await;

        match first_error {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Dispatch as a detached background task.
    ///
    /// One task is spawned per dispatch call; it processes all recipients
    /// sequentially within that task. Failures are terminal to the task and
    /// observable only via logging and metrics. The returned handle is the
    /// deliberate panic-observability decision: callers may await it (tests
    /// do), and dropping it detaches the task entirely.
    pub fn dispatch_detached(
        &self,
        request: DispatchRequest,
    ) -> tokio::task::JoinHandle<DispatchReport> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let template_path = request.template_path.clone();
            let (report, first_error) = dispatcher.run(request).await;

            if let Some(error) = first_error {
                tracing::error!(
                    dispatch_id = %report.dispatch_id,
                    template_path = %template_path,
                    error = %error,
                    "Background dispatch completed with failures"
                );
            }

            report
        })
    }

    /// Primary entry point honoring the configured background toggle.
    ///
    /// Returns `Ok(Some(report))` in synchronous mode. In background mode the
    /// call returns `Ok(None)` as soon as the task is scheduled; per-recipient
    /// outcomes are not reported back.
    pub async fn send_templated(
        &self,
        request: DispatchRequest,
    ) -> crate::Result<Option<DispatchReport>> {
        if self.dispatch_config.background {
            let handle = self.dispatch_detached(request);
            drop(handle);
            Ok(None)
        } else {
            self.dispatch(request).await.map(Some)
        }
    }

    async fn run(&self, request: DispatchRequest) -> (DispatchReport, Option<DispatchError>) {
        let dispatch_id = Uuid::new_v4();
        let fail_silently = request
            .fail_silently
            .unwrap_or(self.dispatch_config.fail_silently);
        let from = request
            .from
            .clone()
            .unwrap_or_else(|| self.dispatch_config.default_from.clone());
        let ambient = self.ambient_locale();

        self.stats.dispatches.fetch_add(1, Ordering::Relaxed);
        DispatchMetrics::record_dispatch();

        let mut outcomes = Vec::with_capacity(request.recipients.len());
        let mut first_error = None;

        for recipient in &request.recipients {
            let (outcome, error) = self
                .deliver_one(
                    recipient,
                    &request.template_path,
                    &request.context,
                    &from,
                    &request.extra_headers,
                    fail_silently,
                    &ambient,
                )
                .await;

            match &outcome.status {
                DispatchStatus::Delivered => {
                    self.stats
                        .recipients_delivered
                        .fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_delivered();
                }
                DispatchStatus::Failed { .. } => {
                    self.stats.recipients_failed.fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_failed();
                }
                DispatchStatus::Suppressed { .. } => {
                    self.stats
                        .recipients_suppressed
                        .fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_suppressed();
                }
            }

            if first_error.is_none() {
                first_error = error;
            }
            outcomes.push(outcome);
        }

        let report = DispatchReport::new(dispatch_id, outcomes);

        tracing::debug!(
            dispatch_id = %dispatch_id,
            template_path = %request.template_path,
            delivered = report.delivered,
            failed = report.failed,
            suppressed = report.suppressed,
            "Dispatch call completed"
        );

        (report, first_error)
    }

    /// Process a single recipient through the full pipeline.
    ///
    /// Returns the outcome plus the propagatable error, if any. The error is
    /// separate from the outcome so the batch can keep processing and still
    /// surface the first failure afterwards.
    #[allow(clippy::too_many_arguments)]
    async fn deliver_one(
        &self,
        recipient: &Recipient,
        template_path: &str,
        base_context: &RenderContext,
        from: &str,
        extra_headers: &HashMap<String, String>,
        fail_silently: bool,
        ambient: &Locale,
    ) -> (DispatchOutcome, Option<DispatchError>) {
        let address = recipient.delivery_address().to_string();

        // Step 1: locale preference, degrading to the ambient locale
        let locale = self
            .locale_resolver
            .resolve(recipient)
            .await
            .unwrap_or_else(|| ambient.clone());

        // Step 2: per-recipient context, a fresh copy of the base
        let context = self.build_context(base_context, recipient, &address);

        // Step 3: render the hard-fail slots
        let subject = match self
            .templates
            .render(template_path, TemplateSlot::Subject, &locale, &context)
        {
            Ok(rendered) => rendered,
            Err(source) => return self.template_failure(address, source),
        };

        let text = match self
            .templates
            .render(template_path, TemplateSlot::Text, &locale, &context)
        {
            Ok(rendered) => rendered,
            Err(source) => return self.template_failure(address, source),
        };

        // Soft-fail slot: a missing HTML template downgrades to plain text
        let html = match self
            .templates
            .render(template_path, TemplateSlot::Html, &locale, &context)
        {
            Ok(rendered) => Some(rendered),
            Err(source) if source.is_not_found() => {
                self.stats.html_fallbacks.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_html_fallback();
                tracing::info!(
                    recipient = %address,
                    template_path = %template_path,
                    slot = %TemplateSlot::Html,
                    "Sending without HTML alternative, template not found"
                );
                None
            }
            Err(source) => return self.template_failure(address, source),
        };

        // Step 4: compose
        let message = self.composer.compose(
            address.clone(),
            &subject,
            text,
            html,
            from,
            extra_headers.clone(),
        );

        // Step 5: transport handoff
        match self.transport.send(&message).await {
            Ok(()) => {
                tracing::debug!(
                    recipient = %address,
                    message_id = %message.id,
                    locale = %locale,
                    "Message delivered"
                );
                (
                    DispatchOutcome {
                        recipient: address,
                        status: DispatchStatus::Delivered,
                    },
                    None,
                )
            }
            Err(source) if fail_silently => {
                tracing::warn!(
                    recipient = %address,
                    error = %source,
                    "Delivery failed, suppressed by fail-silently"
                );
                (
                    DispatchOutcome {
                        recipient: address,
                        status: DispatchStatus::Suppressed {
                            reason: source.to_string(),
                        },
                    },
                    None,
                )
            }
            Err(source) => {
                tracing::warn!(
                    recipient = %address,
                    error = %source,
                    "Delivery failed"
                );
                let reason = source.to_string();
                let error = DispatchError::Delivery {
                    recipient: address.clone(),
                    source,
                };
                (
                    DispatchOutcome {
                        recipient: address,
                        status: DispatchStatus::Failed { reason },
                    },
                    Some(error),
                )
            }
        }
    }

    fn build_context(
        &self,
        base_context: &RenderContext,
        recipient: &Recipient,
        address: &str,
    ) -> RenderContext {
        let mut context = base_context.clone();
        context.insert("recipient".to_string(), json!(recipient.to_string()));
        context.insert("email".to_string(), json!(address));
        context.insert("site_name".to_string(), json!(self.site.name));
        context.insert("site_url".to_string(), json!(self.site.url));
        context.insert("static_url".to_string(), json!(self.site.static_url));
        context
    }

    fn template_failure(
        &self,
        address: String,
        source: crate::template::RenderError,
    ) -> (DispatchOutcome, Option<DispatchError>) {
        tracing::warn!(
            recipient = %address,
            error = %source,
            "Rendering failed for hard-fail slot"
        );
        let reason = source.to_string();
        let error = DispatchError::Template {
            recipient: address.clone(),
            source,
        };
        (
            DispatchOutcome {
                recipient: address,
                status: DispatchStatus::Failed { reason },
            },
            Some(error),
        )
    }
}
