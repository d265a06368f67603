use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub locale_store: LocaleStoreConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Run dispatch calls as detached background tasks
    #[serde(default)]
    pub background: bool,
    /// Suppress transport failures instead of surfacing them to the caller
    #[serde(default)]
    pub fail_silently: bool,
    /// Sender address used when a dispatch call does not override it
    #[serde(default = "default_from_address")]
    pub default_from: String,
    /// Ambient locale used when a recipient has no preference
    #[serde(default = "default_locale")]
    pub default_locale: String,
    /// Apply the configured HTML post-processor (e.g. style inlining)
    #[serde(default)]
    pub inline_styles: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site name exposed to templates
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Site base URL exposed to templates
    #[serde(default = "default_site_url")]
    pub url: String,
    /// Static asset base URL exposed to templates
    #[serde(default = "default_static_url")]
    pub static_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocaleStoreConfig {
    /// Whether locale preference lookup is enabled at all
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Transport backend: "log" (default) or "memory"
    #[serde(default = "default_transport_backend")]
    pub backend: String,
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_site_name() -> String {
    "localhost".to_string()
}

fn default_site_url() -> String {
    "http://localhost".to_string()
}

fn default_static_url() -> String {
    "/static/".to_string()
}

fn default_transport_backend() -> String {
    "log".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("dispatch.background", false)?
            .set_default("dispatch.fail_silently", false)?
            .set_default("dispatch.default_from", "noreply@localhost")?
            .set_default("dispatch.default_locale", "en")?
            .set_default("dispatch.inline_styles", false)?
            .set_default("site.name", "localhost")?
            .set_default("site.url", "http://localhost")?
            .set_default("site.static_url", "/static/")?
            .set_default("locale_store.enabled", false)?
            .set_default("transport.backend", "log")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // DISPATCH__FAIL_SILENTLY, DISPATCH__DEFAULT_FROM, SITE__NAME, etc.
            // The section separator is "__" so underscore-bearing keys like
            // fail_silently stay addressable.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            background: false,
            fail_silently: false,
            default_from: default_from_address(),
            default_locale: default_locale(),
            inline_styles: false,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            url: default_site_url(),
            static_url: default_static_url(),
        }
    }
}

impl Default for LocaleStoreConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: default_transport_backend(),
        }
    }
}
