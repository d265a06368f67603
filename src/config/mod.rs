mod settings;

pub use settings::{DispatchConfig, LocaleStoreConfig, Settings, SiteConfig, TransportConfig};

/// Load settings from config files and the environment.
pub fn load() -> crate::error::Result<Settings> {
    Ok(Settings::new()?)
}
