use thiserror::Error;

use crate::template::RenderError;
use crate::transport::DeliveryError;

/// Crate-level error type.
///
/// Dispatch failures are always scoped to a single recipient; the variants
/// carry the delivery address they apply to.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A hard-fail template slot (subject or text) could not be rendered
    #[error("Template error for {recipient}: {source}")]
    Template {
        recipient: String,
        #[source]
        source: RenderError,
    },

    /// The transport reported a delivery failure and fail-silently was off
    #[error("Delivery error for {recipient}: {source}")]
    Delivery {
        recipient: String,
        #[source]
        source: DeliveryError,
    },
}

pub type Result<T> = std::result::Result<T, DispatchError>;
