// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain layer (business logic)
pub mod dispatch;
pub mod locale;
pub mod message;
pub mod recipient;
pub mod template;
pub mod transport;

pub use dispatch::{DispatchOutcome, DispatchReport, DispatchRequest, DispatchStatus, Dispatcher};
pub use error::{DispatchError, Result};
pub use locale::{Locale, LocaleResolver, LocaleStore};
pub use message::{ComposedMessage, Composer};
pub use recipient::{Recipient, UserRef};
pub use template::{RenderContext, TemplateEngine, TemplateSlot};
pub use transport::Transport;
