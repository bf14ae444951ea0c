pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, CategoryLimit, LimitStrategy, LimitTable, ServerConfig};
pub use error::{VestguardError, VestguardResult};
pub use types::{CallerKey, EndpointCategory, SessionId};
