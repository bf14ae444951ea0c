pub mod health;
pub mod limiter;
pub mod metrics;
pub mod sessions;
pub mod stats;
