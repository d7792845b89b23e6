pub mod hex;
pub mod logger;
pub mod metrics;
pub mod retry;
