//! Rate-limited, retrying model gateway

mod pacer;
mod rate_limited;
mod retry;

pub use pacer::DispatchPacer;
pub use rate_limited::{GatewayConfig, RateLimitedGateway};
pub use retry::RetryPolicy;
