pub mod rate_limit;
pub mod request_log;
pub mod sanitize;

pub use rate_limit::{client_ip, RateLimiter, TokenBucketLimiter};
