//! Shared application state.
//!
//! Everything here is immutable after boot except the rate-limiter
//! counters, which live behind their own lock.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::middleware::{RateLimiter, TokenBucketLimiter};
use crate::proxy::forwarder::Forwarder;
use crate::proxy::PolicyPipeline;
use crate::services::ai::{provider_from_config, AiProvider};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub forwarder: Arc<Forwarder>,
    pub pipeline: Arc<PolicyPipeline>,
    pub limiter: Arc<dyn RateLimiter>,
    pub ai: Option<Arc<dyn AiProvider>>,
}

impl AppState {
    pub fn from_config(config: AppConfig) -> Result<Self, reqwest::Error> {
        let forwarder = Arc::new(Forwarder::new(&config.upstream)?);
        let pipeline = Arc::new(PolicyPipeline::new(&config, forwarder.clone()));
        let limiter = Arc::new(TokenBucketLimiter::new(
            config.rate_limit.requests,
            config.rate_limit.window_secs,
        ));
        let ai = provider_from_config(&config.ai);

        Ok(Self { config: Arc::new(config), forwarder, pipeline, limiter, ai })
    }
}
