//! Request-validation-and-forwarding pipeline for the database proxy.
//!
//! Flow per request:
//! normalizer (mode detection, canonicalization) -> pipeline gates
//! (danger check, table policy) -> forwarder (upstream call).

pub mod danger;
pub mod forwarder;
pub mod normalizer;
pub mod pipeline;
pub mod tables;
pub mod types;

pub use pipeline::PolicyPipeline;
pub use types::{DangerAssessment, ProxyRequest, RpcPayload, TableAccessDecision, UpstreamResult};
