//! Laneguard: shipping-route disruption monitoring.
//!
//! Blends deterministic signal scoring with an LLM qualitative assessment
//! (`riskcore` + [`engine`]), then drives an idempotent, retrying alert
//! pipeline ([`dispatch`]). Collaborators — reasoning, storage, delivery,
//! ingestion, embeddings — are injectable traits so every failure path is
//! testable without a network.

pub mod config;
pub mod dispatch;
pub mod embed;
pub mod engine;
pub mod errors;
pub mod ingest;
pub mod mailer;
pub mod monitor;
pub mod reasoning;
pub mod report;
pub mod store;

pub use config::MonitorConfig;
pub use dispatch::AlertDispatcher;
pub use engine::{DecisionEngine, EngineSettings};
pub use errors::{DeliveryError, EngineError, ReasoningError};
pub use monitor::Monitor;
