//! HTTP endpoint handlers.
//!
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: cache freshness check
//! - `/templates`: extracted config templates as JSON
//! - `/doc`: documentation endpoint

pub mod doc;
pub mod health;
pub mod metrics;
pub mod templates;

pub use doc::doc_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use templates::templates_handler;
