//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All components produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters for rejections, transitions, retries)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON in production)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing, pretty for dev
//! - Metrics are cheap (atomic increments behind the `metrics` facade)

pub mod logging;
pub mod metrics;
