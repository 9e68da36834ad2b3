//! Reconciliation engine between ingress rules and a cloud load balancer.
//!
//! Every cycle the controller converges the listeners of one managed load
//! balancer onto the rules declared by ingress objects:
//!
//! - **[`Updater`]**: Adopts or creates the load balancer once, then runs
//!   validate → generate → diff → apply cycles and keeps the
//!   [`ListenerStore`] in line with what the cloud acknowledged.
//!
//! - **[`CloudAdapter`]**: One object-safe interface over the provider
//!   APIs. [`RestAdapter`](cloud::RestAdapter) speaks the signed query API,
//!   [`SdkAdapter`](cloud::SdkAdapter) the JSON action API. Both wrap every
//!   call in a [`RetryPolicy`](cloud::RetryPolicy).
//!
//! - **[`Scheduler`]**: Periodic single-flight driver: a tick that finds
//!   a cycle still running is dropped.
//!
//! - **[`HealthPoller`]**: Read-only poller publishing backend health
//!   through the injected [`MetricsSink`].
//!
//! - **Domain model** ([`model`]): Listener, rule, target group and
//!   backend value types with their pure diff functions.

pub mod cloud;
pub mod config;
pub mod diff;
pub mod error;
pub mod generator;
pub mod health;
pub mod metrics;
pub mod model;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod updater;
pub mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cloud::{BackendHealth, CloudAdapter, ListenerLookup, connect};
pub use config::{CloudProvider, ControllerConfig, LoadBalancerConfig, RetryConfig, TlsVerification};
pub use error::CoreError;
pub use generator::ListenerGenerator;
pub use health::HealthPoller;
pub use metrics::{ApplyAction, MetricsSink, NoopMetrics, PrometheusMetrics};
pub use scheduler::{Reconcile, Scheduler};
pub use source::{BackendResolver, IngressSource};
pub use store::ListenerStore;
pub use updater::{CycleReport, Updater};
pub use validate::{Conflict, validate};

pub use lbsync_api::Credentials;
