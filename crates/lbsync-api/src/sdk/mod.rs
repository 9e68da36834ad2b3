// JSON SDK API
//
// Request and response bodies are PascalCase JSON wrapped in a
// `{"Response": {...}}` envelope; failures carry `Response.Error`.

mod client;
pub mod types;

pub use client::SdkClient;

/// Error code returned when the caller exceeds the request quota.
pub const CODE_RATE_LIMITED: &str = "RequestLimitExceeded";

/// Error code returned while the load balancer is processing another task.
pub const CODE_LB_BUSY: &str = "FailedOperation.ResourceInOperation";
