// Signed query API
//
// Every action is a GET against one endpoint, authenticated with an
// HMAC-SHA256 signature over the sorted parameter list. Array arguments
// are flattened into `name.N.field` keys.

mod backend;
mod client;
mod listener;
mod load_balancer;
pub mod models;

pub use client::RestClient;

/// Error code returned when the caller exceeds the request quota.
pub const CODE_RATE_LIMITED: &str = "4400";

/// Error code returned while the load balancer is processing another task.
pub const CODE_LB_BUSY: &str = "4006";
