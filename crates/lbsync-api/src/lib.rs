// lbsync-api: Async Rust clients for cloud load balancer APIs.
//
// Two wire flavours share one error type and one transport config:
// the signed query-string API (`rest`) and the JSON SDK API (`sdk`).
// Neither client knows about listeners-as-domain-objects; `lbsync-core`
// converts between these wire types and its own model.

pub mod auth;
pub mod error;
pub mod rest;
pub mod sdk;
pub mod task;
pub mod transport;

pub use auth::Credentials;
pub use error::Error;
pub use rest::RestClient;
pub use sdk::SdkClient;
pub use task::{Created, TaskStatus};
pub use transport::{TlsMode, TransportConfig};
