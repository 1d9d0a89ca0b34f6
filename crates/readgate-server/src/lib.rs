//! HTTP surface of the read-only query gateway.
//!
//! Requests pass the access gate, are normalized and validated, run on the
//! configured backend adapter, and come back in a uniform envelope.

pub mod config;
pub mod envelope;
pub mod error;
pub mod gate;
pub mod handlers;

pub use config::{ConfigError, GatewayConfig};
pub use envelope::{Envelope, ResponseEnvelope};
pub use error::{GateRejection, GatewayError};
pub use gate::{AccessGate, AllowList, IpNetwork};
pub use handlers::{configure_routes, ApiDoc, GatewayState};
