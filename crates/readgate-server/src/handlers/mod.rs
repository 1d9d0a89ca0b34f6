mod handler;
mod types;

pub use handler::{configure_routes, preflight, ApiDoc};
pub use types::*;
