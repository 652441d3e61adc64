//! Core types - shared state primitives.

mod state;
mod trigger;

pub use state::{is_shutdown, register_server, request_shutdown, setup_shutdown_handler};
pub use trigger::PendingTrigger;
