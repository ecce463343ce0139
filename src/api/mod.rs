//! HTTP surface: router, shared state and request handlers.
pub mod handlers;
pub mod routes;

pub use routes::{router, AppState};
