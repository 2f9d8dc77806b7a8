//! HTTP and websocket surface
//!
//! The game runs over `/ws`; the remaining routes are read-only views of
//! history plus health and metrics.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use handlers::AppState;
pub use server::ApiServer;
