//! Task feed API server library.
//!
//! Exposes config, state, error handling, routes and the WebSocket layer so
//! integration tests and the binary entrypoint share one router.

pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod realtime;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
