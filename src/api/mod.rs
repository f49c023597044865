//! HTTP and WebSocket surface
//!
//! JSON endpoints over the bingo service, a filtered event stream and a
//! Prometheus scrape endpoint.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{build_app, shutdown_signal, ApiServer};
