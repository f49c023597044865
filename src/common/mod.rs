//! Common utilities and shared functionality
//!
//! Identifiers, time sources and the storage/scheduling seams shared by the
//! engine components.

pub mod types;
pub mod config;
pub mod traits;
