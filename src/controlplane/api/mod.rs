//! API Module
//!
//! REST API for alert ingestion, storage registration and inventory queries.

pub mod server;
pub mod rest;

pub use server::*;
pub use rest::*;
