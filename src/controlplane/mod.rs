//! Control Plane Module
//!
//! Storage system lifecycle management and the HTTP API that exposes it
//! together with alert ingestion.

pub mod api;
pub mod manager;

pub use api::*;
pub use manager::*;
