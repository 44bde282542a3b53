//! Domain layer - Core types and port definitions
//!
//! This module defines the data model and the core traits (ports) that
//! adapters implement, following hexagonal architecture principles.

pub mod alert;
pub mod context;
pub mod ports;
pub mod storage;

pub use alert::*;
pub use context::*;
pub use ports::*;
pub use storage::*;
