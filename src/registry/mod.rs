//! Driver Registry Module
//!
//! Owns the mapping from storage system id to live vendor session, with
//! at-most-one-session-per-system semantics and lifecycle events.

pub mod driver_registry;
pub mod events;

pub use driver_registry::*;
pub use events::*;
