//! Alert Pipeline
//!
//! Normalization of raw vendor alerts and the exporters that receive the
//! finished canonical alerts.

pub mod exporter;
pub mod normalizer;

pub use exporter::*;
pub use normalizer::*;
