//! Request context
//!
//! Request-scoped metadata handed to every driver call. The core never looks
//! inside it; drivers may use it for auditing or vendor-side tagging.

use serde::{Deserialize, Serialize};

/// Opaque request-scoped metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique identifier for this request
    pub request_id: String,
    /// Authenticated user, if any
    #[serde(default)]
    pub user_id: Option<String>,
    /// Project / tenant scope, if any
    #[serde(default)]
    pub project_id: Option<String>,
    /// Whether the caller has admin rights
    #[serde(default)]
    pub is_admin: bool,
}

impl RequestContext {
    /// Create a context with a fresh request ID
    pub fn new() -> Self {
        Self {
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
            user_id: None,
            project_id: None,
            is_admin: false,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
