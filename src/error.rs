//! Errors raised while walking or resolving NSX-T resources
//!
//! Transport-level failures live in [`crate::nsxt::http::NsxtError`]. This
//! type attaches the resource kind being processed, which is what the
//! execution log reports back as `resourceType`.

use crate::nsxt::http::NsxtError;

/// Failure tied to one resource kind (`tier0`, `interfaces`, `BGP`, ...)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ResourceError {
    pub resource_type: String,
    pub message: String,
}

impl ResourceError {
    pub fn new(resource_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }

    /// Wrap a transport error, keeping its user-facing message
    pub fn from_nsxt(resource_type: &str, error: &NsxtError) -> Self {
        Self::new(resource_type, error.to_string())
    }
}
