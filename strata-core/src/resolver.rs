//! Duplicate resolution contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::AccessRequest;

/// Canonical request produced by a resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub request: AccessRequest,
    /// Number of overlapping sub-requests collapsed into `request`
    pub duplicates_resolved: u32,
}

impl Resolution {
    /// Resolution that leaves the request untouched
    pub fn unchanged(request: AccessRequest) -> Self {
        Self {
            request,
            duplicates_resolved: 0,
        }
    }
}

/// Collapses overlapping sub-requests into one canonical request.
#[async_trait]
pub trait DuplicateResolver: Send + Sync {
    async fn resolve(&self, req: &AccessRequest) -> Result<Resolution>;
}

/// Resolver that returns every request as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughResolver;

#[async_trait]
impl DuplicateResolver for PassthroughResolver {
    async fn resolve(&self, req: &AccessRequest) -> Result<Resolution> {
        Ok(Resolution::unchanged(req.clone()))
    }
}
