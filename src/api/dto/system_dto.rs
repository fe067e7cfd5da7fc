//! DTOs for system endpoints.

use serde::Serialize;
use utoipa::ToSchema;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `"healthy"` while the hub answers, `"degraded"` otherwise.
    pub status: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Arenas with at least one live connection.
    pub arenas: usize,
    /// Live connections across all arenas.
    pub connections: usize,
}
