// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait for long-lived services wired up by the binary.

use async_trait::async_trait;

use crate::error::UnichatError;
use crate::types::HealthStatus;

/// Identity, health, and shutdown for a gateway service.
#[async_trait]
pub trait ServiceAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this service.
    fn name(&self) -> &str;

    /// Returns the semantic version of this service.
    fn version(&self) -> semver::Version;

    /// Performs a health check and returns the service's current status.
    async fn health_check(&self) -> Result<HealthStatus, UnichatError>;

    /// Stops background work owned by the service.
    async fn shutdown(&self) -> Result<(), UnichatError>;
}
