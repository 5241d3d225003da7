// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Components that manage objects in a shoot namespace of the seed.

use crate::error::Result;
use crate::types::shoot_state::ShootState;
use async_trait::async_trait;

pub mod monitoring;
pub mod worker;

/// Lifecycle of an extension resource owned by a component
#[async_trait]
pub trait DeployMigrateWaiter: Send {
    /// Create or update the resource
    async fn deploy(&mut self) -> Result<()>;
    /// Delete the resource
    async fn destroy(&mut self) -> Result<()>;
    /// Wait until the resource is ready
    async fn wait(&mut self) -> Result<()>;
    /// Wait until the resource is gone
    async fn wait_cleanup(&mut self) -> Result<()>;
    /// Recreate the resource from persisted state
    async fn restore(&mut self, shoot_state: &ShootState) -> Result<()>;
    /// Ask the extension controller to hand the resource over
    async fn migrate(&mut self) -> Result<()>;
    /// Wait until the hand-over has finished
    async fn wait_migrate(&mut self) -> Result<()>;
}
