//! The seam to the OCI runtime that actually runs container tasks.

use std::time::Duration;

use async_trait::async_trait;

use crate::EdgeboxResult;

use super::Container;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Runs and stops container tasks.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Starts the container's task inside its prepared sandbox and returns the task's pid.
    async fn start_task(&self, container: &Container) -> EdgeboxResult<u32>;

    /// Stops the container's task, killing it once `timeout` elapses.
    async fn stop_task(&self, container: &Container, timeout: Duration) -> EdgeboxResult<()>;

    /// Whether the container's task is still alive.
    async fn is_running(&self, container: &Container) -> EdgeboxResult<bool>;
}
