use async_trait::async_trait;
use log::warn;
use thiserror::Error;

use crate::types::Container;

pub mod docker;
pub use docker::DockerRuntime;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to connect to the container runtime: {0}")]
    Connect(String),
    #[error("failed to list running containers: {0}")]
    List(String),
    #[error("failed to inspect container {id}: {reason}")]
    Inspect { id: String, reason: String },
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ids of the containers that are currently running.
    async fn list_running(&self) -> Result<Vec<String>, RuntimeError>;

    /// Labels and port bindings of a single container.
    async fn inspect(&self, id: &str) -> Result<Container, RuntimeError>;

    /// Snapshot of every running container for one poll.
    ///
    /// Only the listing call can fail the snapshot.  A container that
    /// cannot be inspected (it may have stopped in between) is skipped.
    async fn running_containers(&self) -> Result<Vec<Container>, RuntimeError> {
        let ids = self.list_running().await?;
        let mut containers = Vec::with_capacity(ids.len());
        for id in ids {
            match self.inspect(&id).await {
                Ok(container) => containers.push(container),
                Err(e) => warn!("Skipping container: {}", e),
            }
        }
        Ok(containers)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::fake::StaticRuntime;
    use super::*;

    #[tokio::test]
    async fn inspection_failures_skip_only_that_container() {
        let runtime = StaticRuntime::new(vec![
            Container::new("a"),
            Container::new("b"),
            Container::new("c"),
        ])
        .with_broken("b");

        let containers = runtime.running_containers().await.unwrap();
        let ids: Vec<&str> = containers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(runtime.inspections.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn listing_failure_aborts_the_snapshot() {
        let runtime = StaticRuntime::new(vec![Container::new("a")]);
        runtime.unreachable.store(true, Ordering::SeqCst);

        let err = runtime.running_containers().await.unwrap_err();
        assert!(matches!(err, RuntimeError::List(_)));
        assert_eq!(runtime.inspections.load(Ordering::SeqCst), 0);
    }
}
