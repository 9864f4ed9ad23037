//! The poll-and-push cycle and the loop that drives it.

use std::future::Future;
use std::time::Duration;

use log::{debug, error, info};
use thiserror::Error;
use tokio::time::sleep;

use crate::backends::{aggregate, payload};
use crate::config::DiscoveryConfig;
use crate::marco::{PublishError, Publisher};
use crate::runtime::{ContainerRuntime, RuntimeError};

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// What a successful poll pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub containers: usize,
    pub unlabelled: usize,
    pub domains: usize,
    pub addresses: usize,
}

pub struct Agent<R, P> {
    runtime: R,
    publisher: P,
    discovery: DiscoveryConfig,
}

impl<R, P> Agent<R, P>
where
    R: ContainerRuntime,
    P: Publisher,
{
    pub fn new(runtime: R, publisher: P, discovery: DiscoveryConfig) -> Self {
        Self {
            runtime,
            publisher,
            discovery,
        }
    }

    /// Inspects the host, rebuilds the backend mapping and pushes it.
    pub async fn poll(&self) -> Result<PollReport, PollError> {
        let containers = self.runtime.running_containers().await?;
        let aggregation = aggregate(&containers, &self.discovery);
        debug!("Backend mapping: {:?}", aggregation.mapping);

        let backends = payload(&aggregation.mapping);
        self.publisher.send(&backends).await?;

        Ok(PollReport {
            containers: aggregation.containers,
            unlabelled: aggregation.unlabelled,
            domains: backends.len(),
            addresses: backends.iter().map(|b| b.list.len()).sum(),
        })
    }

    async fn tick(&self) {
        info!("Started pushing data to Marco.");
        match self.poll().await {
            Ok(report) => info!(
                "Successfully pushed data to Marco: {} domains, {} addresses from {} containers ({} without compose labels).",
                report.domains, report.addresses, report.containers, report.unlabelled
            ),
            Err(e) => error!("Failed to push data to Marco: {}", e),
        }
    }

    /// Polls, then waits `interval`, until `shutdown` resolves.  A cycle
    /// always finishes before the wait for the next one starts.
    pub async fn run<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = async {
                    self.tick().await;
                    sleep(interval).await;
                } => {}
            }
        }
        info!("Stopped pushing data to Marco.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marco::fake::RecordingPublisher;
    use crate::runtime::fake::StaticRuntime;
    use crate::types::{Container, ExposedPort, HostBinding};
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;

    fn discovery() -> DiscoveryConfig {
        DiscoveryConfig {
            allowed_ports: BTreeSet::from([80]),
            ..Default::default()
        }
    }

    fn web(id: &str, host_port: &str) -> Container {
        Container::new(id)
            .with_label("io.docker.compose.project", "shop")
            .with_label("io.docker.compose.service", "web")
            .with_port(
                ExposedPort::tcp(80),
                vec![HostBinding::new("0.0.0.0", host_port)],
            )
    }

    fn agent(runtime: StaticRuntime) -> Agent<StaticRuntime, RecordingPublisher> {
        Agent::new(runtime, RecordingPublisher::default(), discovery())
    }

    #[tokio::test]
    async fn poll_pushes_the_merged_mapping() {
        let agent = agent(StaticRuntime::new(vec![
            web("a", "32768"),
            web("b", "32769"),
            Container::new("c"),
        ]));

        let report = agent.poll().await.unwrap();
        assert_eq!(
            report,
            PollReport {
                containers: 3,
                unlabelled: 1,
                domains: 1,
                addresses: 2,
            }
        );

        let sent = agent.publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0].domain, "shop-web");
        assert_eq!(
            sent[0][0].list,
            vec!["http://127.0.0.1:32768", "http://127.0.0.1:32769"]
        );
    }

    #[tokio::test]
    async fn consecutive_polls_push_identical_payloads() {
        let agent = agent(StaticRuntime::new(vec![web("a", "32768"), web("b", "32769")]));
        agent.poll().await.unwrap();
        agent.poll().await.unwrap();

        let sent = agent.publisher.sent.lock().unwrap();
        let first = serde_json::to_vec(&sent[0]).unwrap();
        let second = serde_json::to_vec(&sent[1]).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn listing_failure_skips_the_push() {
        let runtime = StaticRuntime::new(vec![web("a", "32768")]);
        runtime.unreachable.store(true, Ordering::SeqCst);
        let agent = agent(runtime);

        let err = agent.poll().await.unwrap_err();
        assert!(matches!(err, PollError::Runtime(RuntimeError::List(_))));
        assert!(agent.publisher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inspection_failure_still_pushes_the_rest() {
        let runtime = StaticRuntime::new(vec![web("a", "32768"), web("b", "32769")]).with_broken("a");
        let agent = agent(runtime);

        let report = agent.poll().await.unwrap();
        assert_eq!(report.addresses, 1);
        let sent = agent.publisher.sent.lock().unwrap();
        assert_eq!(sent[0][0].list, vec!["http://127.0.0.1:32769"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_once_per_interval_until_shutdown() {
        let agent = agent(StaticRuntime::new(vec![web("a", "32768")]));
        let interval = Duration::from_secs(15);

        agent.run(interval, sleep(Duration::from_millis(37_500))).await;

        // Polls at 0s, 15s and 30s.
        assert_eq!(agent.publisher.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_going_after_failed_polls() {
        let runtime = StaticRuntime::new(vec![web("a", "32768")]);
        runtime.unreachable.store(true, Ordering::SeqCst);
        let agent = agent(runtime);

        agent.run(Duration::from_secs(1), sleep(Duration::from_millis(2_500))).await;

        assert!(agent.publisher.sent.lock().unwrap().is_empty());
        // Polls at 0s, 1s and 2s, each failing at the listing call.
        assert_eq!(agent.runtime.listings.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poll_reports_delivery_failure() {
        let agent = agent(StaticRuntime::new(vec![web("a", "32768")]));
        agent.publisher.unreachable.store(true, Ordering::SeqCst);

        let err = agent.poll().await.unwrap_err();
        assert!(matches!(err, PollError::Publish(PublishError::Transport { .. })));
        assert_eq!(agent.publisher.attempts.load(Ordering::SeqCst), 1);
        assert!(agent.publisher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_going_after_failed_pushes() {
        let agent = agent(StaticRuntime::new(vec![web("a", "32768")]));
        agent.publisher.unreachable.store(true, Ordering::SeqCst);

        agent.run(Duration::from_secs(1), sleep(Duration::from_millis(2_500))).await;

        // Pushes at 0s, 1s and 2s, each failing with no retry in between.
        assert_eq!(agent.publisher.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(agent.runtime.listings.load(Ordering::SeqCst), 3);
        assert!(agent.publisher.sent.lock().unwrap().is_empty());
    }
}
