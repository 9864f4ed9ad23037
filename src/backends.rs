//! Backend aggregation.
//!
//! Turns a snapshot of running containers into the domain → address
//! mapping Marco load balances over.  Containers are keyed by their
//! compose project and service labels, so every replica of a service
//! lands in the same pool.

use std::net::IpAddr;

use log::debug;
use thiserror::Error;

use crate::config::DiscoveryConfig;
use crate::types::{Backend, BackendMapping, Container, HostBinding};

/// Value of the `Type` field on every record this agent pushes.
pub const AGENT_NAME: &str = "compose";

/// A container without one of the compose labels has no domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot find {0} label")]
pub struct MissingLabel(pub String);

/// Result of aggregating one poll's worth of containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub mapping: BackendMapping,
    pub containers: usize,
    pub unlabelled: usize,
}

/// Derives `{project}-{service}`, suffixed with `.{base_domain}` if set.
pub fn resolve_domain(container: &Container, cfg: &DiscoveryConfig) -> Result<String, MissingLabel> {
    let service = container
        .labels
        .get(&cfg.service_label)
        .ok_or_else(|| MissingLabel(cfg.service_label.clone()))?;
    let project = container
        .labels
        .get(&cfg.project_label)
        .ok_or_else(|| MissingLabel(cfg.project_label.clone()))?;

    let domain = format!("{}-{}", project, service);
    Ok(match &cfg.base_domain {
        Some(base) => format!("{}.{}", domain, base),
        None => domain,
    })
}

/// Builds the proxy URL for a published port from its first binding.
///
/// Later bindings for the same port are ignored.  A wildcard host address
/// is rewritten to loopback, which is how this host reaches it.
pub fn proxy_url(bindings: &[HostBinding]) -> Option<String> {
    let binding = bindings.first()?;
    if binding.host_port.is_empty() {
        return None;
    }

    let host = match binding.host_ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) if ip.is_unspecified() => "127.0.0.1".to_string(),
        Ok(IpAddr::V6(ip)) if ip.is_unspecified() => "[::1]".to_string(),
        Ok(IpAddr::V6(ip)) => format!("[{}]", ip),
        Ok(IpAddr::V4(ip)) => ip.to_string(),
        Err(_) if binding.host_ip.is_empty() => "127.0.0.1".to_string(),
        Err(_) => binding.host_ip.clone(),
    };

    Some(format!("http://{}:{}", host, binding.host_port))
}

/// Reachable addresses of a container's allow-listed, published ports.
pub fn container_urls(container: &Container, cfg: &DiscoveryConfig) -> Vec<String> {
    container
        .ports
        .iter()
        .filter(|(port, _)| cfg.allowed_ports.contains(&port.port))
        .filter_map(|(_, bindings)| proxy_url(bindings))
        .collect()
}

pub fn aggregate(containers: &[Container], cfg: &DiscoveryConfig) -> Aggregation {
    let mut aggregation = Aggregation {
        containers: containers.len(),
        ..Default::default()
    };

    for container in containers {
        let domain = match resolve_domain(container, cfg) {
            Ok(domain) => domain,
            Err(reason) => {
                debug!("Container {} has no domain: {}", container.id, reason);
                aggregation.unlabelled += 1;
                continue;
            }
        };

        let urls = container_urls(container, cfg);
        if urls.is_empty() {
            debug!("Container {} ({}) publishes no proxyable ports", container.id, domain);
            continue;
        }
        aggregation
            .mapping
            .entry(domain)
            .or_default()
            .extend(urls);
    }

    aggregation
}

/// Flattens the mapping into the records Marco expects, one per domain.
pub fn payload(mapping: &BackendMapping) -> Vec<Backend> {
    mapping
        .iter()
        .map(|(domain, list)| Backend {
            kind: AGENT_NAME.to_string(),
            domain: domain.clone(),
            list: list.clone(),
        })
        .collect()
}
