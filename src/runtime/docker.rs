use super::{ContainerRuntime, RuntimeError};
use crate::types::{Container, ExposedPort, HostBinding};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::ContainerInspectResponse;
use bollard::{Docker, API_DEFAULT_VERSION};
use log::debug;

/// Seconds bollard waits on a single Docker API request.
const DOCKER_TIMEOUT: u64 = 120;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to `endpoint`, which is either a `unix://` socket path, a
    /// bare socket path or a `tcp://` / `http://` address in the style of
    /// `DOCKER_HOST`.
    pub fn connect(endpoint: &str) -> Result<Self, RuntimeError> {
        let docker = if let Some(path) = endpoint.strip_prefix("unix://") {
            Docker::connect_with_socket(path, DOCKER_TIMEOUT, &API_DEFAULT_VERSION)
        } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
            Docker::connect_with_http(&format!("http://{}", addr), DOCKER_TIMEOUT, &API_DEFAULT_VERSION)
        } else if endpoint.starts_with("http://") {
            Docker::connect_with_http(endpoint, DOCKER_TIMEOUT, &API_DEFAULT_VERSION)
        } else if endpoint.is_empty() {
            Docker::connect_with_local_defaults()
        } else if let Some((scheme, _)) = endpoint.split_once("://") {
            return Err(RuntimeError::Connect(format!(
                "unsupported endpoint scheme {:?} in {}",
                scheme, endpoint
            )));
        } else {
            Docker::connect_with_socket(endpoint, DOCKER_TIMEOUT, &API_DEFAULT_VERSION)
        }
        .map_err(|e| RuntimeError::Connect(e.to_string()))?;

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<String>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(opts))
            .await
            .map_err(|e| RuntimeError::List(e.to_string()))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect(&self, id: &str) -> Result<Container, RuntimeError> {
        let detail = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| RuntimeError::Inspect {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(container_from_inspect(id, detail))
    }
}

/// Flattens an inspect response into the labels and port table the
/// aggregator works on.  Missing sections read as empty and a port that
/// is exposed but unpublished (`null` bindings) has no host bindings.
fn container_from_inspect(id: &str, detail: ContainerInspectResponse) -> Container {
    let mut container = Container::new(detail.id.unwrap_or_else(|| id.to_string()));

    if let Some(labels) = detail.config.and_then(|c| c.labels) {
        container.labels = labels;
    }

    if let Some(ports) = detail.network_settings.and_then(|s| s.ports) {
        for (spec, bindings) in ports {
            let port = match spec.parse::<ExposedPort>() {
                Ok(port) => port,
                Err(e) => {
                    debug!("Ignoring port {:?} on {}: {}", spec, container.id, e);
                    continue;
                }
            };
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|b| {
                    HostBinding::new(b.host_ip.unwrap_or_default(), b.host_port.unwrap_or_default())
                })
                .collect();
            container.ports.insert(port, bindings);
        }
    }

    container
}
