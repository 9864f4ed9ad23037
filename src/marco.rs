//! Delivery of backend records to Marco.
//!
//! Each push is a single JSON `POST`.  Only transport failures count as a
//! failed push; the response status is logged and otherwise ignored.

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;

use crate::types::Backend;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to reach Marco at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn send(&self, backends: &[Backend]) -> Result<(), PublishError>;
}

pub struct HttpPublisher {
    client: reqwest::Client,
    url: String,
}

impl HttpPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn send(&self, backends: &[Backend]) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .json(backends)
            .send()
            .await
            .map_err(|source| PublishError::Transport {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Marco accepted {} backends ({})", backends.len(), status);
        } else {
            warn!("Marco responded with {} to a push of {} backends", status, backends.len());
        }
        Ok(())
    }
}
