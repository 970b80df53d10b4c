/*!
Reachability probes for the dependencies of the event workers
*/

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use ftrack_endpoints::{ServerUrl, StoreAddress};
use reqwest::{StatusCode, redirect::Policy};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::EventServerError;

/// Response header every ftrack server sends with its version
pub const FTRACK_VERSION_HEADER: &str = "ftrack_version";

/// External services the workers need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// The ftrack server events are read from
    Server,
    /// The database events are stored in
    Store,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Server => f.write_str("ftrack"),
            Dependency::Store => f.write_str("event store"),
        }
    }
}

/// Why a probe considered its dependency unreachable
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("response is not from an ftrack server")]
    NotFtrack,
    #[error("no connection within {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(#[from] io::Error),
}

/// Bounded-time reachability check of one dependency
#[async_trait]
pub trait Probe: Send + Sync {
    /// Human readable target for log lines
    fn target(&self) -> String;

    async fn check(&self) -> Result<(), ProbeError>;
}

/// Checks that the configured URL answers like an ftrack server
pub struct ServerProbe {
    url: ServerUrl,
    client: reqwest::Client,
}

impl ServerProbe {
    pub fn new(url: ServerUrl, timeout: Duration) -> Result<Self, EventServerError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl Probe for ServerProbe {
    fn target(&self) -> String {
        self.url.to_string()
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(self.url.as_str())
            .send()
            .await
            .map_err(ProbeError::Transport)?;

        if response.status() != StatusCode::OK {
            return Err(ProbeError::Status(response.status()));
        }

        let version = response
            .headers()
            .get(FTRACK_VERSION_HEADER)
            .ok_or(ProbeError::NotFtrack)?;
        debug!(
            "ftrack server {} is accessible (version {})",
            self.url,
            version.to_str().unwrap_or("?")
        );
        Ok(())
    }
}

/// Checks that the event store accepts TCP connections
pub struct StoreProbe {
    address: StoreAddress,
    timeout: Duration,
}

impl StoreProbe {
    pub fn new(address: StoreAddress, timeout: Duration) -> Self {
        Self { address, timeout }
    }
}

#[async_trait]
impl Probe for StoreProbe {
    fn target(&self) -> String {
        self.address.to_string()
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let connect = TcpStream::connect((self.address.host.as_str(), self.address.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Connect(e)),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}
