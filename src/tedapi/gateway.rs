use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tedapi::client::{HttpsTransport, Transport};
use crate::tedapi::din::DinResolver;
use crate::tedapi::message::{Payload, Reply};
use crate::tedapi::router::{self, Route, Target};
use crate::tedapi::{Din, GatewayError, Query, DEFAULT_REMOTE};

/// How to reach a gateway.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Printed on the gateway, required.
    pub secret: String,
    /// `host:port`, [`DEFAULT_REMOTE`] when unset.
    #[serde(default)]
    pub remote: Option<String>,
    /// Leader DIN; fetched from the gateway when unset.
    #[serde(default)]
    pub din: Option<Din>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl GatewayConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<GatewayConfig, GatewayError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&json).map_err(|e| GatewayError::Config(e.to_string()))
    }

    pub fn remote(&self) -> &str {
        match &self.remote {
            Some(r) if !r.is_empty() => r,
            _ => DEFAULT_REMOTE,
        }
    }
}

/// Client for one gateway. Share it between tasks with an `Arc`.
pub struct Gateway<T: Transport = HttpsTransport> {
    transport: T,
    din: DinResolver,
}

impl Gateway<HttpsTransport> {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, GatewayError> {
        if cfg.secret.is_empty() {
            return Err(GatewayError::Config("secret must be provided".to_owned()));
        }
        if cfg.timeout_secs == Some(0) {
            return Err(GatewayError::Config(
                "timeout_secs must be positive, leave it unset for no timeout".to_owned(),
            ));
        }
        let transport = HttpsTransport::new(
            cfg.remote(),
            &cfg.secret,
            cfg.timeout_secs.map(Duration::from_secs),
        )?;
        Ok(Gateway::with_transport(transport, cfg.din.clone()))
    }
}

impl<T: Transport> Gateway<T> {
    pub fn with_transport(transport: T, din: Option<Din>) -> Self {
        Self {
            transport,
            din: DinResolver::new(din),
        }
    }

    pub async fn leader_din(&self) -> Result<Din, GatewayError> {
        self.din.resolve(&self.transport).await
    }

    /// Runs a query on the leader. Returns the raw JSON answer.
    pub async fn query(&self, query: &Query) -> Result<Vec<u8>, GatewayError> {
        self.query_device(query, Target::Leader).await
    }

    /// Runs a query on the leader or, through it, on another device.
    pub async fn query_device(
        &self,
        query: &Query,
        target: impl Into<Target>,
    ) -> Result<Vec<u8>, GatewayError> {
        let target = target.into();
        let leader = self.leader_din().await?;
        let route = router::build_query(query, &target, &leader)?;

        match self.exchange(route).await?.payload {
            Payload::QueryRecv(text) if !text.is_empty() => Ok(text.into_bytes()),
            _ => Err(GatewayError::MissingPayload("query result")),
        }
    }

    /// Reads a config file from the leader, e.g. `config.json`.
    pub async fn config(&self, file: &str) -> Result<Vec<u8>, GatewayError> {
        let leader = self.leader_din().await?;
        let route = router::build_config(file, &leader);

        match self.exchange(route).await?.payload {
            Payload::ConfigRecv(Some(text)) => Ok(text.into_bytes()),
            _ => Err(GatewayError::MissingPayload("config file")),
        }
    }

    async fn exchange(&self, route: Route) -> Result<Reply, GatewayError> {
        log::debug!("POST {} ({:?})", route.path, route.envelope.hop);
        let body = self
            .transport
            .request(&route.path, Some(route.envelope.encode()))
            .await?;
        if body.is_empty() {
            return Err(GatewayError::MalformedResponse(format!(
                "empty body from {}",
                route.path
            )));
        }
        Reply::decode(&body)
    }
}
