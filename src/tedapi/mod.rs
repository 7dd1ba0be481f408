pub mod client;
pub mod din;
pub mod gateway;
pub mod message;
pub mod router;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use client::{HttpsTransport, Transport};
pub use gateway::{Gateway, GatewayConfig};
pub use router::Target;

pub const DEFAULT_REMOTE: &str = "192.168.91.1:443";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("connectivity: {0}")]
    Connectivity(String),
    #[error("request timed out")]
    Timeout,
    #[error("non-200 status: {0}")]
    HttpStatus(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("codec: {0}")]
    Codec(#[from] prost::DecodeError),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("missing {0} in response")]
    MissingPayload(&'static str),
    #[error("query variables: {0}")]
    Variables(#[from] serde_json::Error),
    #[error("config: {0}")]
    Config(String),
}

impl GatewayError {
    /// 429 and 503 mean the gateway is throttling us; retrying is up to the caller.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::HttpStatus(429 | 503))
    }

    /// True for both kinds of frame decoding failure.
    #[cfg(test)]
    pub(crate) fn is_codec(&self) -> bool {
        matches!(self, GatewayError::Codec(_) | GatewayError::InvalidFrame(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Connectivity(e.to_string())
        }
    }
}

/// Device Identification Number, names a device on the local mesh.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Din(String);

impl Din {
    pub fn new(din: impl Into<String>) -> Self {
        Din(din.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Din {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Din {
    fn from(s: &str) -> Self {
        Din(s.to_owned())
    }
}

impl From<String> for Din {
    fn from(s: String) -> Self {
        Din(s)
    }
}

/// A signed query the gateway will execute.
///
/// The signature is produced with the vendor's private key, so new queries
/// can't be minted here; callers supply known (query, signature) pairs.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub signature: Vec<u8>,
    /// Interpolated into `$`-variables of the query text by the gateway.
    pub vars: Option<serde_json::Value>,
}

impl Query {
    pub fn new(text: impl Into<String>, signature: impl Into<Vec<u8>>) -> Self {
        Self {
            text: text.into(),
            signature: signature.into(),
            vars: None,
        }
    }

    pub fn with_vars(mut self, vars: serde_json::Value) -> Self {
        self.vars = Some(vars);
        self
    }

    pub(crate) fn vars_json(&self) -> Result<String, GatewayError> {
        Ok(match &self.vars {
            Some(v) => serde_json::to_string(v)?,
            None => "{}".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vars_default_to_empty_object() {
        let q = Query::new("query { x }", vec![1, 2, 3]);
        assert_eq!(q.vars_json().unwrap(), "{}");

        let q = q.with_vars(json!({"din": "abc"}));
        assert_eq!(q.vars_json().unwrap(), r#"{"din":"abc"}"#);
    }

    #[test]
    fn rate_limited_statuses() {
        assert!(GatewayError::HttpStatus(429).is_rate_limited());
        assert!(GatewayError::HttpStatus(503).is_rate_limited());
        assert!(!GatewayError::HttpStatus(500).is_rate_limited());
        assert!(!GatewayError::Timeout.is_rate_limited());
    }
}
