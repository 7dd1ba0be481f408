use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;

use crate::tedapi::GatewayError;

const SERVICE_ACCOUNT: &str = "Tesla_Energy_Device";

/// Moves raw bodies to and from the gateway.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs `body` to `path` when given, otherwise GETs `path`.
    async fn request(&self, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>, GatewayError>;
}

pub struct HttpsTransport {
    http: reqwest::Client,
    base: String,
    auth: String,
}

impl HttpsTransport {
    /// Certificate and hostname verification are switched off here. The
    /// gateway serves a self-signed certificate that doesn't match its
    /// address, so we accept any certificate and rely on the local network
    /// being trusted. The Basic-Auth secret still only ever travels inside
    /// TLS. The native TLS backend lets the gateway renegotiate.
    pub fn new(remote: &str, secret: &str, timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            http,
            base: format!("https://{}", remote),
            auth: basic_auth(secret),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn basic_auth(secret: &str) -> String {
    let token = URL_SAFE_NO_PAD.encode(format!("{}:{}", SERVICE_ACCOUNT, secret));
    format!("Basic {}", token)
}

/// Anything but 200 fails; 429 and 503 mean the gateway is rate-limiting.
fn check_status(path: &str, status: StatusCode) -> Result<(), GatewayError> {
    if status == StatusCode::OK {
        return Ok(());
    }
    if matches!(status.as_u16(), 429 | 503) {
        log::warn!("gateway is rate-limiting us: {} {}", path, status);
    } else {
        log::warn!("non-200 from {}: {}", path, status);
    }
    Err(GatewayError::HttpStatus(status.as_u16()))
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn request(&self, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>, GatewayError> {
        let url = self.url(path);
        let req = match body {
            Some(b) => self
                .http
                .post(&url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(b),
            None => self.http.get(&url),
        };

        let rsp = req.header(AUTHORIZATION, &self.auth).send().await?;
        check_status(path, rsp.status())?;

        Ok(rsp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{generate_simple_self_signed, CertifiedKey};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const AUTH: &str = "Basic VGVzbGFfRW5lcmd5X0RldmljZTpodW50ZXIy";

    #[test]
    fn auth_header() {
        // "Tesla_Energy_Device:hunter2" without padding
        assert_eq!(basic_auth("hunter2"), AUTH);
    }

    #[test]
    fn builds_urls() {
        let t = HttpsTransport::new("10.0.0.5:8443", "x", None).unwrap();
        assert_eq!(t.url("/tedapi/din"), "https://10.0.0.5:8443/tedapi/din");
    }

    #[test]
    fn only_200_passes() {
        assert!(check_status("/p", StatusCode::OK).is_ok());
        for code in [429u16, 503, 500, 204, 401] {
            let status = StatusCode::from_u16(code).unwrap();
            match check_status("/p", status) {
                Err(GatewayError::HttpStatus(c)) => assert_eq!(c, code),
                other => panic!("{}: {:?}", code, other),
            }
        }
    }

    /// Self-signed for a name that isn't the address we connect to.
    fn acceptor() -> tokio_native_tls::TlsAcceptor {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["gateway.invalid".to_string()]).unwrap();
        let id = native_tls::Identity::from_pkcs8(
            cert.pem().as_bytes(),
            key_pair.serialize_pem().as_bytes(),
        )
        .unwrap();
        native_tls::TlsAcceptor::new(id).unwrap().into()
    }

    fn request_complete(req: &[u8]) -> bool {
        let end = match req.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(e) => e,
            None => return false,
        };
        let head = String::from_utf8_lossy(&req[..end]).to_ascii_lowercase();
        let len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        req.len() >= end + 4 + len
    }

    /// Answers one TLS request with `status` and `body`, returns what it got.
    async fn gateway_once(status: &'static str, body: &'static [u8]) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let tls = acceptor();

        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut s = tls.accept(tcp).await.unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&req) {
                let n = s.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                status,
                body.len()
            );
            s.write_all(head.as_bytes()).await.unwrap();
            s.write_all(body).await.unwrap();
            let _ = s.shutdown().await;
            req
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn get_carries_auth_and_503_is_status_error() {
        let (addr, server) = gateway_once("503 Service Unavailable", b"").await;
        let t = HttpsTransport::new(&addr, "hunter2", None).unwrap();

        let err = t.request("/tedapi/din", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::HttpStatus(503)), "{:?}", err);
        assert!(err.is_rate_limited());

        let req = String::from_utf8_lossy(&server.await.unwrap()).to_ascii_lowercase();
        assert!(req.starts_with("get /tedapi/din http/1.1\r\n"), "{}", req);
        assert!(req.contains(&format!("authorization: {}", AUTH.to_ascii_lowercase())));
    }

    #[tokio::test]
    async fn post_sends_body_and_returns_reply() {
        let (addr, server) = gateway_once("200 OK", b"\x0a\x02\x08\x01").await;
        let t = HttpsTransport::new(&addr, "hunter2", None).unwrap();

        let out = t.request("/tedapi/v1", Some(vec![1, 2, 3])).await.unwrap();
        assert_eq!(out, b"\x0a\x02\x08\x01".to_vec());

        let req = server.await.unwrap();
        assert!(req.ends_with(&[1, 2, 3]));
        let req = String::from_utf8_lossy(&req).to_ascii_lowercase();
        assert!(req.starts_with("post /tedapi/v1 http/1.1\r\n"), "{}", req);
        assert!(req.contains("content-type: application/octet-stream"));
        assert!(req.contains("authorization: basic "));
    }

    #[tokio::test]
    async fn stalled_gateway_times_out() {
        // accepts the connection but never answers the handshake
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(tcp);
        });

        let t = HttpsTransport::new(&addr, "hunter2", Some(Duration::from_millis(200))).unwrap();
        let err = t.request("/tedapi/din", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout), "{:?}", err);
        server.abort();
    }
}
