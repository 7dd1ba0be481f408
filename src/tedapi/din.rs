use tokio::sync::OnceCell;

use crate::tedapi::client::Transport;
use crate::tedapi::{Din, GatewayError};

pub const DIN_PATH: &str = "/tedapi/din";

/// Anything shorter is an error page or a truncated body, not a DIN.
pub const MIN_DIN_LEN: usize = 16;

/// Leader DIN, either supplied up front or fetched from the gateway once.
pub struct DinResolver {
    supplied: Option<Din>,
    fetched: OnceCell<Din>,
}

impl DinResolver {
    pub fn new(supplied: Option<Din>) -> Self {
        Self {
            supplied: supplied.filter(|d| !d.is_empty()),
            fetched: OnceCell::new(),
        }
    }

    /// Returns the leader DIN, fetching it on first use.
    ///
    /// Concurrent callers wait on a single fetch. A failed fetch leaves the
    /// cache empty so the next call tries again.
    pub async fn resolve<T: Transport + ?Sized>(&self, transport: &T) -> Result<Din, GatewayError> {
        if let Some(d) = &self.supplied {
            return Ok(d.clone());
        }

        let din = self
            .fetched
            .get_or_try_init(|| async {
                let body = transport.request(DIN_PATH, None).await?;
                if body.len() < MIN_DIN_LEN {
                    return Err(GatewayError::MalformedResponse(format!(
                        "bad DIN from gateway: {:?}",
                        String::from_utf8_lossy(&body)
                    )));
                }
                let din = String::from_utf8(body).map_err(|e| {
                    GatewayError::MalformedResponse(format!("DIN is not utf-8: {}", e))
                })?;
                log::info!("got DIN from leader: {}", din);
                Ok::<_, GatewayError>(Din::new(din))
            })
            .await?;
        Ok(din.clone())
    }

    /// The resolved DIN, if known without a fetch.
    #[cfg(test)]
    pub(crate) fn known(&self) -> Option<&Din> {
        self.supplied.as_ref().or_else(|| self.fetched.get())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    pub const LEADER: &str = "1232100-00-E--TG123456789012";

    /// In-memory gateway: answers from a script and records every call.
    #[derive(Default)]
    pub struct FakeTransport {
        pub replies: Mutex<VecDeque<Result<Vec<u8>, GatewayError>>>,
        pub calls: Mutex<Vec<(String, Option<Vec<u8>>)>>,
        pub din_fetches: AtomicUsize,
        pub delay: Option<Duration>,
    }

    impl FakeTransport {
        pub fn with_replies(replies: Vec<Result<Vec<u8>, GatewayError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        pub fn paths(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn request(&self, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>, GatewayError> {
            if path == DIN_PATH {
                self.din_fetches.fetch_add(1, Ordering::SeqCst);
            }
            self.calls.lock().unwrap().push((path.to_owned(), body));
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::Connectivity("no scripted reply".to_owned())))
        }
    }

    #[tokio::test]
    async fn supplied_din_skips_fetch() {
        let t = FakeTransport::default();
        let r = DinResolver::new(Some(Din::new("my-own-din")));
        assert_eq!(r.resolve(&t).await.unwrap().as_str(), "my-own-din");
        assert_eq!(t.din_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_supplied_din_is_ignored() {
        let t = FakeTransport::with_replies(vec![Ok(LEADER.as_bytes().to_vec())]);
        let r = DinResolver::new(Some(Din::new("")));
        assert_eq!(r.resolve(&t).await.unwrap().as_str(), LEADER);
        assert_eq!(t.paths(), vec![DIN_PATH.to_owned()]);
    }

    #[tokio::test]
    async fn short_din_is_malformed_and_not_cached() {
        let t = FakeTransport::with_replies(vec![
            Ok(b"<html>".to_vec()),
            Ok(LEADER.as_bytes().to_vec()),
        ]);
        let r = DinResolver::new(None);

        let err = r.resolve(&t).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
        assert!(r.known().is_none());

        assert_eq!(r.resolve(&t).await.unwrap().as_str(), LEADER);
        assert_eq!(t.din_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_propagates_unchanged() {
        let t = FakeTransport::with_replies(vec![Err(GatewayError::HttpStatus(503))]);
        let r = DinResolver::new(None);
        let err = r.resolve(&t).await.unwrap_err();
        assert!(matches!(err, GatewayError::HttpStatus(503)));
        assert!(r.known().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolution_fetches_once() {
        let t = Arc::new(FakeTransport {
            replies: Mutex::new(vec![Ok(LEADER.as_bytes().to_vec())].into()),
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let r = Arc::new(DinResolver::new(None));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let t = t.clone();
            let r = r.clone();
            handles.push(tokio::spawn(async move { r.resolve(t.as_ref()).await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().as_str(), LEADER);
        }
        assert_eq!(t.din_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(r.known().map(|d| d.as_str()), Some(LEADER));
    }
}
