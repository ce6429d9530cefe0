use async_trait::async_trait;
use reqwest::Client;
use std::fmt::Debug;

/// Retrieves the raw text served at a URL.
///
/// Implementations never fail loudly: any transport problem is logged and
/// reported as `None`, leaving the decision to the caller.
#[async_trait]
pub trait FieldFetcher: Send + Sync + Debug {
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Plain GET requests with the transport's default timeouts and no retries.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }
}

#[async_trait]
impl FieldFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        let res = match self.http.get(url).send().await {
            Ok(res) => res,
            Err(e) => {
                log::error!("Could not open stream to {url}: {e}");
                return None;
            }
        };

        let status = res.status();
        let body = match res.text().await {
            Ok(body) => body,
            Err(e) => {
                log::error!("Could not read response body from {url}: {e}");
                return None;
            }
        };

        if !status.is_success() {
            log::error!(
                "Request to {url} failed with status {status}: {}",
                truncate_body(&body)
            );
            return None;
        }

        Some(body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies and records every requested URL.
    #[derive(Debug, Default)]
    pub(crate) struct FakeFetcher {
        responses: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn respond(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(url.to_string(), body.to_string());
            self
        }

        pub(crate) fn without(mut self, url: &str) -> Self {
            self.responses.remove(url);
            self
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FieldFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Option<String> {
            self.requests.lock().unwrap().push(url.to_string());
            self.responses.get(url).cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "ä".repeat(300);
        let short = truncate_body(&body);

        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 203);
        assert_eq!(truncate_body("ok"), "ok");
    }

    #[tokio::test]
    async fn unreachable_host_yields_none() {
        let fetcher = HttpFetcher::new();
        // Port 9 on localhost is not expected to serve HTTP.
        assert!(fetcher.fetch("http://127.0.0.1:9/time.txt").await.is_none());
    }
}
