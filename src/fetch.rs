//! Archive download.
//!
//! [`Fetch`] is the seam between the provisioner and the network, so tests
//! can hand the provisioner in-memory archives. [`HttpFetcher`] is the
//! production implementation (blocking `ureq`, no retries).

use std::io::{self, Read};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to download {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("failed to read response body from {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: io::Error,
    },
}

/// Something that can turn a URL into bytes.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Downloads over HTTP(S).
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        info!(url, "downloading");
        let response = self.agent.get(url).call().map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: Box::new(e),
        })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|source| FetchError::Io {
                url: url.to_string(),
                source,
            })?;
        info!(url, bytes = bytes.len(), "download complete");
        Ok(bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Serves canned bytes and records every requested URL.
    ///
    /// The request log is shared, so a test can keep a handle after the
    /// fetcher has been moved into a provisioner.
    #[derive(Default)]
    pub(crate) struct MockFetcher {
        pub responses: HashMap<String, Vec<u8>>,
        pub requests: Arc<Mutex<Vec<String>>>,
    }

    impl MockFetcher {
        pub fn with(url: &str, bytes: Vec<u8>) -> Self {
            let mut responses = HashMap::new();
            responses.insert(url.to_string(), bytes);
            Self {
                responses,
                requests: Arc::default(),
            }
        }

        pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.requests)
        }

        pub fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Fetch for MockFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Io {
                    url: url.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "404 Not Found"),
                })
        }
    }

    #[test]
    fn mock_serves_known_urls() {
        let fetcher = MockFetcher::with("https://example.com/a.tar.gz", vec![1, 2, 3]);
        assert_eq!(
            fetcher.fetch("https://example.com/a.tar.gz").unwrap(),
            vec![1, 2, 3]
        );
        assert!(fetcher.fetch("https://example.com/b.tar.gz").is_err());
        assert_eq!(fetcher.requested().len(), 2);
    }

    #[test]
    fn fetch_error_mentions_url() {
        let err = FetchError::Io {
            url: "https://example.com/x".into(),
            source: io::Error::other("reset"),
        };
        let msg = err.to_string();
        assert!(msg.contains("https://example.com/x"));
        assert!(msg.contains("reset"));
    }
}
