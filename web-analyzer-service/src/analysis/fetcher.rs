//! The raw HTTP fetcher — explicitly an external collaborator. The core
//! only depends on this trait, so the worker's dedup/analyze logic is
//! testable against a canned `Fetcher` without any network I/O.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct FetchError(pub String);

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| FetchError(e.to_string()))
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;

    pub struct FakeFetcher {
        pub html: Result<String, FetchError>,
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<String, FetchError> {
            self.html.clone()
        }
    }
}
