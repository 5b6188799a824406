//! The link-reachability probe — another external collaborator. Wrapped in
//! [`resilience::with_timeout`] since a single slow external link must not
//! stall the whole analysis.

use async_trait::async_trait;
use std::time::Duration;

use crate::models::InaccessibleLink;

#[async_trait]
pub trait LinkChecker: Send + Sync {
    /// Probes each link and returns only the ones that are not reachable.
    async fn check(&self, links: &[String]) -> Vec<InaccessibleLink>;
}

pub struct HttpLinkChecker {
    client: reqwest::Client,
    per_link_timeout: Duration,
}

impl HttpLinkChecker {
    pub fn new(per_link_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            per_link_timeout,
        }
    }

    async fn probe_one(&self, link: &str) -> Option<InaccessibleLink> {
        let client = self.client.clone();
        let link_owned = link.to_string();
        let timeout = self.per_link_timeout;

        let result = resilience::with_timeout(timeout, async move {
            client
                .head(&link_owned)
                .send()
                .await
                .map_err(|e| e.to_string())
        })
        .await;

        match result {
            Ok(Ok(response)) if response.status().is_success() => None,
            Ok(Ok(response)) => Some(InaccessibleLink {
                url: link.to_string(),
                status_code: Some(response.status().as_u16()),
                error: None,
            }),
            Ok(Err(e)) => Some(InaccessibleLink {
                url: link.to_string(),
                status_code: None,
                error: Some(e),
            }),
            Err(_) => Some(InaccessibleLink {
                url: link.to_string(),
                status_code: None,
                error: Some("timed out".to_string()),
            }),
        }
    }
}

#[async_trait]
impl LinkChecker for HttpLinkChecker {
    async fn check(&self, links: &[String]) -> Vec<InaccessibleLink> {
        let checks = links.iter().map(|link| self.probe_one(link));
        futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;

    pub struct FakeLinkChecker {
        pub inaccessible: Vec<InaccessibleLink>,
        pub invocations: std::sync::atomic::AtomicUsize,
    }

    impl FakeLinkChecker {
        pub fn new(inaccessible: Vec<InaccessibleLink>) -> Self {
            Self {
                inaccessible,
                invocations: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LinkChecker for FakeLinkChecker {
        async fn check(&self, _links: &[String]) -> Vec<InaccessibleLink> {
            self.invocations
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inaccessible.clone()
        }
    }
}
