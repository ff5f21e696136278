//! ACQUIRE: pull external bytes into the workspace. The fetcher itself is a
//! collaborator behind a trait; the handler only decides what the bytes are.

use std::sync::Arc;

use async_trait::async_trait;

use super::Handler;
use crate::error::{FetchError, StepError};
use crate::normalize::sniff_payload;
use crate::plan::{Capability, Step};
use crate::workspace::{ArtifactKind, Payload, Workspace};

/// Fetches raw bytes for a source descriptor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP GET fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, FetchError> {
        if !source.starts_with("http://") && !source.starts_with("https://") {
            return Err(FetchError::UnsupportedSource(source.to_string()));
        }
        let resp = self
            .client
            .get(source)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

pub struct AcquireHandler {
    fetcher: Arc<dyn Fetcher>,
}

impl AcquireHandler {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Handler for AcquireHandler {
    fn capability(&self) -> Capability {
        Capability::Acquire
    }

    async fn run(&self, step: &Step, _workspace: &Workspace) -> Result<Payload, StepError> {
        let source = step
            .params
            .get("source")
            .and_then(|v| v.as_str())
            .ok_or(StepError::MissingParam("source"))?;

        let bytes = self.fetcher.fetch(source).await?;
        tracing::debug!(source, bytes = bytes.len(), "acquired");

        let payload = sniff_payload(&bytes);
        // the declared kind is a hint; text can absorb any sniff miss
        if payload.kind() != step.output.kind && step.output.kind == ArtifactKind::Text {
            return Ok(Payload::Text(String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OutputDecl;
    use serde_json::json;
    use std::collections::HashMap;

    /// Scripted fetcher: source → bytes.
    struct MockFetcher {
        responses: HashMap<String, Vec<u8>>,
    }

    impl MockFetcher {
        fn new(responses: HashMap<String, Vec<u8>>) -> Self {
            Self { responses }
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, source: &str) -> Result<Vec<u8>, FetchError> {
            self.responses
                .get(source)
                .cloned()
                .ok_or_else(|| FetchError::Status(404))
        }
    }

    fn acquire_step(source: &str, kind: ArtifactKind) -> Step {
        Step {
            id: "s1".to_string(),
            capability: Capability::Acquire,
            inputs: vec![],
            params: json!({ "source": source }),
            output: OutputDecl {
                name: "fetched".to_string(),
                kind,
            },
        }
    }

    #[tokio::test]
    async fn fetched_csv_becomes_table() {
        let fetcher = MockFetcher::new(HashMap::from([(
            "https://example.test/data.csv".to_string(),
            b"a,b\n1,2".to_vec(),
        )]));
        let handler = AcquireHandler::new(Arc::new(fetcher));
        let step = acquire_step("https://example.test/data.csv", ArtifactKind::Table);
        let payload = handler.run(&step, &Workspace::new()).await.unwrap();
        assert_eq!(payload.kind(), ArtifactKind::Table);
    }

    #[tokio::test]
    async fn declared_text_forces_raw_text() {
        let fetcher = MockFetcher::new(HashMap::from([(
            "https://example.test/page".to_string(),
            br#"{"not": "wanted as json"}"#.to_vec(),
        )]));
        let handler = AcquireHandler::new(Arc::new(fetcher));
        let step = acquire_step("https://example.test/page", ArtifactKind::Text);
        let payload = handler.run(&step, &Workspace::new()).await.unwrap();
        assert_eq!(payload.kind(), ArtifactKind::Text);
    }

    #[tokio::test]
    async fn missing_source_param_fails() {
        let handler = AcquireHandler::new(Arc::new(MockFetcher::new(HashMap::new())));
        let mut step = acquire_step("x", ArtifactKind::Text);
        step.params = json!({});
        assert!(matches!(
            handler.run(&step, &Workspace::new()).await,
            Err(StepError::MissingParam("source"))
        ));
    }

    #[tokio::test]
    async fn fetch_error_propagates() {
        let handler = AcquireHandler::new(Arc::new(MockFetcher::new(HashMap::new())));
        let step = acquire_step("https://example.test/missing", ArtifactKind::Text);
        assert!(matches!(
            handler.run(&step, &Workspace::new()).await,
            Err(StepError::Fetch(FetchError::Status(404)))
        ));
    }

    #[tokio::test]
    async fn http_fetcher_rejects_odd_schemes() {
        let fetcher = HttpFetcher::new();
        assert!(matches!(
            fetcher.fetch("file:///etc/passwd").await,
            Err(FetchError::UnsupportedSource(_))
        ));
    }
}
