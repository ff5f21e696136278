use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use super::{Oracle, OracleRequest};

/// A scripted oracle for tests. Returns pre-defined responses in order.
pub struct MockOracle {
    responses: Vec<String>,
    index: AtomicUsize,
}

impl MockOracle {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            index: AtomicUsize::new(0),
        }
    }

    /// Convenience: a single canned response.
    pub fn single(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// How many times the oracle was consulted.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String> {
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(i)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockOracle: no more responses (called {} times)", i + 1))
    }
}

/// An oracle that always fails. Drives the planner straight to its fallback
/// plan; also what the CLI's offline mode uses.
pub struct NullOracle;

#[async_trait]
impl Oracle for NullOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String> {
        anyhow::bail!("no oracle available")
    }
}
