pub mod anthropic;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;

/// One request to the reasoning collaborator.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
}

/// The borrowed brain. Turns free text into structured guesses — everything
/// it returns is untrusted and validated by the caller.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, request: &OracleRequest) -> Result<String>;
}

/// Extract JSON from text that may be wrapped in markdown code fences, with
/// a brace-scan fallback for chatty responses.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(after) = trimmed.strip_prefix("```json")
        && let Some(json) = after.strip_suffix("```")
    {
        return json.trim();
    }
    if let Some(after) = trimmed.strip_prefix("```")
        && let Some(json) = after.strip_suffix("```")
    {
        return json.trim();
    }

    // Last resort: the widest {...} span.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
    {
        return &trimmed[start..=end];
    }

    trimmed
}
