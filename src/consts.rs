//! Project-wide constants.

use std::time::Duration;

/// Default Anthropic model when none is specified.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Total wall-clock budget for one request.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(180);

/// Bounded grace period after expiry during which in-flight work may finish.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Soft cap on any single step, before budget apportioning.
pub const DEFAULT_STEP_CAP: Duration = Duration::from_secs(60);

/// Slice of the budget held back so the assembler always gets to run.
pub const DEFAULT_ASSEMBLER_RESERVE: Duration = Duration::from_secs(5);

/// Fixed text emitted by the fallback plan when the task cannot be interpreted.
pub const UNINTERPRETABLE_TASK: &str = "unable to interpret task";

/// Per-artifact preview length in the manifest shown to the oracle.
pub const MANIFEST_PREVIEW_CHARS: usize = 200;
