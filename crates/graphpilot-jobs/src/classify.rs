use std::sync::OnceLock;

use regex::Regex;
use tracing::error;

use graphpilot_core::error::{ErrorKind, GraphPilotError};

/// Message fragments that mark an error as permanent, whatever its type.
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    r"(?i)credential",
    r"(?i)missing required",
    r"(?i)environment variable",
    r"(?i)not configured",
    r"(?i)recursion",
    r"(?i)invalid api key",
    r"(?i)unauthori[sz]ed",
];

/// Compiled once. A malformed pattern is logged and dropped on its own
/// so the rest of the list stays in force.
fn non_retryable_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        NON_RETRYABLE_PATTERNS
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    error!(pattern, error = %e, "Invalid non-retryable pattern, skipping");
                    None
                }
            })
            .collect()
    })
}

/// Whether the message matches the fixed non-retryable pattern list.
pub fn matches_non_retryable(message: &str) -> bool {
    non_retryable_patterns().iter().any(|re| re.is_match(message))
}

/// Whether another attempt could plausibly succeed.
///
/// Configuration, authorization (after the client's own refresh),
/// validation and cleanup errors are permanent. Everything else is
/// retried unless its message matches a non-retryable pattern.
pub fn is_retryable(err: &GraphPilotError) -> bool {
    match err.kind() {
        ErrorKind::Configuration | ErrorKind::Auth | ErrorKind::Validation | ErrorKind::Cleanup => {
            false
        }
        ErrorKind::Transient | ErrorKind::Timeout | ErrorKind::NotFound | ErrorKind::Other => {
            !matches_non_retryable(&err.to_string())
        }
    }
}
