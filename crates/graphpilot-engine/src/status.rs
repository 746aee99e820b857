use serde_json::Value;

use graphpilot_core::error::{GraphPilotError, Result};
use graphpilot_core::types::{JobProgress, JobState};

/// Normalize a raw job status document.
///
/// Engines report job state in one of three shapes:
/// - `{"status": "done"}`, a status string
/// - `{"progress": 10, "total": 10}`, progress counters
/// - `{"state": "completed"}`, a state string
///
/// An `error` flag or message in any shape marks the job failed.
pub fn normalize_job_status(raw: &Value) -> Result<JobProgress> {
    let progress = raw.get("progress").and_then(Value::as_u64);
    let total = raw.get("total").and_then(Value::as_u64);
    let documents_updated = ["documents_updated", "updated", "stored"]
        .iter()
        .find_map(|k| raw.get(*k).and_then(Value::as_u64));
    let error = error_message(raw);

    let state = if error.is_some() {
        JobState::Failed
    } else if let Some(s) = raw.get("status").and_then(Value::as_str) {
        state_from_str(s)
    } else if let Some(s) = raw.get("state").and_then(Value::as_str) {
        state_from_str(s)
    } else if let (Some(p), Some(t)) = (progress, total) {
        if t > 0 && p >= t {
            JobState::Succeeded
        } else {
            JobState::Running
        }
    } else {
        return Err(GraphPilotError::Transient(format!(
            "Unrecognized job status document: {}",
            raw
        )));
    };

    Ok(JobProgress {
        state,
        progress,
        total,
        documents_updated,
        error,
    })
}

fn state_from_str(s: &str) -> JobState {
    match s.to_lowercase().as_str() {
        "done" | "complete" | "completed" | "succeeded" | "success" | "finished" => {
            JobState::Succeeded
        }
        "failed" | "failure" | "error" | "errored" | "cancelled" | "canceled" | "aborted" => {
            JobState::Failed
        }
        _ => JobState::Running,
    }
}

fn error_message(raw: &Value) -> Option<String> {
    let detail = ["error_message", "errorMessage", "message"]
        .iter()
        .find_map(|k| raw.get(*k).and_then(Value::as_str))
        .map(str::to_string);

    match raw.get("error") {
        Some(Value::Bool(true)) => Some(detail.unwrap_or_else(|| "job reported an error".into())),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_string_shape() {
        let p = normalize_job_status(&json!({"status": "done", "updated": 42})).unwrap();
        assert_eq!(p.state, JobState::Succeeded);
        assert_eq!(p.documents_updated, Some(42));

        let p = normalize_job_status(&json!({"status": "running"})).unwrap();
        assert_eq!(p.state, JobState::Running);
    }

    #[test]
    fn test_progress_counter_shape() {
        let p = normalize_job_status(&json!({"progress": 3, "total": 10})).unwrap();
        assert_eq!(p.state, JobState::Running);

        let p = normalize_job_status(&json!({"progress": 10, "total": 10})).unwrap();
        assert_eq!(p.state, JobState::Succeeded);
    }

    #[test]
    fn test_state_string_shape() {
        let p = normalize_job_status(&json!({"state": "Completed"})).unwrap();
        assert_eq!(p.state, JobState::Succeeded);

        let p = normalize_job_status(&json!({"state": "cancelled"})).unwrap();
        assert_eq!(p.state, JobState::Failed);
    }

    #[test]
    fn test_error_flag_overrides_progress() {
        let p = normalize_job_status(&json!({
            "progress": 10,
            "total": 10,
            "error": true,
            "error_message": "out of memory"
        }))
        .unwrap();
        assert_eq!(p.state, JobState::Failed);
        assert_eq!(p.error.as_deref(), Some("out of memory"));
    }

    #[test]
    fn test_unknown_shape_is_an_error() {
        assert!(normalize_job_status(&json!({"foo": 1})).is_err());
    }
}
