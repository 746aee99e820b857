use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast::error::RecvError, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use graphpilot_core::error::Result;
use graphpilot_core::event::{EventBus, WorkflowEvent};

/// One recorded event with its offset from the start of the trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub event: WorkflowEvent,
}

/// Records every workflow event of a run for later export.
///
/// Subscribes before the workflow starts, so no event is missed. Stops
/// on the first terminal event or when [`TraceRecorder::stop`] is called.
pub struct TraceRecorder {
    entries: Arc<Mutex<Vec<TraceEntry>>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TraceRecorder {
    pub fn start(event_bus: &EventBus) -> Self {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let mut rx = event_bus.subscribe();
        let sink = entries.clone();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        // Keep what was already published before the stop.
                        while let Ok(event) = rx.try_recv() {
                            let terminal = event.is_terminal();
                            push(&sink, started, event).await;
                            if terminal {
                                break;
                            }
                        }
                        debug!("Trace recorder cancelled");
                        break;
                    }
                    result = rx.recv() => match result {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            push(&sink, started, event).await;
                            if terminal {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Trace recorder lagged, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        Self {
            entries,
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop recording and wait for the background task to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Trace recorder task failed");
            }
        }
    }

    pub async fn entries(&self) -> Vec<TraceEntry> {
        self.entries.lock().await.clone()
    }

    /// Write the trace to `dir` in each requested format.
    ///
    /// Formats: `json` (array), `jsonl` (one entry per line) and
    /// `summary` (markdown). Unknown formats are logged and skipped.
    pub async fn export_trace(&self, dir: &Path, formats: &[String]) -> Result<Vec<PathBuf>> {
        let entries = self.entries().await;
        export_entries(&entries, dir, formats).await
    }
}

impl Drop for TraceRecorder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn push(sink: &Mutex<Vec<TraceEntry>>, started: Instant, event: WorkflowEvent) {
    sink.lock().await.push(TraceEntry {
        timestamp: Utc::now(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        event,
    });
}

pub async fn export_entries(
    entries: &[TraceEntry],
    dir: &Path,
    formats: &[String],
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut written = Vec::new();

    for format in formats {
        let (path, body) = match format.as_str() {
            "json" => (dir.join("trace.json"), serde_json::to_string_pretty(entries)?),
            "jsonl" => {
                let mut body = String::new();
                for entry in entries {
                    body.push_str(&serde_json::to_string(entry)?);
                    body.push('\n');
                }
                (dir.join("trace.jsonl"), body)
            }
            "summary" => (dir.join("trace_summary.md"), summarize(entries)),
            other => {
                warn!(format = other, "Unknown trace format, skipping");
                continue;
            }
        };
        tokio::fs::write(&path, body).await?;
        written.push(path);
    }

    info!(dir = %dir.display(), files = written.len(), "Trace exported");
    Ok(written)
}

fn summarize(entries: &[TraceEntry]) -> String {
    let mut out = String::from("# Workflow trace\n\n");
    let total = entries.last().map(|e| e.elapsed_ms).unwrap_or(0);
    let _ = writeln!(out, "- events: {}", entries.len());
    let _ = writeln!(out, "- duration: {} ms\n", total);

    let _ = writeln!(out, "| step | outcome | detail |\n|---|---|---|");
    for entry in entries {
        match &entry.event {
            WorkflowEvent::StepCompleted { step, elapsed_ms } => {
                let _ = writeln!(out, "| {} | completed | {} ms |", step, elapsed_ms);
            }
            WorkflowEvent::StepSkipped { step, error } => {
                let _ = writeln!(out, "| {} | skipped | {} |", step, error);
            }
            WorkflowEvent::StepRetried { step, error, attempt } => {
                let _ = writeln!(out, "| {} | retry {} | {} |", step, attempt, error);
            }
            WorkflowEvent::WorkflowAborted { step, error } => {
                let _ = writeln!(out, "| {} | aborted | {} |", step, error);
            }
            WorkflowEvent::EngineCleanupFailed { engine_id, error } => {
                let _ = writeln!(out, "| engine {} | cleanup failed | {} |", engine_id, error);
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn records_until_terminal_event() {
        let bus = EventBus::default();
        let mut recorder = TraceRecorder::start(&bus);
        bus.publish(WorkflowEvent::StepCompleted {
            step: "schema_analysis".into(),
            elapsed_ms: 3,
        });
        bus.publish(WorkflowEvent::WorkflowCompleted {
            run_id: "r1".into(),
            completed_steps: 6,
        });
        bus.publish(WorkflowEvent::EngineDeleted {
            engine_id: "late".into(),
        });
        recorder.stop().await;

        let names: Vec<_> = recorder.entries().await.iter().map(|e| e.event.name()).collect();
        assert_eq!(names, vec!["step_completed", "workflow_completed"]);
    }

    #[tokio::test]
    async fn stop_drains_published_events() {
        let bus = EventBus::default();
        let mut recorder = TraceRecorder::start(&bus);
        for i in 0..5 {
            bus.publish(WorkflowEvent::EngineDeleted {
                engine_id: format!("e{}", i),
            });
        }
        recorder.stop().await;
        assert_eq!(recorder.entries().await.len(), 5);
    }

    #[tokio::test]
    async fn exports_requested_formats() {
        let bus = EventBus::default();
        let mut recorder = TraceRecorder::start(&bus);
        bus.publish(WorkflowEvent::StepSkipped {
            step: "reporting".into(),
            error: "no reports".into(),
        });
        bus.publish(WorkflowEvent::WorkflowAborted {
            step: "execution".into(),
            error: "engine down".into(),
        });
        recorder.stop().await;

        let dir = tempfile::tempdir().unwrap();
        let written = recorder
            .export_trace(dir.path(), &formats(&["json", "jsonl", "summary", "xml"]))
            .await
            .unwrap();
        assert_eq!(written.len(), 3);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("trace.json")).unwrap())
                .unwrap();
        assert_eq!(json[0]["event"], "step_skipped");

        let lines = std::fs::read_to_string(dir.path().join("trace.jsonl")).unwrap();
        assert_eq!(lines.lines().count(), 2);

        let summary = std::fs::read_to_string(dir.path().join("trace_summary.md")).unwrap();
        assert!(summary.contains("| reporting | skipped | no reports |"));
        assert!(summary.contains("| execution | aborted | engine down |"));
    }
}
