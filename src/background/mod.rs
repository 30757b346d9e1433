//! Background Executor: fire-and-forget shell commands that outlive the
//! tool call that launched them, with a drain-once notification queue.
//!
//! Grounded on `original_source/backend/app/background/runner.py`
//! (`_tasks`, `_notification_queue`, 300s timeout, 50000-byte truncation),
//! re-architected onto `tokio::spawn` instead of a daemon `threading.Thread`
//! per SPEC_FULL.md §5.

use crate::session::tracer::Tracer;
use crate::types::{BackgroundJob, BackgroundNotification, BackgroundStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;

const RUN_TIMEOUT: Duration = Duration::from_secs(300);
const RUN_OUTPUT_LIMIT: usize = 50_000;
const NOTIFICATION_COMMAND_PREVIEW: usize = 80;
const NOTIFICATION_RESULT_PREVIEW: usize = 500;

#[derive(Default)]
struct Inner {
    jobs: Mutex<HashMap<String, BackgroundJob>>,
    notifications: Mutex<Vec<BackgroundNotification>>,
}

/// Cloneable handle; every clone shares the same job table and
/// notification queue through the inner `Arc`.
#[derive(Clone, Default)]
pub struct BackgroundExecutor {
    inner: Arc<Inner>,
    tracer: Option<Arc<Tracer>>,
}

impl BackgroundExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Spawn `command` in `workdir` and return its task id immediately.
    pub fn run(&self, command: &str, workdir: PathBuf) -> String {
        let task_id = Tracer::new_run_id();
        self.inner.jobs.lock().unwrap().insert(
            task_id.clone(),
            BackgroundJob {
                task_id: task_id.clone(),
                command: command.to_string(),
                status: BackgroundStatus::Running,
                result: None,
            },
        );

        let inner = self.inner.clone();
        let tracer = self.tracer.clone();
        let command = command.to_string();
        let id_for_task = task_id.clone();

        tokio::spawn(async move {
            let child = Command::new("sh")
                .args(["-c", &command])
                .current_dir(&workdir)
                .output();

            let (status, output) = match tokio::time::timeout(RUN_TIMEOUT, child).await {
                Ok(Ok(result)) => {
                    let combined = merge_output(&result.stdout, &result.stderr);
                    (BackgroundStatus::Completed, combined)
                }
                Ok(Err(e)) => (BackgroundStatus::Error, format!("Error: {e}")),
                Err(_) => (BackgroundStatus::Timeout, "Error: Timeout (300s)".to_string()),
            };
            let output = if output.is_empty() {
                "(no output)".to_string()
            } else {
                output.chars().take(RUN_OUTPUT_LIMIT).collect()
            };

            {
                let mut jobs = inner.jobs.lock().unwrap();
                if let Some(job) = jobs.get_mut(&id_for_task) {
                    job.status = status;
                    job.result = Some(output.clone());
                }
            }
            inner.notifications.lock().unwrap().push(BackgroundNotification {
                task_id: id_for_task.clone(),
                status,
                result: output.chars().take(NOTIFICATION_RESULT_PREVIEW).collect(),
            });
            if let Some(t) = &tracer {
                t.emit(
                    "background.complete",
                    serde_json::json!({
                        "task_id": id_for_task,
                        "status": status.to_string(),
                        "command": command.chars().take(NOTIFICATION_COMMAND_PREVIEW).collect::<String>(),
                    }),
                );
            }
        });

        task_id
    }

    /// Spawn a sub-agent run in the background under the same job/
    /// notification bookkeeping as `run`. `runner` is the sub-agent
    /// invocation (`agent::subagent::run`), passed in rather than called
    /// directly to keep this module free of a dependency on `agent`.
    pub fn run_agent<F, Fut>(&self, description: &str, runner: F) -> String
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let task_id = Tracer::new_run_id();
        self.inner.jobs.lock().unwrap().insert(
            task_id.clone(),
            BackgroundJob {
                task_id: task_id.clone(),
                command: format!("Task: {description}"),
                status: BackgroundStatus::Running,
                result: None,
            },
        );

        let inner = self.inner.clone();
        let tracer = self.tracer.clone();
        let id_for_task = task_id.clone();
        let description = description.to_string();

        tokio::spawn(async move {
            let (status, output) = match tokio::time::timeout(RUN_TIMEOUT, runner()).await {
                Ok(Ok(text)) => (BackgroundStatus::Completed, text),
                Ok(Err(e)) => (BackgroundStatus::Error, format!("Error: {e}")),
                Err(_) => (BackgroundStatus::Timeout, "Error: Timeout (300s)".to_string()),
            };
            let output: String = output.chars().take(RUN_OUTPUT_LIMIT).collect();

            {
                let mut jobs = inner.jobs.lock().unwrap();
                if let Some(job) = jobs.get_mut(&id_for_task) {
                    job.status = status;
                    job.result = Some(output.clone());
                }
            }
            inner.notifications.lock().unwrap().push(BackgroundNotification {
                task_id: id_for_task.clone(),
                status,
                result: output.chars().take(NOTIFICATION_RESULT_PREVIEW).collect(),
            });
            if let Some(t) = &tracer {
                t.emit(
                    "background.agent_complete",
                    serde_json::json!({
                        "task_id": id_for_task,
                        "status": status.to_string(),
                        "description": description.chars().take(NOTIFICATION_COMMAND_PREVIEW).collect::<String>(),
                    }),
                );
            }
        });

        task_id
    }

    /// Render one job's status, or a summary of every job if `task_id`
    /// is `None`.
    pub fn check(&self, task_id: Option<&str>) -> String {
        let jobs = self.inner.jobs.lock().unwrap();
        if let Some(id) = task_id {
            return match jobs.get(id) {
                Some(job) => format!(
                    "[{}] {}\n{}",
                    job.status,
                    preview(&job.command, 60),
                    job.result.clone().unwrap_or_else(|| "(running)".to_string())
                ),
                None => format!("Error: Unknown task {id}"),
            };
        }
        if jobs.is_empty() {
            return "No background tasks.".to_string();
        }
        let mut lines: Vec<String> = jobs
            .values()
            .map(|j| format!("{}: [{}] {}", j.task_id, j.status, preview(&j.command, 60)))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    /// Drain and return every notification queued since the last call.
    pub fn drain_notifications(&self) -> Vec<BackgroundNotification> {
        let mut notifs = self.inner.notifications.lock().unwrap();
        std::mem::take(&mut *notifs)
    }
}

fn preview(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr);
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_completes_and_notifies() {
        let exec = BackgroundExecutor::new();
        let id = exec.run("echo hi", std::env::temp_dir());
        for _ in 0..50 {
            if exec.check(Some(&id)).starts_with("[completed]") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(exec.check(Some(&id)).contains("hi"));

        let notifs = exec.drain_notifications();
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0].task_id, id);
        assert!(exec.drain_notifications().is_empty());
    }

    #[test]
    fn check_unknown_task_is_an_error_string() {
        let exec = BackgroundExecutor::new();
        assert_eq!(exec.check(Some("nope")), "Error: Unknown task nope");
    }

    #[test]
    fn check_with_no_jobs_reports_none() {
        let exec = BackgroundExecutor::new();
        assert_eq!(exec.check(None), "No background tasks.");
    }
}
