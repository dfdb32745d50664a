use crate::error::{CondoError, Result};
use crate::types::TaskStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Weak reference to the externally managed agent session.
    #[serde(default)]
    pub session_key: Option<String>,
    /// Set once the gateway confirmed the session start for `session_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_started_at_ms: Option<i64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<i64>,
}

impl Task {
    pub fn new(id: impl Into<String>, text: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            description: None,
            status: TaskStatus::Pending,
            depends_on: Vec::new(),
            session_key: None,
            session_started_at_ms: None,
            retry_count: 0,
            last_error: None,
            assigned_agent: None,
            summary: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            completed_at_ms: None,
        }
    }

    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at_ms = now_ms;
    }

    /// Move a pending task to in-progress and record its session binding.
    pub fn bind_session(&mut self, session_key: impl Into<String>, now_ms: i64) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.transition_error(TaskStatus::InProgress, "only pending tasks start"));
        }
        self.status = TaskStatus::InProgress;
        self.session_key = Some(session_key.into());
        self.session_started_at_ms = None;
        self.touch(now_ms);
        Ok(())
    }

    /// Stamp the "started" flag if `session_key` is still the bound session.
    ///
    /// Returns `false` when the task has moved on (retried, killed, completed)
    /// since the key was allocated, or when it was already confirmed.
    pub fn confirm_started(&mut self, session_key: &str, now_ms: i64) -> bool {
        if self.status != TaskStatus::InProgress
            || self.session_key.as_deref() != Some(session_key)
            || self.session_started_at_ms.is_some()
        {
            return false;
        }
        self.session_started_at_ms = Some(now_ms);
        self.touch(now_ms);
        true
    }

    pub fn release_session(&mut self) {
        self.session_key = None;
        self.session_started_at_ms = None;
    }

    /// Mark the task done. Returns `false` if it already was.
    pub fn mark_done(&mut self, now_ms: i64) -> Result<bool> {
        match self.status {
            TaskStatus::Done => Ok(false),
            TaskStatus::Failed => Err(self.transition_error(
                TaskStatus::Done,
                "failed tasks must be reset to pending first",
            )),
            _ => {
                self.status = TaskStatus::Done;
                self.release_session();
                self.completed_at_ms = Some(now_ms);
                self.touch(now_ms);
                Ok(true)
            }
        }
    }

    /// Apply a status reported through goal_update.
    ///
    /// `Pending` is the manual reset and the only way out of `Failed`; it
    /// never touches `retry_count`. `InProgress` only resumes a task that
    /// still holds a session; starting fresh work goes through kickoff.
    pub fn apply_update(
        &mut self,
        status: TaskStatus,
        summary: Option<String>,
        now_ms: i64,
    ) -> Result<bool> {
        if summary.is_some() {
            self.summary = summary.clone();
        }
        let changed = match status {
            TaskStatus::Done => self.mark_done(now_ms)?,
            TaskStatus::Blocked | TaskStatus::Waiting => {
                if matches!(self.status, TaskStatus::Done | TaskStatus::Failed) {
                    return Err(self.transition_error(status, "task is terminal"));
                }
                let changed = self.status != status;
                self.status = status;
                changed
            }
            TaskStatus::InProgress => match self.status {
                TaskStatus::InProgress => false,
                TaskStatus::Blocked | TaskStatus::Waiting if self.session_key.is_some() => {
                    self.status = TaskStatus::InProgress;
                    true
                }
                _ => {
                    return Err(self.transition_error(
                        status,
                        "only a blocked or waiting task with a bound session can resume",
                    ))
                }
            },
            TaskStatus::Pending => {
                let changed = self.status != TaskStatus::Pending;
                self.status = TaskStatus::Pending;
                self.release_session();
                self.last_error = None;
                self.completed_at_ms = None;
                changed
            }
            TaskStatus::Failed => {
                if self.status == TaskStatus::Done {
                    return Err(self.transition_error(status, "task is already done"));
                }
                let changed = self.status != TaskStatus::Failed;
                self.status = TaskStatus::Failed;
                self.release_session();
                self.last_error = Some(summary.unwrap_or_else(|| "marked failed".to_string()));
                changed
            }
        };
        self.touch(now_ms);
        Ok(changed)
    }

    fn transition_error(&self, to: TaskStatus, reason: &str) -> CondoError {
        CondoError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
            reason: format!("task {}: {reason}", self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Task list helpers
// ---------------------------------------------------------------------------

pub fn find<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    tasks.iter().find(|t| t.id == id)
}

pub fn find_mut<'a>(tasks: &'a mut [Task], id: &str) -> Option<&'a mut Task> {
    tasks.iter_mut().find(|t| t.id == id)
}

/// Human-readable summary: "3/5 done, 1 in progress, 1 failed"
pub fn summarize(tasks: &[Task]) -> String {
    let count = |s: TaskStatus| tasks.iter().filter(|t| t.status == s).count();
    let mut out = format!(
        "{}/{} done, {} in progress",
        count(TaskStatus::Done),
        tasks.len(),
        count(TaskStatus::InProgress)
    );
    for status in [TaskStatus::Blocked, TaskStatus::Waiting, TaskStatus::Failed] {
        let n = count(status);
        if n > 0 {
            out.push_str(&format!(", {n} {status}"));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
