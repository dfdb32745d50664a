//! Retry/failure supervision of agent sessions.
//!
//! | Task state                         | Next                                  |
//! |------------------------------------|---------------------------------------|
//! | `done`                             | unchanged                             |
//! | `in-progress`, retries left        | `pending`, session cleared, retry + 1 |
//! | `in-progress`, retries exhausted   | `failed`, session cleared             |
//! | anything else                      | unchanged                             |
//!
//! A kill is not an agent failure: it resets bound tasks to `pending`
//! without consuming a retry.

use crate::error::Result;
use crate::goal::Goal;
use crate::types::TaskStatus;
use serde::{Deserialize, Serialize};

/// How the external runtime says a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The agent reported success but never marked its task done.
    Success,
    /// The agent run errored.
    Failure,
    /// The session went away without saying either.
    Unknown,
}

impl SessionOutcome {
    pub fn from_flag(success: Option<bool>) -> Self {
        match success {
            Some(true) => SessionOutcome::Success,
            Some(false) => SessionOutcome::Failure,
            None => SessionOutcome::Unknown,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            SessionOutcome::Failure => "agent session failed",
            SessionOutcome::Success | SessionOutcome::Unknown => {
                "agent session ended without marking the task done"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SupervisorDecision {
    /// No state change: the task is terminal, not running, or the ending
    /// session is no longer the one bound to it.
    Ignored { reason: String },
    Retried {
        goal_id: String,
        task_id: String,
        retry_count: u32,
        max_retries: u32,
        error: String,
    },
    Failed {
        goal_id: String,
        task_id: String,
        retry_count: u32,
        max_retries: u32,
        error: String,
    },
}

impl SupervisorDecision {
    pub fn changed(&self) -> bool {
        !matches!(self, SupervisorDecision::Ignored { .. })
    }
}

/// Apply a session-ended notification to `task_id`.
///
/// When `ended_session` is given and differs from the task's current
/// binding, the notification is stale (the task was already retried or
/// killed) and is ignored.
pub fn on_session_end(
    goal: &mut Goal,
    task_id: &str,
    ended_session: Option<&str>,
    outcome: SessionOutcome,
    default_max_retries: u32,
    now_ms: i64,
) -> Result<SupervisorDecision> {
    let max_retries = goal.effective_max_retries(default_max_retries);
    let goal_id = goal.id.clone();
    let task = goal.task_mut(task_id)?;

    if task.status != TaskStatus::InProgress {
        return Ok(SupervisorDecision::Ignored {
            reason: format!("task {} is {}", task.id, task.status),
        });
    }
    if let Some(key) = ended_session {
        if task.session_key.as_deref() != Some(key) {
            return Ok(SupervisorDecision::Ignored {
                reason: format!("session {key} is no longer bound to task {}", task.id),
            });
        }
    }

    task.release_session();
    task.touch(now_ms);

    if task.retry_count < max_retries {
        task.retry_count += 1;
        task.status = TaskStatus::Pending;
        let error = format!(
            "{} (retry {}/{})",
            outcome.describe(),
            task.retry_count,
            max_retries
        );
        task.last_error = Some(error.clone());
        Ok(SupervisorDecision::Retried {
            goal_id,
            task_id: task.id.clone(),
            retry_count: task.retry_count,
            max_retries,
            error,
        })
    } else {
        task.status = TaskStatus::Failed;
        let error = format!(
            "max retries ({max_retries}) exhausted: {}",
            outcome.describe()
        );
        task.last_error = Some(error.clone());
        Ok(SupervisorDecision::Failed {
            goal_id,
            task_id: task.id.clone(),
            retry_count: task.retry_count,
            max_retries,
            error,
        })
    }
}

/// A session released by a kill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KilledSession {
    pub goal_id: String,
    pub task_id: String,
    pub session_key: String,
}

/// Reset every task of `goal` that holds a live session back to `pending`.
/// `retry_count` is left alone and done tasks are never touched.
pub fn reset_for_kill(goal: &mut Goal, now_ms: i64) -> Vec<KilledSession> {
    let mut killed = Vec::new();
    for task in goal.tasks.iter_mut() {
        if !matches!(
            task.status,
            TaskStatus::InProgress | TaskStatus::Blocked | TaskStatus::Waiting
        ) {
            continue;
        }
        let Some(session_key) = task.session_key.clone() else {
            continue;
        };
        task.release_session();
        task.status = TaskStatus::Pending;
        task.touch(now_ms);
        killed.push(KilledSession {
            goal_id: goal.id.clone(),
            task_id: task.id.clone(),
            session_key,
        });
    }
    if !killed.is_empty() {
        goal.updated_at_ms = now_ms;
    }
    killed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
