use crate::error::{CondoError, Result};
use crate::task::{self, Task};
use crate::types::{AutonomyMode, GoalStatus, TaskStatus};
use serde::{Deserialize, Serialize};

/// Retry policy applied when a goal does not set `maxRetries`.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

// ---------------------------------------------------------------------------
// Goal
// ---------------------------------------------------------------------------

/// A unit of planned work inside a condo. Exclusively owns its tasks;
/// declaration order of `tasks` is the spawn order tie-break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub condo_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: GoalStatus,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub autonomy_mode: Option<AutonomyMode>,
    #[serde(default)]
    pub phase: Option<u32>,
    /// First kickoff of this goal. Guards the phase cascade against
    /// kicking the same goal twice.
    #[serde(default)]
    pub kicked_off_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<i64>,
}

impl Goal {
    pub fn new(
        id: impl Into<String>,
        condo_id: impl Into<String>,
        title: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            condo_id: condo_id.into(),
            title: title.into(),
            description: None,
            status: GoalStatus::Active,
            tasks: Vec::new(),
            max_retries: None,
            autonomy_mode: None,
            phase: None,
            kicked_off_at_ms: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            completed_at_ms: None,
        }
    }

    pub fn task(&self, task_id: &str) -> Result<&Task> {
        task::find(&self.tasks, task_id)
            .ok_or_else(|| CondoError::task_not_found(&self.id, task_id))
    }

    pub fn task_mut(&mut self, task_id: &str) -> Result<&mut Task> {
        let goal_id = self.id.clone();
        task::find_mut(&mut self.tasks, task_id)
            .ok_or_else(|| CondoError::task_not_found(&goal_id, task_id))
    }

    pub fn task_by_session(&self, session_key: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.session_key.as_deref() == Some(session_key))
    }

    /// Append a task. Ids are unique within the goal.
    pub fn add_task(&mut self, task: Task, now_ms: i64) -> Result<()> {
        if task::find(&self.tasks, &task.id).is_some() {
            return Err(CondoError::InvalidTransition {
                from: "absent".to_string(),
                to: "pending".to_string(),
                reason: format!("task id {} already exists in goal {}", task.id, self.id),
            });
        }
        self.tasks.push(task);
        self.refresh_status(now_ms);
        self.updated_at_ms = now_ms;
        Ok(())
    }

    pub fn effective_max_retries(&self, default: u32) -> u32 {
        self.max_retries.unwrap_or(default)
    }

    pub fn autonomy(&self) -> AutonomyMode {
        self.autonomy_mode.unwrap_or_default()
    }

    /// Derived completion: every task is done. A goal without tasks is only
    /// complete once it was closed explicitly.
    pub fn is_complete(&self) -> bool {
        if self.tasks.is_empty() {
            return self.status == GoalStatus::Done;
        }
        self.tasks.iter().all(|t| t.status == TaskStatus::Done)
    }

    /// Sync the persisted `status` with the task set. Returns `true` when the
    /// goal just became complete.
    pub fn refresh_status(&mut self, now_ms: i64) -> bool {
        let complete = self.is_complete();
        match (self.status, complete) {
            (GoalStatus::Active, true) => {
                self.status = GoalStatus::Done;
                self.completed_at_ms = Some(now_ms);
                self.updated_at_ms = now_ms;
                true
            }
            (GoalStatus::Done, false) => {
                self.status = GoalStatus::Active;
                self.completed_at_ms = None;
                self.updated_at_ms = now_ms;
                false
            }
            _ => false,
        }
    }

    /// Close the goal by hand. Refused while any task is not done.
    pub fn close(&mut self, now_ms: i64) -> Result<()> {
        if let Some(open) = self.tasks.iter().find(|t| t.status != TaskStatus::Done) {
            return Err(CondoError::GoalIncomplete {
                goal: self.id.clone(),
                reason: format!("task {} is {}", open.id, open.status),
            });
        }
        if self.status != GoalStatus::Done {
            self.status = GoalStatus::Done;
            self.completed_at_ms = Some(now_ms);
            self.updated_at_ms = now_ms;
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        task::summarize(&self.tasks)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
