use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
///
/// Transitions driven by this crate:
/// `Pending → InProgress` (kickoff), `InProgress → Done` (goal_update),
/// `InProgress → Pending | Failed` (session ended), `InProgress → Pending`
/// (kill). `Blocked` and `Waiting` are set by the agent through goal_update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Waiting,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn all() -> &'static [TaskStatus] {
        &[
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Waiting,
            TaskStatus::Done,
            TaskStatus::Failed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    /// Statuses that keep a goal from being closed.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::Blocked | TaskStatus::Waiting
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::error::CondoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" | "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "waiting" => Ok(TaskStatus::Waiting),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(crate::error::CondoError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// GoalStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Done,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GoalStatus::Active => "active",
            GoalStatus::Done => "done",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// AutonomyMode
// ---------------------------------------------------------------------------

/// How much latitude a spawned agent has. Forwarded to the agent in its
/// task context; the lifecycle itself does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyMode {
    #[default]
    Full,
    Plan,
    Step,
    Supervised,
}

impl AutonomyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AutonomyMode::Full => "full",
            AutonomyMode::Plan => "plan",
            AutonomyMode::Step => "step",
            AutonomyMode::Supervised => "supervised",
        }
    }

    /// Instruction line included in the agent prompt.
    pub fn instructions(self) -> &'static str {
        match self {
            AutonomyMode::Full => {
                "Work autonomously. Report completion with goal_update when finished."
            }
            AutonomyMode::Plan => {
                "Propose a plan first and wait for approval before making changes."
            }
            AutonomyMode::Step => "Complete one step at a time and report after each step.",
            AutonomyMode::Supervised => {
                "Ask for confirmation before every change that touches shared state."
            }
        }
    }
}

impl fmt::Display for AutonomyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AutonomyMode {
    type Err = crate::error::CondoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(AutonomyMode::Full),
            "plan" => Ok(AutonomyMode::Plan),
            "step" => Ok(AutonomyMode::Step),
            "supervised" => Ok(AutonomyMode::Supervised),
            _ => Err(crate::error::CondoError::InvalidAutonomyMode(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
