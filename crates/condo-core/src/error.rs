use thiserror::Error;

#[derive(Debug, Error)]
pub enum CondoError {
    #[error("not initialized: run 'condo init'")]
    NotInitialized,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid id '{0}': must be alphanumeric with '-', '_', ':' or '.'")]
    InvalidId(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid autonomy mode: {0}")]
    InvalidAutonomyMode(String),

    #[error("condo not found: {0}")]
    CondoNotFound(String),

    #[error("goal not found: {0}")]
    GoalNotFound(String),

    #[error("task not found: {task} (goal {goal})")]
    TaskNotFound { goal: String, task: String },

    #[error("invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("goal {goal} is not complete: {reason}")]
    GoalIncomplete { goal: String, reason: String },

    #[error("store version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CondoError {
    pub fn task_not_found(goal: &str, task: &str) -> Self {
        CondoError::TaskNotFound {
            goal: goal.to_string(),
            task: task.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CondoError>;
