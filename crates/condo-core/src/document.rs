use crate::condo::Condo;
use crate::error::{CondoError, Result};
use crate::goal::Goal;
use serde::{Deserialize, Serialize};

/// The full persisted state. Every mutation loads the whole document,
/// changes it in memory and saves it back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    /// Optimistic concurrency token, bumped by the store on every save.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub condos: Vec<Condo>,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

impl StoreDocument {
    pub fn condo(&self, condo_id: &str) -> Result<&Condo> {
        self.condos
            .iter()
            .find(|c| c.id == condo_id)
            .ok_or_else(|| CondoError::CondoNotFound(condo_id.to_string()))
    }

    pub fn goal(&self, goal_id: &str) -> Result<&Goal> {
        self.goals
            .iter()
            .find(|g| g.id == goal_id)
            .ok_or_else(|| CondoError::GoalNotFound(goal_id.to_string()))
    }

    pub fn goal_mut(&mut self, goal_id: &str) -> Result<&mut Goal> {
        self.goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or_else(|| CondoError::GoalNotFound(goal_id.to_string()))
    }

    pub fn goals_in_condo<'a>(&'a self, condo_id: &'a str) -> impl Iterator<Item = &'a Goal> + 'a {
        self.goals.iter().filter(move |g| g.condo_id == condo_id)
    }

    /// Locate the goal and task currently bound to `session_key`.
    pub fn find_session(&self, session_key: &str) -> Option<(&Goal, &str)> {
        self.goals.iter().find_map(|g| {
            g.task_by_session(session_key)
                .map(|t| (g, t.id.as_str()))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
