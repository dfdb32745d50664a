//! Dependency resolution within a goal.
//!
//! A task is eligible to spawn when it is `pending` and every id in its
//! `dependsOn` names a task of the same goal that is `done`. Unknown ids
//! never resolve, so a task pointing at one stays ineligible instead of the
//! goal being rejected.

use crate::goal::Goal;
use crate::task::Task;
use crate::types::TaskStatus;
use std::collections::HashSet;

/// Tasks currently eligible to start, in declaration order.
pub fn eligible_tasks(goal: &Goal) -> Vec<&Task> {
    let done = done_ids(goal);
    goal.tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| t.depends_on.iter().all(|dep| done.contains(dep.as_str())))
        .collect()
}

pub fn eligible_ids(goal: &Goal) -> Vec<String> {
    eligible_tasks(goal).into_iter().map(|t| t.id.clone()).collect()
}

/// Dependencies of `task` that are not yet satisfied, including ids that do
/// not exist in the goal.
pub fn unsatisfied_deps<'a>(goal: &Goal, task: &'a Task) -> Vec<&'a str> {
    let done = done_ids(goal);
    task.depends_on
        .iter()
        .map(String::as_str)
        .filter(|dep| !done.contains(dep))
        .collect()
}

fn done_ids(goal: &Goal) -> HashSet<&str> {
    goal.tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .map(|t| t.id.as_str())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
