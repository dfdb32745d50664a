//! Condo, goal and task creation used by the PM workflow.
//!
//! Each operation is a single store update. Ids for condos and goals come
//! from the store; task ids are `T1`, `T2`, ... within their goal.

use crate::condo::Condo;
use crate::error::{CondoError, Result};
use crate::goal::Goal;
use crate::paths::validate_id;
use crate::store::{self, Store};
use crate::task::{self, Task};
use crate::types::AutonomyMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub condo_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phase: Option<u32>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub autonomy_mode: Option<AutonomyMode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub text: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub assigned_agent: Option<String>,
}

pub fn create_condo<S: Store + ?Sized>(
    store: &S,
    name: &str,
    description: Option<String>,
    now_ms: i64,
) -> Result<Condo> {
    if name.trim().is_empty() {
        return Err(CondoError::MissingField("name"));
    }
    let mut condo = Condo::new(store.new_id("condo"), name.trim(), now_ms);
    condo.description = description;
    store::update(store, |doc| {
        doc.condos.push(condo.clone());
        Ok(())
    })?;
    Ok(condo)
}

pub fn create_goal<S: Store + ?Sized>(store: &S, new: NewGoal, now_ms: i64) -> Result<Goal> {
    validate_id(&new.condo_id)?;
    if new.title.trim().is_empty() {
        return Err(CondoError::MissingField("title"));
    }
    let mut goal = Goal::new(store.new_id("goal"), &new.condo_id, new.title.trim(), now_ms);
    goal.description = new.description;
    goal.phase = new.phase;
    goal.max_retries = new.max_retries;
    goal.autonomy_mode = new.autonomy_mode;
    store::update(store, |doc| {
        doc.condo(&goal.condo_id)?;
        doc.goals.push(goal.clone());
        Ok(())
    })?;
    Ok(goal)
}

pub fn add_task<S: Store + ?Sized>(
    store: &S,
    goal_id: &str,
    new: NewTask,
    now_ms: i64,
) -> Result<Task> {
    validate_id(goal_id)?;
    if new.text.trim().is_empty() {
        return Err(CondoError::MissingField("text"));
    }
    for dep in &new.depends_on {
        validate_id(dep)?;
    }
    store::update(store, |doc| {
        let goal = doc.goal_mut(goal_id)?;
        let mut t = Task::new(next_task_id(&goal.tasks), new.text.trim(), now_ms);
        if new.depends_on.contains(&t.id) {
            return Err(CondoError::InvalidDependency(format!(
                "task {} cannot depend on itself",
                t.id
            )));
        }
        t.description = new.description.clone();
        t.depends_on = new.depends_on.clone();
        t.assigned_agent = new.assigned_agent.clone();
        warn_unknown_deps(goal, &t);
        goal.add_task(t.clone(), now_ms)?;
        Ok(t)
    })
}

/// Replace a task's dependency list.
pub fn set_dependencies<S: Store + ?Sized>(
    store: &S,
    goal_id: &str,
    task_id: &str,
    depends_on: Vec<String>,
    now_ms: i64,
) -> Result<Task> {
    for dep in &depends_on {
        validate_id(dep)?;
        if dep == task_id {
            return Err(CondoError::InvalidDependency(format!(
                "task {task_id} cannot depend on itself"
            )));
        }
    }
    store::update(store, |doc| {
        let goal = doc.goal_mut(goal_id)?;
        let t = goal.task_mut(task_id)?;
        t.depends_on = depends_on.clone();
        t.touch(now_ms);
        let t = t.clone();
        warn_unknown_deps(goal, &t);
        goal.updated_at_ms = now_ms;
        Ok(t)
    })
}

/// Close a goal by hand; refused while any task is not done.
pub fn close_goal<S: Store + ?Sized>(store: &S, goal_id: &str, now_ms: i64) -> Result<Goal> {
    validate_id(goal_id)?;
    store::update(store, |doc| {
        let goal = doc.goal_mut(goal_id)?;
        goal.close(now_ms)?;
        Ok(goal.clone())
    })
}

fn next_task_id(tasks: &[Task]) -> String {
    let mut n = tasks.len() + 1;
    loop {
        let id = format!("T{n}");
        if task::find(tasks, &id).is_none() {
            return id;
        }
        n += 1;
    }
}

fn warn_unknown_deps(goal: &Goal, t: &Task) {
    for dep in &t.depends_on {
        if task::find(&goal.tasks, dep).is_none() {
            tracing::warn!(
                goal_id = %goal.id,
                task_id = %t.id,
                dependency = %dep,
                "dependency does not name a task in this goal; task stays ineligible until it does"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
