use crate::condo::Condo;
use crate::goal::Goal;
use crate::task::Task;
use crate::types::AutonomyMode;
use serde::{Deserialize, Serialize};

/// Payload handed to the session spawner. The lifecycle never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    pub condo_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condo_name: Option<String>,
    pub goal_id: String,
    pub goal_title: String,
    pub task_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub autonomy_mode: AutonomyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_role: Option<String>,
    pub prompt: String,
}

pub trait ContextBuilder: Send + Sync {
    fn build(&self, task: &Task, goal: &Goal, condo: Option<&Condo>) -> TaskContext;
}

/// Renders a markdown prompt describing the assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContextBuilder;

impl ContextBuilder for DefaultContextBuilder {
    fn build(&self, task: &Task, goal: &Goal, condo: Option<&Condo>) -> TaskContext {
        let mode = goal.autonomy();
        let mut prompt = String::new();
        if let Some(c) = condo {
            prompt.push_str(&format!("# Project: {}\n\n", c.name));
        }
        prompt.push_str(&format!("## Goal: {}\n\n", goal.title));
        if let Some(desc) = &goal.description {
            prompt.push_str(desc);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!("## Your task ({})\n\n{}\n", task.id, task.text));
        if let Some(desc) = &task.description {
            prompt.push('\n');
            prompt.push_str(desc);
            prompt.push('\n');
        }
        if let Some(role) = &task.assigned_agent {
            prompt.push_str(&format!("\nYou are acting as: {role}\n"));
        }
        prompt.push_str(&format!("\nAutonomy ({mode}): {}\n", mode.instructions()));
        prompt.push_str(&format!(
            "When finished call goal_update with goalId={} taskId={} status=done.\n",
            goal.id, task.id
        ));

        TaskContext {
            condo_id: goal.condo_id.clone(),
            condo_name: condo.map(|c| c.name.clone()),
            goal_id: goal.id.clone(),
            goal_title: goal.title.clone(),
            task_id: task.id.clone(),
            text: task.text.clone(),
            description: task.description.clone(),
            autonomy_mode: mode,
            assigned_role: task.assigned_agent.clone(),
            prompt,
        }
    }
}
