//! Claim phase of a goal kickoff.
//!
//! Claiming moves every eligible task from `pending` to `in-progress` and
//! binds a freshly derived session key, all inside one store update. Session
//! start requests are issued only after the claim is persisted, so a second
//! kickoff racing the first finds nothing left to claim.

use crate::context::{ContextBuilder, TaskContext};
use crate::document::StoreDocument;
use crate::error::Result;
use crate::goal::Goal;
use crate::resolver;
use crate::task::Task;
use serde::{Deserialize, Serialize};

/// What caused a kickoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KickoffTrigger {
    /// `goals.kickoff` from the UI or CLI.
    Manual,
    /// Re-run after a task in the same goal completed or a session ended.
    Cascade,
    /// A goal in an earlier phase of the condo completed.
    Phase,
}

/// A task transitioned to in-progress by a kickoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedSession {
    pub task_id: String,
    pub session_key: String,
}

/// A claimed task together with the context its session should start with.
#[derive(Debug, Clone)]
pub struct Claim {
    pub goal_id: String,
    pub task_id: String,
    pub session_key: String,
    pub context: TaskContext,
}

impl Claim {
    pub fn spawned(&self) -> SpawnedSession {
        SpawnedSession {
            task_id: self.task_id.clone(),
            session_key: self.session_key.clone(),
        }
    }
}

/// Session key for the next attempt of `task`.
///
/// The attempt number is part of the key so a retried task never reuses the
/// key of the session that just ended.
pub fn session_key_for(goal: &Goal, task: &Task) -> String {
    let agent = task.assigned_agent.as_deref().unwrap_or("main");
    format!(
        "agent:{agent}:goal:{}:task:{}:attempt:{}",
        goal.id,
        task.id,
        task.retry_count + 1
    )
}

/// Claim every eligible task of `goal_id`, in resolver order.
pub fn claim_eligible(
    doc: &mut StoreDocument,
    goal_id: &str,
    builder: &dyn ContextBuilder,
    now_ms: i64,
) -> Result<Vec<Claim>> {
    let (eligible, condo) = {
        let goal = doc.goal(goal_id)?;
        let condo = doc.condos.iter().find(|c| c.id == goal.condo_id).cloned();
        (resolver::eligible_ids(goal), condo)
    };
    if eligible.is_empty() {
        return Ok(Vec::new());
    }

    let goal = doc.goal_mut(goal_id)?;
    let mut claims = Vec::with_capacity(eligible.len());
    for task_id in eligible {
        let session_key = session_key_for(goal, goal.task(&task_id)?);
        goal.task_mut(&task_id)?.bind_session(session_key.clone(), now_ms)?;
        let context = builder.build(goal.task(&task_id)?, goal, condo.as_ref());
        claims.push(Claim {
            goal_id: goal_id.to_string(),
            task_id,
            session_key,
            context,
        });
    }
    goal.kicked_off_at_ms.get_or_insert(now_ms);
    goal.updated_at_ms = now_ms;
    Ok(claims)
}

/// Record that the gateway accepted the session start for a claim.
pub fn confirm_started(doc: &mut StoreDocument, claim: &Claim, now_ms: i64) -> Result<bool> {
    let goal = doc.goal_mut(&claim.goal_id)?;
    let task = goal.task_mut(&claim.task_id)?;
    Ok(task.confirm_started(&claim.session_key, now_ms))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DefaultContextBuilder;
    use crate::types::TaskStatus;

    fn doc_with_chain() -> StoreDocument {
        let mut goal = Goal::new("g1", "c1", "Chain", 0);
        goal.tasks.push(Task::new("t1", "first", 0));
        let mut t2 = Task::new("t2", "second", 0);
        t2.depends_on = vec!["t1".into()];
        goal.tasks.push(t2);
        goal.tasks.push(Task::new("t3", "parallel", 0));
        StoreDocument {
            goals: vec![goal],
            ..Default::default()
        }
    }

    #[test]
    fn claims_eligible_tasks_and_binds_sessions() {
        let mut doc = doc_with_chain();
        let claims = claim_eligible(&mut doc, "g1", &DefaultContextBuilder, 10).unwrap();
        let ids: Vec<_> = claims.iter().map(|c| c.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);

        let goal = doc.goal("g1").unwrap();
        for claim in &claims {
            let task = goal.task(&claim.task_id).unwrap();
            assert_eq!(task.status, TaskStatus::InProgress);
            assert_eq!(task.session_key.as_deref(), Some(claim.session_key.as_str()));
        }
        assert_eq!(goal.task("t2").unwrap().status, TaskStatus::Pending);
        assert_eq!(goal.kicked_off_at_ms, Some(10));
    }

    #[test]
    fn second_claim_finds_nothing() {
        let mut doc = doc_with_chain();
        assert!(!claim_eligible(&mut doc, "g1", &DefaultContextBuilder, 1)
            .unwrap()
            .is_empty());
        assert!(claim_eligible(&mut doc, "g1", &DefaultContextBuilder, 2)
            .unwrap()
            .is_empty());
        assert_eq!(doc.goal("g1").unwrap().kicked_off_at_ms, Some(1));
    }

    #[test]
    fn session_key_changes_per_attempt() {
        let goal = Goal::new("g1", "c1", "G", 0);
        let mut task = Task::new("t1", "x", 0);
        let first = session_key_for(&goal, &task);
        task.retry_count = 1;
        let second = session_key_for(&goal, &task);
        assert_eq!(first, "agent:main:goal:g1:task:t1:attempt:1");
        assert_ne!(first, second);
    }

    #[test]
    fn confirm_started_only_for_current_binding() {
        let mut doc = doc_with_chain();
        let claims = claim_eligible(&mut doc, "g1", &DefaultContextBuilder, 1).unwrap();
        let claim = &claims[0];
        assert!(confirm_started(&mut doc, claim, 2).unwrap());

        doc.goal_mut("g1").unwrap().tasks[0].release_session();
        assert!(!confirm_started(&mut doc, claim, 3).unwrap());
    }

    #[test]
    fn unknown_goal_is_an_error() {
        let mut doc = doc_with_chain();
        assert!(claim_eligible(&mut doc, "nope", &DefaultContextBuilder, 1).is_err());
    }
}
