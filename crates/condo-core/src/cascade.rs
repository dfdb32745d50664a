//! Deferred cascade work and condo-level phase cascades.
//!
//! Completion handlers never spawn sessions inline. They schedule a
//! [`CascadeJob`] that becomes due `delay_ms` later; a driver takes due jobs
//! from the [`CascadeQueue`] and re-runs the kickoff for the goal. Jobs are
//! keyed by `(due_ms, uuid)` so taking due work is a single ordered range
//! scan.

use crate::document::StoreDocument;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CascadeJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeTrigger {
    TaskDone,
    SessionEnded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeJob {
    pub goal_id: String,
    pub trigger: CascadeTrigger,
}

// ---------------------------------------------------------------------------
// CascadeQueue
// ---------------------------------------------------------------------------

/// Delayed, cancellable cascade jobs. At most one job per goal is queued;
/// scheduling again while one is pending keeps the earlier due time.
#[derive(Debug)]
pub struct CascadeQueue {
    delay_ms: i64,
    jobs: BTreeMap<(i64, Uuid), CascadeJob>,
}

impl CascadeQueue {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms: i64::try_from(delay_ms).unwrap_or(i64::MAX),
            jobs: BTreeMap::new(),
        }
    }

    /// Queue `job`. Returns false when the goal already had a job queued.
    pub fn schedule(&mut self, job: CascadeJob, now_ms: i64) -> bool {
        if self.jobs.values().any(|j| j.goal_id == job.goal_id) {
            return false;
        }
        let due = now_ms.saturating_add(self.delay_ms);
        self.jobs.insert((due, Uuid::new_v4()), job);
        true
    }

    /// Drop any queued job for `goal_id`. Returns how many were removed.
    pub fn cancel_goal(&mut self, goal_id: &str) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.goal_id != goal_id);
        before - self.jobs.len()
    }

    /// Remove and return every job due at or before `now_ms`, oldest first.
    pub fn take_due(&mut self, now_ms: i64) -> Vec<CascadeJob> {
        let later = self.jobs.split_off(&(now_ms.saturating_add(1), Uuid::nil()));
        let due = std::mem::replace(&mut self.jobs, later);
        due.into_values().collect()
    }

    /// Remove and return every queued job regardless of due time.
    pub fn drain(&mut self) -> Vec<CascadeJob> {
        std::mem::take(&mut self.jobs).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Phase cascade
// ---------------------------------------------------------------------------

/// True when every goal of `condo_id` with a phase strictly below `phase`
/// is complete. Goals without a phase do not gate anything.
pub fn earlier_phases_complete(doc: &StoreDocument, condo_id: &str, phase: u32) -> bool {
    doc.goals_in_condo(condo_id)
        .filter(|g| g.phase.is_some_and(|p| p < phase))
        .all(|g| g.is_complete())
}

/// Goals unblocked by the completion of `goal_id`: later-phase goals of the
/// same condo whose earlier phases are all complete and which were never
/// kicked off.
pub fn phase_successors(doc: &StoreDocument, goal_id: &str) -> Result<Vec<String>> {
    let goal = doc.goal(goal_id)?;
    let Some(phase) = goal.phase else {
        return Ok(Vec::new());
    };
    if !goal.is_complete() {
        return Ok(Vec::new());
    }
    Ok(doc
        .goals_in_condo(&goal.condo_id)
        .filter(|g| g.phase.is_some_and(|p| p > phase))
        .filter(|g| g.kicked_off_at_ms.is_none() && !g.is_complete())
        .filter(|g| {
            g.phase
                .is_some_and(|p| earlier_phases_complete(doc, &goal.condo_id, p))
        })
        .map(|g| g.id.clone())
        .collect())
}

/// Select the phase successors of `goal_id` and stamp their kickoff marker
/// in the same update, so a repeated trigger cannot select them again.
pub fn claim_phase_successors(
    doc: &mut StoreDocument,
    goal_id: &str,
    now_ms: i64,
) -> Result<Vec<String>> {
    let ids = phase_successors(doc, goal_id)?;
    for id in &ids {
        let goal = doc.goal_mut(id)?;
        goal.kicked_off_at_ms = Some(now_ms);
        goal.updated_at_ms = now_ms;
    }
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
