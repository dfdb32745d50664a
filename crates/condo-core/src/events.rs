//! Lifecycle events and the observer registry they are dispatched through.
//!
//! Emission is fire-and-forget: observers cannot fail the transition that
//! produced the event.

use crate::kickoff::{KickoffTrigger, SpawnedSession};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum LifecycleEvent {
    TaskRetried {
        goal_id: String,
        task_id: String,
        retry_count: u32,
        max_retries: u32,
        error: String,
    },
    TaskFailed {
        goal_id: String,
        task_id: String,
        retry_count: u32,
        max_retries: u32,
        error: String,
    },
    GoalKickedOff {
        goal_id: String,
        condo_id: String,
        trigger: KickoffTrigger,
        spawned: Vec<SpawnedSession>,
    },
    GoalTaskCompleted {
        goal_id: String,
        task_id: String,
        goal_completed: bool,
    },
}

impl LifecycleEvent {
    /// Wire name used by the dashboard and the SSE stream.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::TaskRetried { .. } => "task.retry",
            LifecycleEvent::TaskFailed { .. } => "task.failed",
            LifecycleEvent::GoalKickedOff { .. } => "goal.kickoff",
            LifecycleEvent::GoalTaskCompleted { .. } => "goal.task_completed",
        }
    }

    pub fn goal_id(&self) -> &str {
        match self {
            LifecycleEvent::TaskRetried { goal_id, .. }
            | LifecycleEvent::TaskFailed { goal_id, .. }
            | LifecycleEvent::GoalKickedOff { goal_id, .. }
            | LifecycleEvent::GoalTaskCompleted { goal_id, .. } => goal_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent);
}

impl<F> EventObserver for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn on_event(&self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Registered observers. Clones share the same registry.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<RwLock<Vec<Arc<dyn EventObserver>>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn EventObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(observer);
    }

    pub fn emit(&self, event: &LifecycleEvent) {
        // Snapshot first so an observer may register another without deadlocking.
        let observers = self
            .observers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for observer in observers {
            observer.on_event(event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Observer that keeps every event in memory.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(LifecycleEvent::name).collect()
    }
}

impl EventObserver for EventLog {
    fn on_event(&self, event: &LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
