//! The lifecycle engine.
//!
//! Every state change goes through one store update and is persisted before
//! the engine talks to the spawner. Spawner failures are logged and reported
//! but never roll back the persisted transition.

use crate::spawner::{SessionSpawner, StartSession};
use condo_core::cascade::{self, CascadeJob, CascadeQueue, CascadeTrigger};
use condo_core::clock::{Clock, SystemClock};
use condo_core::condo::Condo;
use condo_core::config::LifecycleConfig;
use condo_core::context::{ContextBuilder, DefaultContextBuilder};
use condo_core::events::{LifecycleEvent, ObserverRegistry};
use condo_core::goal::Goal;
use condo_core::kickoff::{self, KickoffTrigger, SpawnedSession};
use condo_core::paths::validate_id;
use condo_core::planning::{self, NewGoal, NewTask};
use condo_core::store::{self, Store};
use condo_core::supervisor::{self, KilledSession, SessionOutcome, SupervisorDecision};
use condo_core::task::Task;
use condo_core::types::TaskStatus;
use condo_core::{CondoError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Requests and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedStart {
    pub task_id: String,
    pub session_key: String,
    pub error: String,
}

/// Outcome of one kickoff. `spawned_sessions` lists every task the call moved
/// to in-progress, whether or not its session start succeeded; starts the
/// spawner rejected are also listed in `failed_starts`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KickoffReport {
    pub goal_id: String,
    pub trigger: KickoffTrigger,
    pub spawned_sessions: Vec<SpawnedSession>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_starts: Vec<FailedStart>,
}

impl KickoffReport {
    /// Claimed sessions whose start the spawner accepted.
    pub fn started(&self) -> impl Iterator<Item = &SpawnedSession> + '_ {
        self.spawned_sessions.iter().filter(move |s| {
            !self
                .failed_starts
                .iter()
                .any(|f| f.session_key == s.session_key)
        })
    }
}

/// A `goal_update` call from an agent or the UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub goal_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdateOutcome {
    pub goal_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub changed: bool,
    pub goal_completed: bool,
    pub cascade_scheduled: bool,
}

/// A session-ended notice, addressed either by session key or by
/// goal and task id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnded {
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedKill {
    pub session_key: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KillReport {
    pub killed: Vec<KilledSession>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kill_failures: Vec<FailedKill>,
    pub cascades_cancelled: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeRun {
    pub goal_id: String,
    pub trigger: CascadeTrigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kickoff: Option<KickoffReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub phase_kickoffs: Vec<KickoffReport>,
}

impl CascadeRun {
    /// Every session claimed by this run, same-goal and phase kickoffs alike.
    pub fn spawned(&self) -> impl Iterator<Item = &SpawnedSession> + '_ {
        self.kickoffs().flat_map(|k| k.spawned_sessions.iter())
    }

    pub fn kickoffs(&self) -> impl Iterator<Item = &KickoffReport> + '_ {
        self.kickoff.iter().chain(self.phase_kickoffs.iter())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    store: Arc<dyn Store>,
    spawner: Arc<dyn SessionSpawner>,
    context: Arc<dyn ContextBuilder>,
    clock: Arc<dyn Clock>,
    observers: ObserverRegistry,
    lifecycle: LifecycleConfig,
    cascades: Mutex<CascadeQueue>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        spawner: Arc<dyn SessionSpawner>,
        lifecycle: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            spawner,
            context: Arc::new(DefaultContextBuilder),
            clock: Arc::new(SystemClock),
            observers: ObserverRegistry::new(),
            cascades: Mutex::new(CascadeQueue::new(lifecycle.cascade_delay_ms)),
            lifecycle,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_context_builder(mut self, builder: Arc<dyn ContextBuilder>) -> Self {
        self.context = builder;
        self
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn lifecycle(&self) -> &LifecycleConfig {
        &self.lifecycle
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // -- planning ------------------------------------------------------------

    pub fn create_condo(&self, name: &str, description: Option<String>) -> Result<Condo> {
        planning::create_condo(self.store(), name, description, self.now_ms())
    }

    pub fn create_goal(&self, new: NewGoal) -> Result<Goal> {
        planning::create_goal(self.store(), new, self.now_ms())
    }

    pub fn add_task(&self, goal_id: &str, new: NewTask) -> Result<Task> {
        planning::add_task(self.store(), goal_id, new, self.now_ms())
    }

    pub fn goal(&self, goal_id: &str) -> Result<Goal> {
        validate_id(goal_id)?;
        Ok(self.store.load()?.goal(goal_id)?.clone())
    }

    /// Close a goal by hand. Closing can complete a phase, so a cascade is
    /// scheduled for it.
    pub async fn complete_goal(&self, goal_id: &str) -> Result<Goal> {
        let goal = planning::close_goal(self.store(), goal_id, self.now_ms())?;
        tracing::info!(goal_id, "goal closed");
        self.schedule_cascade(goal_id, CascadeTrigger::TaskDone).await;
        Ok(goal)
    }

    // -- kickoff -------------------------------------------------------------

    /// Manual kickoff (`goals.kickoff`).
    pub async fn kickoff(&self, goal_id: &str) -> Result<KickoffReport> {
        self.kickoff_with(goal_id, KickoffTrigger::Manual).await
    }

    /// Claim every eligible task of `goal_id` and start a session for each.
    ///
    /// Claims are persisted before any session is started, so a concurrent
    /// or repeated kickoff finds nothing left to claim.
    pub async fn kickoff_with(
        &self,
        goal_id: &str,
        trigger: KickoffTrigger,
    ) -> Result<KickoffReport> {
        validate_id(goal_id)?;
        let now = self.now_ms();
        let (condo_id, claims) = store::update(self.store(), |doc| {
            let claims = kickoff::claim_eligible(doc, goal_id, self.context.as_ref(), now)?;
            Ok((doc.goal(goal_id)?.condo_id.clone(), claims))
        })?;

        let mut report = KickoffReport {
            goal_id: goal_id.to_string(),
            trigger,
            spawned_sessions: Vec::with_capacity(claims.len()),
            failed_starts: Vec::new(),
        };
        if claims.is_empty() {
            tracing::debug!(goal_id, ?trigger, "kickoff found no eligible tasks");
            return Ok(report);
        }

        for claim in &claims {
            report.spawned_sessions.push(claim.spawned());
            let request = StartSession {
                session_key: claim.session_key.clone(),
                context: claim.context.clone(),
            };
            match self.spawner.start_session(&request).await {
                Ok(()) => {
                    let now = self.now_ms();
                    if let Err(e) =
                        store::update(self.store(), |doc| kickoff::confirm_started(doc, claim, now))
                    {
                        tracing::warn!(
                            goal_id,
                            task_id = %claim.task_id,
                            error = %e,
                            "session started but start time could not be recorded"
                        );
                    }
                    tracing::info!(
                        goal_id,
                        task_id = %claim.task_id,
                        session_key = %claim.session_key,
                        "session started"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        goal_id,
                        task_id = %claim.task_id,
                        session_key = %claim.session_key,
                        error = %e,
                        "session start failed; task stays in progress until its session is ended or killed"
                    );
                    report.failed_starts.push(FailedStart {
                        task_id: claim.task_id.clone(),
                        session_key: claim.session_key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.observers.emit(&LifecycleEvent::GoalKickedOff {
            goal_id: goal_id.to_string(),
            condo_id,
            trigger,
            spawned: report.spawned_sessions.clone(),
        });
        Ok(report)
    }

    // -- goal_update ---------------------------------------------------------

    pub async fn update_task(&self, update: TaskUpdate) -> Result<TaskUpdateOutcome> {
        validate_id(&update.goal_id)?;
        validate_id(&update.task_id)?;
        let now = self.now_ms();
        let (changed, goal_completed) = store::update(self.store(), |doc| {
            let goal = doc.goal_mut(&update.goal_id)?;
            let changed = goal.task_mut(&update.task_id)?.apply_update(
                update.status,
                update.summary.clone(),
                now,
            )?;
            goal.refresh_status(now);
            Ok((changed, goal.is_complete()))
        })?;

        let mut outcome = TaskUpdateOutcome {
            goal_id: update.goal_id.clone(),
            task_id: update.task_id.clone(),
            status: update.status,
            changed,
            goal_completed,
            cascade_scheduled: false,
        };
        if !changed {
            return Ok(outcome);
        }
        tracing::info!(
            goal_id = %update.goal_id,
            task_id = %update.task_id,
            status = %update.status,
            "task updated"
        );
        if update.status == TaskStatus::Done {
            self.observers.emit(&LifecycleEvent::GoalTaskCompleted {
                goal_id: update.goal_id.clone(),
                task_id: update.task_id.clone(),
                goal_completed,
            });
            self.schedule_cascade(&update.goal_id, CascadeTrigger::TaskDone).await;
            outcome.cascade_scheduled = true;
        }
        Ok(outcome)
    }

    // -- session end ---------------------------------------------------------

    pub async fn session_ended(&self, ended: SessionEnded) -> Result<SupervisorDecision> {
        let (goal_id, task_id) = match (&ended.goal_id, &ended.task_id, &ended.session_key) {
            (Some(goal_id), Some(task_id), _) => (goal_id.clone(), task_id.clone()),
            (_, _, Some(key)) => {
                let doc = self.store.load()?;
                match doc.find_session(key) {
                    Some((goal, task_id)) => (goal.id.clone(), task_id.to_string()),
                    None => {
                        tracing::debug!(session_key = %key, "session end for an unbound session");
                        return Ok(SupervisorDecision::Ignored {
                            reason: format!("no task is bound to session {key}"),
                        });
                    }
                }
            }
            _ => return Err(CondoError::MissingField("sessionKey")),
        };
        validate_id(&goal_id)?;
        validate_id(&task_id)?;

        let now = self.now_ms();
        let outcome = SessionOutcome::from_flag(ended.success);
        let max_retries = self.lifecycle.default_max_retries;
        let decision = store::update(self.store(), |doc| {
            let goal = doc.goal_mut(&goal_id)?;
            supervisor::on_session_end(
                goal,
                &task_id,
                ended.session_key.as_deref(),
                outcome,
                max_retries,
                now,
            )
        })?;

        match &decision {
            SupervisorDecision::Ignored { reason } => {
                tracing::debug!(%goal_id, %task_id, %reason, "session end ignored");
                return Ok(decision);
            }
            SupervisorDecision::Retried {
                goal_id,
                task_id,
                retry_count,
                max_retries,
                error,
            } => {
                tracing::warn!(
                    %goal_id,
                    %task_id,
                    retry_count,
                    max_retries,
                    "task will be retried"
                );
                self.observers.emit(&LifecycleEvent::TaskRetried {
                    goal_id: goal_id.clone(),
                    task_id: task_id.clone(),
                    retry_count: *retry_count,
                    max_retries: *max_retries,
                    error: error.clone(),
                });
            }
            SupervisorDecision::Failed {
                goal_id,
                task_id,
                retry_count,
                max_retries,
                error,
            } => {
                tracing::error!(%goal_id, %task_id, retry_count, %error, "task failed");
                self.observers.emit(&LifecycleEvent::TaskFailed {
                    goal_id: goal_id.clone(),
                    task_id: task_id.clone(),
                    retry_count: *retry_count,
                    max_retries: *max_retries,
                    error: error.clone(),
                });
            }
        }
        self.schedule_cascade(&goal_id, CascadeTrigger::SessionEnded).await;
        Ok(decision)
    }

    // -- kill ----------------------------------------------------------------

    /// Reset every running task of a goal to pending and kill its sessions.
    /// Queued cascades for the goal are cancelled; nothing is respawned.
    pub async fn kill_for_goal(&self, goal_id: &str) -> Result<KillReport> {
        validate_id(goal_id)?;
        let now = self.now_ms();
        let killed = store::update(self.store(), |doc| {
            Ok(supervisor::reset_for_kill(doc.goal_mut(goal_id)?, now))
        })?;
        let cancelled = self.cascades.lock().await.cancel_goal(goal_id);
        Ok(self.kill_sessions(killed, cancelled).await)
    }

    pub async fn kill_for_condo(&self, condo_id: &str) -> Result<KillReport> {
        validate_id(condo_id)?;
        let now = self.now_ms();
        let (goal_ids, killed) = store::update(self.store(), |doc| {
            doc.condo(condo_id)?;
            let goal_ids: Vec<String> =
                doc.goals_in_condo(condo_id).map(|g| g.id.clone()).collect();
            let mut killed = Vec::new();
            for id in &goal_ids {
                killed.extend(supervisor::reset_for_kill(doc.goal_mut(id)?, now));
            }
            Ok((goal_ids, killed))
        })?;
        let cancelled = {
            let mut queue = self.cascades.lock().await;
            goal_ids.iter().map(|id| queue.cancel_goal(id)).sum()
        };
        Ok(self.kill_sessions(killed, cancelled).await)
    }

    async fn kill_sessions(
        &self,
        killed: Vec<KilledSession>,
        cascades_cancelled: usize,
    ) -> KillReport {
        let mut kill_failures = Vec::new();
        for k in &killed {
            if let Err(e) = self.spawner.kill_session(&k.session_key).await {
                tracing::warn!(
                    goal_id = %k.goal_id,
                    task_id = %k.task_id,
                    session_key = %k.session_key,
                    error = %e,
                    "session kill failed; task was already reset"
                );
                kill_failures.push(FailedKill {
                    session_key: k.session_key.clone(),
                    error: e.to_string(),
                });
            }
        }
        tracing::info!(killed = killed.len(), cascades_cancelled, "sessions killed");
        KillReport {
            killed,
            kill_failures,
            cascades_cancelled,
        }
    }

    // -- cascades ------------------------------------------------------------

    pub async fn schedule_cascade(&self, goal_id: &str, trigger: CascadeTrigger) {
        let now = self.now_ms();
        let mut queue = self.cascades.lock().await;
        let job = CascadeJob {
            goal_id: goal_id.to_string(),
            trigger,
        };
        if queue.schedule(job, now) {
            tracing::debug!(goal_id, ?trigger, pending = queue.len(), "cascade scheduled");
        } else {
            tracing::debug!(goal_id, ?trigger, "cascade already queued for goal");
        }
    }

    pub async fn pending_cascades(&self) -> usize {
        self.cascades.lock().await.len()
    }

    /// Run every cascade whose delay has elapsed.
    pub async fn run_due_cascades(&self) -> Vec<CascadeRun> {
        let jobs = self.cascades.lock().await.take_due(self.now_ms());
        self.run_jobs(jobs).await
    }

    /// Run every queued cascade now, regardless of due time.
    pub async fn drain_cascades(&self) -> Vec<CascadeRun> {
        let jobs = self.cascades.lock().await.drain();
        self.run_jobs(jobs).await
    }

    async fn run_jobs(&self, jobs: Vec<CascadeJob>) -> Vec<CascadeRun> {
        let mut runs = Vec::with_capacity(jobs.len());
        for job in jobs {
            match self.run_cascade(&job).await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    tracing::error!(goal_id = %job.goal_id, error = %e, "cascade failed")
                }
            }
        }
        runs
    }

    /// An incomplete goal gets another kickoff; a complete goal hands over to
    /// the goals of the next phase in its condo.
    async fn run_cascade(&self, job: &CascadeJob) -> Result<CascadeRun> {
        let complete = self.store.load()?.goal(&job.goal_id)?.is_complete();
        let mut run = CascadeRun {
            goal_id: job.goal_id.clone(),
            trigger: job.trigger,
            kickoff: None,
            phase_kickoffs: Vec::new(),
        };
        if !complete {
            run.kickoff = Some(self.kickoff_with(&job.goal_id, KickoffTrigger::Cascade).await?);
            return Ok(run);
        }

        let now = self.now_ms();
        let successors = store::update(self.store(), |doc| {
            cascade::claim_phase_successors(doc, &job.goal_id, now)
        })?;
        for id in successors {
            tracing::info!(
                from = %job.goal_id,
                to = %id,
                "earlier phases complete; kicking off next phase"
            );
            match self.kickoff_with(&id, KickoffTrigger::Phase).await {
                Ok(report) => run.phase_kickoffs.push(report),
                Err(e) => tracing::error!(goal_id = %id, error = %e, "phase kickoff failed"),
            }
        }
        Ok(run)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawner::SpawnError;
    use async_trait::async_trait;
    use condo_core::clock::ManualClock;
    use condo_core::events::EventLog;
    use condo_core::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingSpawner {
        started: StdMutex<Vec<String>>,
        killed: StdMutex<Vec<String>>,
        failing_tasks: StdMutex<Vec<String>>,
    }

    impl RecordingSpawner {
        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }

        fn killed(&self) -> Vec<String> {
            self.killed.lock().unwrap().clone()
        }

        fn fail_task(&self, task_id: &str) {
            self.failing_tasks.lock().unwrap().push(task_id.to_string());
        }
    }

    #[async_trait]
    impl SessionSpawner for RecordingSpawner {
        async fn start_session(
            &self,
            request: &StartSession,
        ) -> std::result::Result<(), SpawnError> {
            if self
                .failing_tasks
                .lock()
                .unwrap()
                .contains(&request.context.task_id)
            {
                return Err(SpawnError::Unavailable("gateway down".into()));
            }
            self.started.lock().unwrap().push(request.session_key.clone());
            Ok(())
        }

        async fn kill_session(&self, session_key: &str) -> std::result::Result<(), SpawnError> {
            self.killed.lock().unwrap().push(session_key.to_string());
            Ok(())
        }
    }

    struct Harness {
        engine: Engine,
        spawner: Arc<RecordingSpawner>,
        clock: ManualClock,
        log: Arc<EventLog>,
        condo_id: String,
    }

    impl Harness {
        fn new() -> Self {
            let spawner = Arc::new(RecordingSpawner::default());
            let clock = ManualClock::new(1_000);
            let engine = Engine::new(
                Arc::new(MemoryStore::default()),
                spawner.clone(),
                LifecycleConfig::default(),
            )
            .with_clock(Arc::new(clock.clone()));
            let log = EventLog::new();
            engine.observers().register(log.clone());
            let condo_id = engine.create_condo("Website", None).unwrap().id;
            Self {
                engine,
                spawner,
                clock,
                log,
                condo_id,
            }
        }

        /// Create a goal whose tasks are `T1..Tn` with the given dependencies.
        fn goal(&self, phase: Option<u32>, deps: &[&[&str]]) -> String {
            let goal = self
                .engine
                .create_goal(NewGoal {
                    condo_id: self.condo_id.clone(),
                    title: "Launch".into(),
                    phase,
                    ..Default::default()
                })
                .unwrap();
            for (i, d) in deps.iter().enumerate() {
                self.engine
                    .add_task(
                        &goal.id,
                        NewTask {
                            text: format!("step {}", i + 1),
                            depends_on: d.iter().map(|s| s.to_string()).collect(),
                            ..Default::default()
                        },
                    )
                    .unwrap();
            }
            goal.id
        }

        fn task(&self, goal_id: &str, task_id: &str) -> Task {
            self.engine.goal(goal_id).unwrap().task(task_id).unwrap().clone()
        }

        async fn done(&self, goal_id: &str, task_id: &str) -> TaskUpdateOutcome {
            self.engine
                .update_task(TaskUpdate {
                    goal_id: goal_id.into(),
                    task_id: task_id.into(),
                    status: TaskStatus::Done,
                    summary: Some("finished".into()),
                })
                .await
                .unwrap()
        }

        async fn end(&self, goal_id: &str, task_id: &str) -> SupervisorDecision {
            let key = self.task(goal_id, task_id).session_key;
            self.engine
                .session_ended(SessionEnded {
                    session_key: key,
                    success: Some(false),
                    ..Default::default()
                })
                .await
                .unwrap()
        }

        async fn tick_past_delay(&self) -> Vec<CascadeRun> {
            self.clock.advance(self.engine.lifecycle().cascade_delay_ms as i64);
            self.engine.run_due_cascades().await
        }
    }

    #[tokio::test]
    async fn completion_cascades_to_dependent_task() {
        let h = Harness::new();
        let g = h.goal(None, &[&[], &["T1"]]);

        let report = h.engine.kickoff(&g).await.unwrap();
        assert_eq!(report.spawned_sessions.len(), 1);
        assert_eq!(report.spawned_sessions[0].task_id, "T1");
        assert_eq!(h.task(&g, "T1").status, TaskStatus::InProgress);
        assert!(h.task(&g, "T1").session_started_at_ms.is_some());
        assert_eq!(h.task(&g, "T2").status, TaskStatus::Pending);

        let outcome = h.done(&g, "T1").await;
        assert!(outcome.changed);
        assert!(outcome.cascade_scheduled);
        assert!(!outcome.goal_completed);

        // Nothing runs before the delay elapses.
        assert!(h.engine.run_due_cascades().await.is_empty());
        assert_eq!(h.engine.pending_cascades().await, 1);

        let runs = h.tick_past_delay().await;
        assert_eq!(runs.len(), 1);
        let spawned: Vec<_> = runs[0].spawned().map(|s| s.task_id.clone()).collect();
        assert_eq!(spawned, vec!["T2".to_string()]);
        assert_eq!(h.task(&g, "T2").status, TaskStatus::InProgress);

        assert_eq!(
            h.log.names(),
            vec!["goal.kickoff", "goal.task_completed", "goal.kickoff"]
        );
    }

    #[tokio::test]
    async fn repeated_kickoff_spawns_nothing_new() {
        let h = Harness::new();
        let g = h.goal(None, &[&[], &[]]);

        let first = h.engine.kickoff(&g).await.unwrap();
        let second = h.engine.kickoff(&g).await.unwrap();
        assert_eq!(first.spawned_sessions.len(), 2);
        assert!(second.spawned_sessions.is_empty());
        assert_eq!(h.spawner.started().len(), 2);
        assert_eq!(h.log.names(), vec!["goal.kickoff"]);
    }

    #[tokio::test]
    async fn failed_session_is_retried_then_failed() {
        let h = Harness::new();
        let g = h.goal(None, &[&[]]);
        h.engine.kickoff(&g).await.unwrap();
        let first_key = h.task(&g, "T1").session_key.unwrap();

        let decision = h.end(&g, "T1").await;
        assert!(matches!(
            decision,
            SupervisorDecision::Retried { retry_count: 1, max_retries: 1, .. }
        ));
        let t = h.task(&g, "T1");
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.retry_count, 1);
        assert!(t.session_key.is_none());

        // The retry comes from the cascade, under a fresh session key.
        let runs = h.tick_past_delay().await;
        assert_eq!(runs.len(), 1);
        let second_key = h.task(&g, "T1").session_key.unwrap();
        assert_ne!(first_key, second_key);
        assert!(second_key.ends_with(":attempt:2"));

        let decision = h.end(&g, "T1").await;
        assert!(matches!(decision, SupervisorDecision::Failed { .. }));
        let t = h.task(&g, "T1");
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.last_error.unwrap().contains("max retries (1) exhausted"));

        // Failed tasks are never picked up again.
        let runs = h.tick_past_delay().await;
        assert_eq!(runs[0].spawned().count(), 0);
        assert_eq!(
            h.log.names(),
            vec!["goal.kickoff", "task.retry", "goal.kickoff", "task.failed"]
        );
    }

    #[tokio::test]
    async fn stale_session_end_is_ignored() {
        let h = Harness::new();
        let g = h.goal(None, &[&[]]);
        h.engine.kickoff(&g).await.unwrap();
        let old_key = h.task(&g, "T1").session_key.unwrap();
        h.end(&g, "T1").await;
        h.tick_past_delay().await;

        let decision = h
            .engine
            .session_ended(SessionEnded {
                session_key: Some(old_key),
                goal_id: Some(g.clone()),
                task_id: Some("T1".into()),
                success: Some(false),
            })
            .await
            .unwrap();
        assert!(!decision.changed());
        let t = h.task(&g, "T1");
        assert_eq!(t.status, TaskStatus::InProgress);
        assert_eq!(t.retry_count, 1);
    }

    #[tokio::test]
    async fn unknown_session_key_is_ignored() {
        let h = Harness::new();
        let decision = h
            .engine
            .session_ended(SessionEnded {
                session_key: Some("agent:main:goal:nope:task:T1:attempt:1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!decision.changed());
    }

    #[tokio::test]
    async fn session_end_needs_an_address() {
        let h = Harness::new();
        let err = h
            .engine
            .session_ended(SessionEnded {
                goal_id: Some("g1".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CondoError::MissingField("sessionKey")));
    }

    #[tokio::test]
    async fn done_after_session_end_is_a_noop_for_the_supervisor() {
        let h = Harness::new();
        let g = h.goal(None, &[&[]]);
        h.engine.kickoff(&g).await.unwrap();
        let key = h.task(&g, "T1").session_key.unwrap();
        h.done(&g, "T1").await;

        let decision = h
            .engine
            .session_ended(SessionEnded {
                session_key: Some(key),
                success: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!decision.changed());
        assert_eq!(h.task(&g, "T1").status, TaskStatus::Done);
        assert_eq!(h.task(&g, "T1").retry_count, 0);
    }

    #[tokio::test]
    async fn kill_resets_tasks_without_consuming_retries() {
        let h = Harness::new();
        let g = h.goal(None, &[&[], &[]]);
        h.engine.kickoff(&g).await.unwrap();
        h.done(&g, "T1").await;
        assert_eq!(h.engine.pending_cascades().await, 1);

        let report = h.engine.kill_for_goal(&g).await.unwrap();
        assert_eq!(report.killed.len(), 1);
        assert_eq!(report.killed[0].task_id, "T2");
        assert_eq!(report.cascades_cancelled, 1);
        assert_eq!(h.spawner.killed(), vec![report.killed[0].session_key.clone()]);

        let t2 = h.task(&g, "T2");
        assert_eq!(t2.status, TaskStatus::Pending);
        assert_eq!(t2.retry_count, 0);
        assert!(t2.session_key.is_none());
        assert_eq!(h.task(&g, "T1").status, TaskStatus::Done);

        // Nothing respawns on its own after a kill.
        assert!(h.tick_past_delay().await.is_empty());
        assert_eq!(h.spawner.started().len(), 2);
    }

    #[tokio::test]
    async fn kill_for_condo_covers_every_goal() {
        let h = Harness::new();
        let a = h.goal(None, &[&[]]);
        let b = h.goal(None, &[&[]]);
        h.engine.kickoff(&a).await.unwrap();
        h.engine.kickoff(&b).await.unwrap();

        let report = h.engine.kill_for_condo(&h.condo_id).await.unwrap();
        assert_eq!(report.killed.len(), 2);
        assert_eq!(h.task(&a, "T1").status, TaskStatus::Pending);
        assert_eq!(h.task(&b, "T1").status, TaskStatus::Pending);

        assert!(matches!(
            h.engine.kill_for_condo("condo_missing").await,
            Err(CondoError::CondoNotFound(_))
        ));
    }

    #[tokio::test]
    async fn finishing_a_phase_kicks_off_the_next() {
        let h = Harness::new();
        let first = h.goal(Some(1), &[&[]]);
        let second = h.goal(Some(2), &[&[], &["T1"]]);
        let third = h.goal(Some(3), &[&[]]);

        h.engine.kickoff(&first).await.unwrap();
        let outcome = h.done(&first, "T1").await;
        assert!(outcome.goal_completed);

        let runs = h.tick_past_delay().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].phase_kickoffs.len(), 1);
        assert_eq!(runs[0].phase_kickoffs[0].goal_id, second);
        assert_eq!(runs[0].phase_kickoffs[0].trigger, KickoffTrigger::Phase);
        assert_eq!(h.task(&second, "T1").status, TaskStatus::InProgress);
        assert_eq!(h.task(&second, "T2").status, TaskStatus::Pending);
        assert_eq!(h.task(&third, "T1").status, TaskStatus::Pending);

        // A second completion signal for the first goal does not re-trigger.
        h.engine.schedule_cascade(&first, CascadeTrigger::TaskDone).await;
        let runs = h.tick_past_delay().await;
        assert!(runs[0].phase_kickoffs.is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_and_keeps_the_claim() {
        let h = Harness::new();
        let g = h.goal(None, &[&[], &[]]);
        h.spawner.fail_task("T2");

        let report = h.engine.kickoff(&g).await.unwrap();
        assert_eq!(report.spawned_sessions.len(), 2);
        assert_eq!(report.failed_starts.len(), 1);
        assert_eq!(report.failed_starts[0].task_id, "T2");
        let started: Vec<_> = report.started().map(|s| s.task_id.as_str()).collect();
        assert_eq!(started, vec!["T1"]);

        let t2 = h.task(&g, "T2");
        assert_eq!(t2.status, TaskStatus::InProgress);
        assert_eq!(t2.session_key.as_deref(), Some(report.failed_starts[0].session_key.as_str()));
        assert!(t2.session_started_at_ms.is_none());
        assert_eq!(t2.retry_count, 0);

        match &h.log.events()[0] {
            LifecycleEvent::GoalKickedOff { spawned, .. } => assert_eq!(spawned.len(), 2),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn kickoff_reports_claims_even_when_every_start_fails() {
        let h = Harness::new();
        let g = h.goal(None, &[&[]]);
        h.spawner.fail_task("T1");

        let first = h.engine.kickoff(&g).await.unwrap();
        let key = h.task(&g, "T1").session_key.unwrap();
        assert_eq!(first.spawned_sessions.len(), 1);
        assert_eq!(first.spawned_sessions[0].session_key, key);
        assert_eq!(first.failed_starts.len(), 1);
        assert_eq!(first.started().count(), 0);
        assert_eq!(h.task(&g, "T1").status, TaskStatus::InProgress);
        assert_eq!(h.log.names(), vec!["goal.kickoff"]);

        let second = h.engine.kickoff(&g).await.unwrap();
        assert!(second.spawned_sessions.is_empty());
        assert!(second.failed_starts.is_empty());
        assert_eq!(h.log.names(), vec!["goal.kickoff"]);
    }

    /// Holds every start until the gate opens and signals when the first
    /// start is in flight.
    #[derive(Default)]
    struct GatedSpawner {
        started: StdMutex<Vec<String>>,
        entered: Notify,
        gate: Notify,
        open: AtomicBool,
    }

    impl GatedSpawner {
        fn release(&self) {
            self.open.store(true, Ordering::SeqCst);
            self.gate.notify_waiters();
        }
    }

    #[async_trait]
    impl SessionSpawner for GatedSpawner {
        async fn start_session(
            &self,
            request: &StartSession,
        ) -> std::result::Result<(), SpawnError> {
            self.started.lock().unwrap().push(request.session_key.clone());
            self.entered.notify_one();
            if !self.open.load(Ordering::SeqCst) {
                self.gate.notified().await;
            }
            Ok(())
        }

        async fn kill_session(&self, _session_key: &str) -> std::result::Result<(), SpawnError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn overlapping_kickoffs_claim_each_task_once() {
        let spawner = Arc::new(GatedSpawner::default());
        let engine = Engine::new(
            Arc::new(MemoryStore::default()),
            spawner.clone(),
            LifecycleConfig::default(),
        );
        let condo = engine.create_condo("Website", None).unwrap();
        let goal = engine
            .create_goal(NewGoal {
                condo_id: condo.id,
                title: "Launch".into(),
                ..Default::default()
            })
            .unwrap();
        for text in ["copy", "layout"] {
            engine
                .add_task(&goal.id, NewTask { text: text.into(), ..Default::default() })
                .unwrap();
        }

        let (a, b, ()) = tokio::join!(engine.kickoff(&goal.id), engine.kickoff(&goal.id), async {
            spawner.entered.notified().await;
            spawner.release();
        });
        let a = a.unwrap();
        let b = b.unwrap();

        let mut claimed: Vec<_> = a
            .spawned_sessions
            .iter()
            .chain(&b.spawned_sessions)
            .map(|s| s.task_id.clone())
            .collect();
        claimed.sort();
        assert_eq!(claimed, vec!["T1".to_string(), "T2".to_string()]);

        let mut started = spawner.started.lock().unwrap().clone();
        assert_eq!(started.len(), 2);
        started.sort();
        started.dedup();
        assert_eq!(started.len(), 2);
    }

    #[tokio::test]
    async fn completing_an_empty_goal_by_hand_cascades() {
        let h = Harness::new();
        let first = h.goal(Some(1), &[]);
        let second = h.goal(Some(2), &[&[]]);

        h.engine.complete_goal(&first).await.unwrap();
        let runs = h.engine.drain_cascades().await;
        assert_eq!(runs[0].phase_kickoffs[0].goal_id, second);
        assert_eq!(h.engine.pending_cascades().await, 0);
    }

    #[tokio::test]
    async fn update_for_unknown_task_is_not_found() {
        let h = Harness::new();
        let g = h.goal(None, &[&[]]);
        let err = h
            .engine
            .update_task(TaskUpdate {
                goal_id: g,
                task_id: "T9".into(),
                status: TaskStatus::Done,
                summary: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CondoError::TaskNotFound { .. }));
    }
}
