use crate::engine::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run due cascade jobs every `tick` until the task is aborted.
pub fn spawn_cascade_driver(engine: Arc<Engine>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            for run in engine.run_due_cascades().await {
                tracing::debug!(
                    goal_id = %run.goal_id,
                    trigger = ?run.trigger,
                    spawned = run.spawned().count(),
                    "cascade ran"
                );
            }
        }
    })
}
