pub mod condo;
pub mod config;
pub mod goal;
pub mod init;
pub mod serve;
pub mod session;
pub mod task;

use anyhow::Context;
use condo_server::engine::{CascadeRun, Engine};
use condo_server::state::AppState;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

pub(crate) fn open_engine(root: &Path) -> anyhow::Result<Arc<Engine>> {
    Ok(AppState::open(root.to_path_buf())?.engine)
}

pub(crate) fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(rt.block_on(fut))
}

/// Run every queued cascade now. The queue lives in memory, so a one-shot
/// command settles its cascades before exiting.
pub(crate) async fn settle(engine: &Engine) -> Vec<CascadeRun> {
    engine.drain_cascades().await
}

pub(crate) fn print_cascades(runs: &[CascadeRun]) {
    for run in runs {
        for kickoff in run.kickoffs() {
            for s in kickoff.started() {
                println!(
                    "  cascade: started {} / {} ({})",
                    kickoff.goal_id, s.task_id, s.session_key
                );
            }
            for f in &kickoff.failed_starts {
                println!(
                    "  cascade: failed to start {} / {}: {}",
                    kickoff.goal_id, f.task_id, f.error
                );
            }
        }
    }
}
