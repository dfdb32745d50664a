use crate::output::print_json;
use clap::Subcommand;
use condo_core::supervisor::SupervisorDecision;
use condo_server::engine::{KillReport, SessionEnded};
use std::path::Path;

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Report that an agent session ended (by --key, or by --goal and --task)
    Ended {
        #[arg(long, required_unless_present = "goal")]
        key: Option<String>,
        #[arg(long, requires = "task")]
        goal: Option<String>,
        #[arg(long, requires = "goal")]
        task: Option<String>,
        /// The session reported success
        #[arg(long, conflicts_with = "failed")]
        success: bool,
        /// The session reported failure
        #[arg(long)]
        failed: bool,
    },
    /// Kill the running sessions of a goal, or of every goal in a condo
    Kill {
        #[arg(long, required_unless_present = "condo", conflicts_with = "condo")]
        goal: Option<String>,
        #[arg(long)]
        condo: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: SessionSubcommand, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(root)?;
    match subcmd {
        SessionSubcommand::Ended {
            key,
            goal,
            task,
            success,
            failed,
        } => {
            let notice = SessionEnded {
                session_key: key,
                goal_id: goal,
                task_id: task,
                success: match (success, failed) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            let (decision, cascades) = super::block_on(async {
                let decision = engine.session_ended(notice).await?;
                Ok::<_, condo_core::CondoError>((decision, super::settle(&engine).await))
            })??;
            if json {
                return print_json(
                    &serde_json::json!({ "decision": decision, "cascades": cascades }),
                );
            }
            match &decision {
                SupervisorDecision::Ignored { reason } => println!("Ignored: {reason}"),
                SupervisorDecision::Retried { task_id, error, .. } => {
                    println!("{task_id} will be retried: {error}")
                }
                SupervisorDecision::Failed { task_id, error, .. } => {
                    println!("{task_id} failed: {error}")
                }
            }
            super::print_cascades(&cascades);
            Ok(())
        }
        SessionSubcommand::Kill { goal, condo } => {
            let report = super::block_on(async {
                match (&goal, &condo) {
                    (Some(goal_id), _) => engine.kill_for_goal(goal_id).await,
                    (None, Some(condo_id)) => engine.kill_for_condo(condo_id).await,
                    (None, None) => Err(condo_core::CondoError::MissingField("goal")),
                }
            })??;
            if json {
                return print_json(&report);
            }
            print_kill(&report);
            Ok(())
        }
    }
}

fn print_kill(report: &KillReport) {
    if report.killed.is_empty() {
        println!("No running sessions.");
    }
    for k in &report.killed {
        println!("Killed {} / {} ({})", k.goal_id, k.task_id, k.session_key);
    }
    for f in &report.kill_failures {
        println!("Kill failed for {}: {}", f.session_key, f.error);
    }
}
