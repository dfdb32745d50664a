use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use condo_core::planning::{self, NewTask};
use condo_core::resolver;
use condo_core::types::TaskStatus;
use condo_server::engine::TaskUpdate;
use std::path::Path;

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Add a task to a goal
    Add {
        goal_id: String,
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        /// Task ids this task waits for, comma-separated (e.g. T1,T2)
        #[arg(long, value_delimiter = ',')]
        after: Vec<String>,
        /// Agent that should run the task (default: main)
        #[arg(long)]
        agent: Option<String>,
    },
    /// Report a task status (pending, in-progress, blocked, waiting, done)
    Update {
        goal_id: String,
        task_id: String,
        status: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Mark a task done
    Done {
        goal_id: String,
        task_id: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Replace a task's dependencies (comma-separated; empty clears them)
    Deps {
        goal_id: String,
        task_id: String,
        #[arg(value_delimiter = ',')]
        depends_on: Vec<String>,
    },
    /// List a goal's tasks
    List { goal_id: String },
    /// Show which tasks a kickoff would start now
    Eligible { goal_id: String },
}

pub fn run(root: &Path, subcmd: TaskSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TaskSubcommand::Add {
            goal_id,
            text,
            description,
            after,
            agent,
        } => {
            let engine = super::open_engine(root)?;
            let task = engine.add_task(
                &goal_id,
                NewTask {
                    text: text.join(" "),
                    description,
                    depends_on: after,
                    assigned_agent: agent,
                },
            )?;
            if json {
                print_json(&task)?;
            } else {
                println!("Added task {} to {}", task.id, goal_id);
            }
            Ok(())
        }
        TaskSubcommand::Update {
            goal_id,
            task_id,
            status,
            summary,
        } => {
            let status: TaskStatus = status
                .parse()
                .with_context(|| format!("'{status}' is not a task status"))?;
            update(root, goal_id, task_id, status, summary, json)
        }
        TaskSubcommand::Done {
            goal_id,
            task_id,
            summary,
        } => update(root, goal_id, task_id, TaskStatus::Done, summary, json),
        TaskSubcommand::Deps {
            goal_id,
            task_id,
            depends_on,
        } => {
            let engine = super::open_engine(root)?;
            let depends_on = depends_on.into_iter().filter(|d| !d.is_empty()).collect();
            let task = planning::set_dependencies(
                engine.store(),
                &goal_id,
                &task_id,
                depends_on,
                engine.now_ms(),
            )?;
            if json {
                print_json(&task)?;
            } else if task.depends_on.is_empty() {
                println!("{} has no dependencies", task.id);
            } else {
                println!("{} runs after {}", task.id, task.depends_on.join(", "));
            }
            Ok(())
        }
        TaskSubcommand::List { goal_id } => {
            let goal = super::open_engine(root)?.goal(&goal_id)?;
            if json {
                return print_json(&goal.tasks);
            }
            super::goal::print_tasks(&goal);
            Ok(())
        }
        TaskSubcommand::Eligible { goal_id } => {
            let goal = super::open_engine(root)?.goal(&goal_id)?;
            let eligible = resolver::eligible_ids(&goal);
            if json {
                return print_json(&eligible);
            }
            if eligible.is_empty() {
                println!("No eligible tasks.");
            }
            for id in eligible {
                println!("{id}");
            }
            for task in goal.tasks.iter().filter(|t| t.status == TaskStatus::Pending) {
                let unmet = resolver::unsatisfied_deps(&goal, task);
                if !unmet.is_empty() {
                    println!("{} waits on {}", task.id, unmet.join(", "));
                }
            }
            Ok(())
        }
    }
}

fn update(
    root: &Path,
    goal_id: String,
    task_id: String,
    status: TaskStatus,
    summary: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let engine = super::open_engine(root)?;
    let (outcome, cascades) = super::block_on(async {
        let outcome = engine
            .update_task(TaskUpdate {
                goal_id,
                task_id,
                status,
                summary,
            })
            .await?;
        Ok::<_, condo_core::CondoError>((outcome, super::settle(&engine).await))
    })??;
    if json {
        return print_json(&serde_json::json!({ "update": outcome, "cascades": cascades }));
    }
    if outcome.changed {
        println!("{} / {} is now {}", outcome.goal_id, outcome.task_id, outcome.status);
    } else {
        println!("{} / {} already {}", outcome.goal_id, outcome.task_id, outcome.status);
    }
    if outcome.goal_completed {
        println!("Goal {} is complete", outcome.goal_id);
    }
    super::print_cascades(&cascades);
    Ok(())
}
