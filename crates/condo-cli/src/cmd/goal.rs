use crate::output::{or_dash, print_json, print_table};
use clap::Subcommand;
use condo_core::goal::Goal;
use condo_core::planning::NewGoal;
use condo_core::resolver;
use condo_core::types::AutonomyMode;
use std::path::Path;

#[derive(Subcommand)]
pub enum GoalSubcommand {
    /// Create a goal in a condo
    Create {
        #[arg(long)]
        condo: String,
        #[arg(required = true)]
        title: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        /// Phase within the condo; a goal starts once every earlier phase is complete
        #[arg(long)]
        phase: Option<u32>,
        /// Retries per task before it fails (default: lifecycle.default_max_retries)
        #[arg(long)]
        max_retries: Option<u32>,
        /// full, plan, step or supervised
        #[arg(long)]
        autonomy: Option<String>,
    },
    /// List goals
    List {
        #[arg(long)]
        condo: Option<String>,
    },
    /// Show a goal with its tasks
    Show { goal_id: String },
    /// Start sessions for every eligible task
    Kickoff { goal_id: String },
    /// Close a goal whose tasks are all done
    Complete { goal_id: String },
}

pub fn run(root: &Path, subcmd: GoalSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        GoalSubcommand::Create {
            condo,
            title,
            description,
            phase,
            max_retries,
            autonomy,
        } => {
            let autonomy_mode = autonomy
                .as_deref()
                .map(str::parse::<AutonomyMode>)
                .transpose()?;
            let engine = super::open_engine(root)?;
            let goal = engine.create_goal(NewGoal {
                condo_id: condo,
                title: title.join(" "),
                description,
                phase,
                max_retries,
                autonomy_mode,
            })?;
            if json {
                print_json(&goal)?;
            } else {
                println!("Created goal {} ({})", goal.id, goal.title);
            }
            Ok(())
        }
        GoalSubcommand::List { condo } => list(root, condo.as_deref(), json),
        GoalSubcommand::Show { goal_id } => show(root, &goal_id, json),
        GoalSubcommand::Kickoff { goal_id } => kickoff(root, &goal_id, json),
        GoalSubcommand::Complete { goal_id } => complete(root, &goal_id, json),
    }
}

fn list(root: &Path, condo: Option<&str>, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(root)?;
    let doc = engine.store().load()?;
    let goals: Vec<&Goal> = doc
        .goals
        .iter()
        .filter(|g| condo.map_or(true, |c| g.condo_id == c))
        .collect();
    if json {
        return print_json(&goals);
    }
    if goals.is_empty() {
        println!("No goals.");
        return Ok(());
    }
    let rows = goals
        .iter()
        .map(|g| {
            vec![
                g.id.clone(),
                g.condo_id.clone(),
                g.phase.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                g.status.to_string(),
                g.summary(),
                g.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "CONDO", "PHASE", "STATUS", "PROGRESS", "TITLE"], rows);
    Ok(())
}

fn show(root: &Path, goal_id: &str, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(root)?;
    let goal = engine.goal(goal_id)?;
    if json {
        return print_json(&goal);
    }
    println!("{}  {}", goal.id, goal.title);
    println!("  condo:    {}", goal.condo_id);
    println!("  status:   {} ({})", goal.status, goal.summary());
    println!("  autonomy: {}", goal.autonomy());
    if let Some(p) = goal.phase {
        println!("  phase:    {p}");
    }
    println!(
        "  retries:  {} per task",
        goal.effective_max_retries(engine.lifecycle().default_max_retries)
    );
    println!();
    print_tasks(&goal);
    Ok(())
}

pub(crate) fn print_tasks(goal: &Goal) {
    if goal.tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    let eligible = resolver::eligible_ids(goal);
    let rows = goal
        .tasks
        .iter()
        .map(|t| {
            let status = if eligible.contains(&t.id) {
                format!("{} (eligible)", t.status)
            } else {
                t.status.to_string()
            };
            vec![
                t.id.clone(),
                status,
                t.depends_on.join(","),
                t.retry_count.to_string(),
                or_dash(t.session_key.as_deref()),
                t.text.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "AFTER", "RETRIES", "SESSION", "TEXT"], rows);
}

fn kickoff(root: &Path, goal_id: &str, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(root)?;
    let report = super::block_on(engine.kickoff(goal_id))??;
    if json {
        return print_json(&report);
    }
    if report.spawned_sessions.is_empty() && report.failed_starts.is_empty() {
        println!("No eligible tasks in {goal_id}.");
    }
    for s in report.started() {
        println!("Started {} ({})", s.task_id, s.session_key);
    }
    for f in &report.failed_starts {
        println!("Failed to start {}: {}", f.task_id, f.error);
    }
    Ok(())
}

fn complete(root: &Path, goal_id: &str, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(root)?;
    let (goal, cascades) = super::block_on(async {
        let goal = engine.complete_goal(goal_id).await?;
        Ok::<_, condo_core::CondoError>((goal, super::settle(&engine).await))
    })??;
    if json {
        return print_json(&serde_json::json!({ "goal": goal, "cascades": cascades }));
    }
    println!("Closed goal {} ({})", goal.id, goal.title);
    super::print_cascades(&cascades);
    Ok(())
}
