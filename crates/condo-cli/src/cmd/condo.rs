use crate::output::{or_dash, print_json, print_table};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum CondoSubcommand {
    /// Create a condo
    Create {
        #[arg(required = true)]
        name: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List condos
    List,
}

pub fn run(root: &Path, subcmd: CondoSubcommand, json: bool) -> anyhow::Result<()> {
    let engine = super::open_engine(root)?;
    match subcmd {
        CondoSubcommand::Create { name, description } => {
            let condo = engine.create_condo(&name.join(" "), description)?;
            if json {
                print_json(&condo)?;
            } else {
                println!("Created condo {} ({})", condo.id, condo.name);
            }
        }
        CondoSubcommand::List => {
            let doc = engine.store().load()?;
            if json {
                return print_json(&doc.condos);
            }
            if doc.condos.is_empty() {
                println!("No condos.");
                return Ok(());
            }
            let rows = doc
                .condos
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        c.name.clone(),
                        doc.goals_in_condo(&c.id).count().to_string(),
                        or_dash(c.description.as_deref()),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "GOALS", "DESCRIPTION"], rows);
        }
    }
    Ok(())
}
