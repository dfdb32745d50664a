use anyhow::Context;
use condo_core::{
    config::Config,
    document::StoreDocument,
    io, paths,
    store::{JsonFileStore, Store},
};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    println!("Initializing condo in: {}", root.display());

    let dir = paths::condo_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if !paths::config_path(root).exists() {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let store_path = paths::store_path(root);
    if !store_path.exists() {
        JsonFileStore::new(&store_path)
            .save(&StoreDocument::default())
            .context("failed to write store.json")?;
        println!("  created: {}", paths::STORE_FILE);
    } else {
        println!("  exists:  {}", paths::STORE_FILE);
    }

    Ok(())
}
