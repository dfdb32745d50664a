use anyhow::Context;
use condo_core::config::Config;
use std::path::Path;

pub fn run(root: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load(root).context("run 'condo init' first")?;
    let port = port.unwrap_or(config.server.port);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(condo_server::serve(root.to_path_buf(), port))
}
