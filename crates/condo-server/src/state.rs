use crate::bus::{BroadcastObserver, LogObserver};
use crate::engine::Engine;
use crate::spawner;
use anyhow::Context;
use condo_core::config::{Config, WarnLevel};
use condo_core::events::LifecycleEvent;
use condo_core::store::JsonFileStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub engine: Arc<Engine>,
    pub event_tx: broadcast::Sender<LifecycleEvent>,
}

impl AppState {
    /// Wrap an engine and forward its lifecycle events to SSE subscribers.
    pub fn new(root: PathBuf, engine: Arc<Engine>) -> Self {
        let (tx, _) = broadcast::channel(64);
        engine
            .observers()
            .register(Arc::new(BroadcastObserver::new(tx.clone())));
        Self {
            root,
            engine,
            event_tx: tx,
        }
    }

    /// Build the engine for an initialized project: config, JSON store and
    /// the configured spawner.
    pub fn open(root: PathBuf) -> anyhow::Result<Self> {
        let config = Config::load(&root)
            .with_context(|| format!("loading config under {}", root.display()))?;
        for w in config.validate() {
            match w.level {
                WarnLevel::Error => anyhow::bail!("invalid config: {}", w.message),
                WarnLevel::Warning => tracing::warn!(message = %w.message, "config warning"),
            }
        }
        let store = JsonFileStore::open(&root)?;
        let spawner = spawner::from_config(config.gateway.as_ref())?;
        if config.gateway.is_none() {
            tracing::info!("no gateway configured; sessions will only be logged");
        }
        let engine = Engine::new(Arc::new(store), spawner, config.lifecycle.clone());
        engine.observers().register(Arc::new(LogObserver));
        Ok(Self::new(root, Arc::new(engine)))
    }
}
