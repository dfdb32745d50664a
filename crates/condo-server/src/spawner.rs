//! Agent session start/kill, behind a trait so the engine never talks to
//! the gateway directly.

use async_trait::async_trait;
use condo_core::config::GatewayConfig;
use condo_core::context::TaskContext;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    pub session_key: String,
    pub context: TaskContext,
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected {action} for {session_key}: HTTP {status}: {body}")]
    Rejected {
        action: &'static str,
        session_key: String,
        status: u16,
        body: String,
    },

    #[error("spawner unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionSpawner: Send + Sync {
    async fn start_session(&self, request: &StartSession) -> Result<(), SpawnError>;
    async fn kill_session(&self, session_key: &str) -> Result<(), SpawnError>;
}

// ---------------------------------------------------------------------------
// GatewaySpawner
// ---------------------------------------------------------------------------

/// Posts start/kill requests to the agent gateway.
///
/// `POST {url}/api/sessions/start` with a [`StartSession`] body and
/// `POST {url}/api/sessions/kill` with `{"sessionKey": ...}`. Any non-2xx
/// response is a [`SpawnError::Rejected`].
pub struct GatewaySpawner {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewaySpawner {
    pub fn new(config: &GatewayConfig) -> Result<Self, SpawnError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token(),
        })
    }

    async fn post(
        &self,
        action: &'static str,
        session_key: &str,
        body: &serde_json::Value,
    ) -> Result<(), SpawnError> {
        let url = format!("{}/api/sessions/{action}", self.base_url);
        let mut req = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SpawnError::Rejected {
            action,
            session_key: session_key.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SessionSpawner for GatewaySpawner {
    async fn start_session(&self, request: &StartSession) -> Result<(), SpawnError> {
        let body = serde_json::to_value(request)
            .map_err(|e| SpawnError::Unavailable(format!("encode start request: {e}")))?;
        self.post("start", &request.session_key, &body).await
    }

    async fn kill_session(&self, session_key: &str) -> Result<(), SpawnError> {
        let body = serde_json::json!({ "sessionKey": session_key });
        self.post("kill", session_key, &body).await
    }
}

// ---------------------------------------------------------------------------
// LogOnlySpawner
// ---------------------------------------------------------------------------

/// Used when no gateway is configured: every request succeeds and is logged.
#[derive(Debug, Default)]
pub struct LogOnlySpawner;

#[async_trait]
impl SessionSpawner for LogOnlySpawner {
    async fn start_session(&self, request: &StartSession) -> Result<(), SpawnError> {
        tracing::info!(
            session_key = %request.session_key,
            goal_id = %request.context.goal_id,
            task_id = %request.context.task_id,
            "no gateway configured; session start logged only"
        );
        Ok(())
    }

    async fn kill_session(&self, session_key: &str) -> Result<(), SpawnError> {
        tracing::info!(%session_key, "no gateway configured; session kill logged only");
        Ok(())
    }
}

pub fn from_config(gateway: Option<&GatewayConfig>) -> Result<Arc<dyn SessionSpawner>, SpawnError> {
    match gateway {
        Some(cfg) => Ok(Arc::new(GatewaySpawner::new(cfg)?)),
        None => Ok(Arc::new(LogOnlySpawner)),
    }
}
