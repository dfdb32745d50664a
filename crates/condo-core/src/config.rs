use crate::error::{CondoError, Result};
use crate::goal::DEFAULT_MAX_RETRIES;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LifecycleConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Retry budget for goals that do not set `maxRetries`.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Delay between a completion event and the cascade it triggers.
    #[serde(default = "default_cascade_delay_ms")]
    pub cascade_delay_ms: u64,
    /// How often the server checks for due cascade jobs.
    #[serde(default = "default_cascade_tick_ms")]
    pub cascade_tick_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_cascade_delay_ms() -> u64 {
    1_000
}

fn default_cascade_tick_ms() -> u64 {
    100
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            cascade_delay_ms: default_cascade_delay_ms(),
            cascade_tick_ms: default_cascade_tick_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

/// Where session start/kill requests go. Without it sessions are only logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub url: String,
    /// Environment variable holding the bearer token, if the gateway wants one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl GatewayConfig {
    pub fn token(&self) -> Option<String> {
        self.token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3150
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            lifecycle: LifecycleConfig::default(),
            gateway: None,
            server: ServerConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let data = crate::io::read_optional(&paths::config_path(root))?
            .ok_or(CondoError::NotInitialized)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.project.name.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "project.name is empty".to_string(),
            });
        }

        if self.lifecycle.default_max_retries == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "lifecycle.default_max_retries is 0: tasks fail on their first \
                          session end"
                    .to_string(),
            });
        }

        if self.lifecycle.cascade_delay_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "lifecycle.cascade_delay_ms is 0: cascades run on the next tick"
                    .to_string(),
            });
        }

        if self.lifecycle.cascade_tick_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "lifecycle.cascade_tick_ms must be greater than 0".to_string(),
            });
        }

        if let Some(gw) = &self.gateway {
            if gw.url.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "gateway.url is empty".to_string(),
                });
            } else if !gw.url.starts_with("http://") && !gw.url.starts_with("https://") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("gateway.url '{}' is not an http(s) URL", gw.url),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
