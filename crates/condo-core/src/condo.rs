use serde::{Deserialize, Serialize};

/// Top-level project container. The lifecycle only needs its identity to
/// group goals for phase cascades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Condo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}
