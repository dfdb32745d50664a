use axum::extract::{Path, Query, State};
use axum::Json;
use condo_core::goal::Goal;
use condo_core::resolver;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

/// Goal JSON plus the derived fields the dashboard shows.
pub fn goal_view(goal: &Goal) -> serde_json::Value {
    serde_json::json!({
        "goal": goal,
        "summary": goal.summary(),
        "complete": goal.is_complete(),
        "eligibleTaskIds": resolver::eligible_ids(goal),
    })
}

/// Run a store call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> condo_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??)
}

/// Goal views, optionally narrowed to one condo.
pub(crate) fn goal_views(goals: &[Goal], condo_id: Option<&str>) -> Vec<serde_json::Value> {
    goals
        .iter()
        .filter(|g| condo_id.map_or(true, |c| g.condo_id == c))
        .map(goal_view)
        .collect()
}

/// GET /api/condos
pub async fn list_condos(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let engine = app.engine.clone();
    let doc = blocking(move || engine.store().load()).await?;
    Ok(Json(serde_json::json!({ "ok": true, "condos": doc.condos })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGoalsQuery {
    pub condo_id: Option<String>,
}

/// GET /api/goals?condoId=...
pub async fn list_goals(
    State(app): State<AppState>,
    Query(query): Query<ListGoalsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let engine = app.engine.clone();
    let doc = blocking(move || engine.store().load()).await?;
    let goals = goal_views(&doc.goals, query.condo_id.as_deref());
    Ok(Json(serde_json::json!({ "ok": true, "goals": goals })))
}

/// GET /api/goals/{id}
pub async fn get_goal(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let engine = app.engine.clone();
    let goal = blocking(move || engine.goal(&id)).await?;
    let mut view = goal_view(&goal);
    view["ok"] = serde_json::Value::Bool(true);
    Ok(Json(view))
}
