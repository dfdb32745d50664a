//! POST /api/rpc: the method-dispatch surface the dashboard and agents use.
//!
//! Request: `{"method": "...", "params": {...}}`.
//! Success: `{"ok": true, "result": ...}`; failure: `{"ok": false, "error": "..."}`.

use axum::extract::State;
use axum::Json;
use condo_core::planning::{NewGoal, NewTask};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{SessionEnded, TaskUpdate};
use crate::error::AppError;
use crate::routes::goals::{blocking, goal_view, goal_views};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCondoParams {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoalParams {
    goal_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CondoParams {
    condo_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListGoalsParams {
    #[serde(default)]
    condo_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTaskParams {
    goal_id: String,
    #[serde(flatten)]
    task: NewTask,
}

fn params<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, AppError> {
    let value = if value.is_null() { json!({}) } else { value };
    serde_json::from_value(value)
        .map_err(|e| AppError::bad_request(format!("{method}: invalid params: {e}")))
}

pub async fn rpc(
    State(app): State<AppState>,
    Json(req): Json<RpcRequest>,
) -> Result<Json<Value>, AppError> {
    let engine = &app.engine;
    let method = req.method.as_str();
    tracing::debug!(method, "rpc");

    let result = match method {
        "condos.create" => {
            let p: CreateCondoParams = params(method, req.params)?;
            let engine = engine.clone();
            let condo = blocking(move || engine.create_condo(&p.name, p.description)).await?;
            serde_json::to_value(condo)?
        }
        "condos.list" => {
            let engine = engine.clone();
            json!(blocking(move || engine.store().load()).await?.condos)
        }
        "goals.create" => {
            let p: NewGoal = params(method, req.params)?;
            let engine = engine.clone();
            goal_view(&blocking(move || engine.create_goal(p)).await?)
        }
        "goals.get" => {
            let p: GoalParams = params(method, req.params)?;
            let engine = engine.clone();
            goal_view(&blocking(move || engine.goal(&p.goal_id)).await?)
        }
        "goals.list" => {
            let p: ListGoalsParams = params(method, req.params)?;
            let engine = engine.clone();
            let doc = blocking(move || engine.store().load()).await?;
            json!(goal_views(&doc.goals, p.condo_id.as_deref()))
        }
        "goals.addTask" => {
            let p: AddTaskParams = params(method, req.params)?;
            let engine = engine.clone();
            serde_json::to_value(blocking(move || engine.add_task(&p.goal_id, p.task)).await?)?
        }
        "goals.complete" => {
            let p: GoalParams = params(method, req.params)?;
            goal_view(&engine.complete_goal(&p.goal_id).await?)
        }
        "goals.kickoff" => {
            let p: GoalParams = params(method, req.params)?;
            serde_json::to_value(engine.kickoff(&p.goal_id).await?)?
        }
        "goal_update" => {
            let p: TaskUpdate = params(method, req.params)?;
            serde_json::to_value(engine.update_task(p).await?)?
        }
        "sessions.ended" => {
            let p: SessionEnded = params(method, req.params)?;
            serde_json::to_value(engine.session_ended(p).await?)?
        }
        "sessions.killForGoal" => {
            let p: GoalParams = params(method, req.params)?;
            serde_json::to_value(engine.kill_for_goal(&p.goal_id).await?)?
        }
        "sessions.killForCondo" => {
            let p: CondoParams = params(method, req.params)?;
            serde_json::to_value(engine.kill_for_condo(&p.condo_id).await?)?
        }
        other => return Err(AppError::bad_request(format!("unknown method: {other}"))),
    };

    Ok(Json(json!({ "ok": true, "result": result })))
}
