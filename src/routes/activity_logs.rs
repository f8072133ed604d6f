use axum::{
    extract::{Query, State},
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::to_iso;
use crate::{
    auth::{AuthenticatedUser, Role},
    error::AppResult,
    models::ActivityLog,
    schema::activity_log,
    state::AppState,
};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

#[derive(Serialize)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub inquiry_id: Option<Uuid>,
    pub details: Value,
    pub created_at: String,
}

impl From<ActivityLog> for ActivityResponse {
    fn from(row: ActivityLog) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            inquiry_id: row.inquiry_id,
            details: row.details,
            created_at: to_iso(row.created_at),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl ActivityQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Newest first.
pub async fn list_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ActivityQuery>,
) -> AppResult<Json<Vec<ActivityResponse>>> {
    user.require_role(&[Role::Admin, Role::Manager])?;

    let mut query = activity_log::table.into_boxed();
    if let Some(entity_type) = params.entity_type.as_deref().filter(|s| !s.is_empty()) {
        query = query.filter(activity_log::entity_type.eq(entity_type.to_string()));
    }
    if let Some(entity_id) = params.entity_id {
        query = query.filter(activity_log::entity_id.eq(entity_id));
    }

    let mut conn = state.db()?;
    let rows: Vec<ActivityLog> = query
        .order(activity_log::created_at.desc())
        .limit(params.limit())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(ActivityResponse::from).collect()))
}
