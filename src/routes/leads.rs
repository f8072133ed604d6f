use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::to_iso;
use crate::{
    activity::{self, Activity},
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::Lead,
    schema::lead,
    state::AppState,
    utils::json::{nullable_text_change, required_text_change},
};

pub const LEAD_STATUSES: &[&str] = &["new", "contacted", "proposal_sent", "won", "lost"];

#[derive(Serialize)]
pub struct LeadResponse {
    pub id: Uuid,
    pub inquiry_id: Option<Uuid>,
    pub client_name: String,
    pub company: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub service_type: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub created_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Lead> for LeadResponse {
    fn from(row: Lead) -> Self {
        Self {
            id: row.id,
            inquiry_id: row.inquiry_id,
            client_name: row.client_name,
            company: row.company,
            email: row.email,
            phone: row.phone,
            location: row.location,
            service_type: row.service_type,
            notes: row.notes,
            status: row.status,
            created_by: row.created_by,
            created_at: to_iso(row.created_at),
            updated_at: to_iso(row.updated_at),
        }
    }
}

#[derive(Deserialize)]
pub struct LeadListQuery {
    pub status: Option<String>,
}

pub async fn list_leads(
    State(state): State<AppState>,
    Query(params): Query<LeadListQuery>,
) -> AppResult<Json<Vec<LeadResponse>>> {
    let mut conn = state.db()?;
    let mut query = lead::table.into_boxed();
    if let Some(status) = params.status.as_deref().filter(|s| !s.is_empty()) {
        if !LEAD_STATUSES.contains(&status) {
            return Err(AppError::bad_request(format!("invalid status '{status}'")));
        }
        query = query.filter(lead::status.eq(status.to_string()));
    }
    let rows: Vec<Lead> = query.order(lead::created_at.desc()).load(&mut conn)?;
    Ok(Json(rows.into_iter().map(LeadResponse::from).collect()))
}

pub async fn get_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<Uuid>,
) -> AppResult<Json<LeadResponse>> {
    let mut conn = state.db()?;
    let row: Lead = lead::table.find(lead_id).first(&mut conn)?;
    Ok(Json(row.into()))
}

#[derive(AsChangeset)]
#[diesel(table_name = lead)]
struct LeadChangeset {
    status: Option<String>,
    notes: Option<Option<String>>,
    updated_at: chrono::NaiveDateTime,
}

pub async fn update_lead(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(lead_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<LeadResponse>> {
    let status = required_text_change(&body, "status").map_err(AppError::bad_request)?;
    if let Some(status) = status.as_deref() {
        if !LEAD_STATUSES.contains(&status) {
            return Err(AppError::bad_request(format!("invalid status '{status}'")));
        }
    }
    let changes = LeadChangeset {
        status,
        notes: nullable_text_change(&body, "notes").map_err(AppError::bad_request)?,
        updated_at: Utc::now().naive_utc(),
    };

    let mut conn = state.db()?;
    let updated: Lead = diesel::update(lead::table.find(lead_id))
        .set(&changes)
        .get_result(&mut conn)?;

    let mut entry = Activity::new(Some(user.user_id), "lead_updated", "lead", lead_id)
        .details(json!({ "status": updated.status }));
    if let Some(inquiry_id) = updated.inquiry_id {
        entry = entry.inquiry(inquiry_id);
    }
    activity::record(&mut conn, entry);

    Ok(Json(updated.into()))
}
