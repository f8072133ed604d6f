use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::to_iso;
use crate::{
    activity::{self, Activity},
    auth::{AuthenticatedUser, Role},
    error::{AppError, AppResult},
    models::{CalendarEvent, NewCalendarEvent},
    schema::calendar_event,
    state::AppState,
    validation::Validator,
};

#[derive(Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub inquiry_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: String,
    pub ends_at: Option<String>,
    pub created_at: String,
}

impl From<CalendarEvent> for EventResponse {
    fn from(row: CalendarEvent) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            inquiry_id: row.inquiry_id,
            title: row.title,
            description: row.description,
            starts_at: to_iso(row.starts_at),
            ends_at: row.ends_at.map(to_iso),
            created_at: to_iso(row.created_at),
        }
    }
}

#[derive(Deserialize)]
pub struct EventQuery {
    pub inquiry_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub inquiry_id: Option<Uuid>,
}

impl CreateEventRequest {
    fn validate(self, user_id: Uuid) -> AppResult<NewCalendarEvent> {
        let mut v = Validator::new();
        let title = v.required("title", self.title.as_deref(), "Title is required");
        v.max_len("title", self.title.as_deref(), 255);
        if self.starts_at.is_none() {
            v.push("starts_at", "Start time is required");
        }
        if let (Some(starts_at), Some(ends_at)) = (self.starts_at, self.ends_at) {
            if ends_at < starts_at {
                v.push("ends_at", "End time must not be before the start time");
            }
        }
        v.finish()?;
        let (Some(title), Some(starts_at)) = (title, self.starts_at) else {
            return Err(AppError::bad_request("title and starts_at are required"));
        };

        Ok(NewCalendarEvent {
            id: Uuid::new_v4(),
            user_id,
            inquiry_id: self.inquiry_id,
            title,
            description: self.description.filter(|text| !text.trim().is_empty()),
            starts_at: starts_at.naive_utc(),
            ends_at: self.ends_at.map(|at| at.naive_utc()),
        })
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<EventQuery>,
) -> AppResult<Json<Vec<EventResponse>>> {
    let mut query = calendar_event::table
        .filter(calendar_event::user_id.eq(user.user_id))
        .into_boxed();
    if let Some(inquiry_id) = params.inquiry_id {
        query = query.filter(calendar_event::inquiry_id.eq(inquiry_id));
    }

    let mut conn = state.db()?;
    let rows: Vec<CalendarEvent> = query
        .order(calendar_event::starts_at.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(EventResponse::from).collect()))
}

pub async fn create_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<EventResponse>)> {
    let draft = body.validate(user.user_id)?;
    let mut conn = state.db()?;
    let row: CalendarEvent = diesel::insert_into(calendar_event::table)
        .values(&draft)
        .get_result(&mut conn)?;

    let mut entry = Activity::new(Some(user.user_id), "event_created", "calendar_event", row.id);
    if let Some(inquiry_id) = row.inquiry_id {
        entry = entry.inquiry(inquiry_id);
    }
    activity::record(&mut conn, entry);

    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn delete_event(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(event_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let row: CalendarEvent = calendar_event::table.find(event_id).first(&mut conn)?;
    if row.user_id != user.user_id && !user.has_role(&[Role::Admin]) {
        return Err(AppError::forbidden("not your event"));
    }
    diesel::delete(calendar_event::table.find(event_id)).execute(&mut conn)?;
    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "event_deleted", "calendar_event", event_id),
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(starts: Option<i64>, ends: Option<i64>) -> CreateEventRequest {
        CreateEventRequest {
            title: Some("Site visit".into()),
            description: None,
            starts_at: starts.map(|h| Utc.with_ymd_and_hms(2025, 5, 1, h as u32, 0, 0).unwrap()),
            ends_at: ends.map(|h| Utc.with_ymd_and_hms(2025, 5, 1, h as u32, 0, 0).unwrap()),
            inquiry_id: None,
        }
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = request(Some(10), Some(9)).validate(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains("ends_at"));
    }

    #[test]
    fn open_ended_and_equal_bounds_are_accepted() {
        assert!(request(Some(10), None).validate(Uuid::new_v4()).is_ok());
        assert!(request(Some(10), Some(10)).validate(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn start_time_is_required() {
        let err = request(None, None).validate(Uuid::new_v4()).unwrap_err();
        assert!(err.message().contains("starts_at: Start time is required"));
    }
}
