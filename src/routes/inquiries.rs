use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use diesel::{dsl::count_star, pg::Pg, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{leads::LeadResponse, to_iso, Page, PageQuery};
use crate::{
    activity::{self, Activity},
    auth::{AuthenticatedUser, Role},
    error::{AppError, AppResult},
    inquiry_number,
    models::{Inquiry, InquiryNote, Lead, NewInquiry, NewInquiryNote, NewLead},
    schema::{activity_log, calendar_event, inquiry, inquiry_notes, lead, proposal},
    state::AppState,
    utils::json::{nullable_text_change, required_text_change},
    validation::Validator,
};

pub const INQUIRY_SOURCES: &[&str] = &[
    "website",
    "phone",
    "facebook",
    "email",
    "walk-in",
    "cold-approach",
];

pub const INQUIRY_STATUSES: &[&str] = &["new", "contacted", "qualified", "converted", "closed"];

#[derive(Serialize)]
pub struct InquiryResponse {
    pub id: Uuid,
    pub inquiry_number: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub service_type: Option<String>,
    pub message: Option<String>,
    pub source: String,
    pub status: String,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Inquiry> for InquiryResponse {
    fn from(row: Inquiry) -> Self {
        Self {
            id: row.id,
            inquiry_number: row.inquiry_number,
            name: row.name,
            email: row.email,
            phone: row.phone,
            company: row.company,
            location: row.location,
            service_type: row.service_type,
            message: row.message,
            source: row.source,
            status: row.status,
            notes: row.notes,
            assigned_to: row.assigned_to,
            created_at: to_iso(row.created_at),
            updated_at: to_iso(row.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct NoteResponse {
    pub id: Uuid,
    pub inquiry_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub created_at: String,
}

impl From<InquiryNote> for NoteResponse {
    fn from(row: InquiryNote) -> Self {
        Self {
            id: row.id,
            inquiry_id: row.inquiry_id,
            author_id: row.author_id,
            content: row.content,
            created_at: to_iso(row.created_at),
        }
    }
}

fn text<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str)
}

fn optional(body: &Value, field: &str) -> Option<String> {
    text(body, field)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Contact fields shared by the website form and manual entry.
fn parse_contact(body: &Value, v: &mut Validator) -> Option<NewInquiry> {
    let name = v.required("name", text(body, "name"), "Name is required");
    v.max_len("name", text(body, "name"), 255);
    let email = v.email("email", text(body, "email"), "Invalid email format");
    v.max_len("phone", text(body, "phone"), 64);
    v.max_len("company", text(body, "company"), 255);
    v.max_len("service_type", text(body, "service_type"), 100);

    Some(NewInquiry {
        id: Uuid::nil(),
        inquiry_number: String::new(),
        name: name?,
        email: email?,
        phone: optional(body, "phone"),
        company: optional(body, "company"),
        location: optional(body, "location"),
        service_type: optional(body, "service_type"),
        message: optional(body, "message"),
        source: "website".to_string(),
        status: "new".to_string(),
        assigned_to: None,
    })
}

async fn create_inquiry(
    state: &AppState,
    draft: NewInquiry,
    actor: Option<Uuid>,
) -> AppResult<InquiryResponse> {
    let created = inquiry_number::insert_numbered(state, draft).await?;

    let mut conn = state.db()?;
    activity::record(
        &mut conn,
        Activity::new(actor, "inquiry_created", "inquiry", created.id)
            .inquiry(created.id)
            .details(json!({
                "inquiry_number": created.inquiry_number,
                "source": created.source,
            })),
    );
    info!(
        inquiry_id = %created.id,
        inquiry_number = %created.inquiry_number,
        source = %created.source,
        "inquiry created"
    );
    Ok(created.into())
}

/// Website contact form. Always recorded with source `website`.
pub async fn create_public_inquiry(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<InquiryResponse>)> {
    let mut v = Validator::new();
    let draft = parse_contact(&body, &mut v);
    v.finish()?;
    let draft = draft.ok_or_else(|| AppError::bad_request("Validation error: invalid inquiry"))?;

    let created = create_inquiry(&state, draft, None).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn create_manual_inquiry(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<InquiryResponse>)> {
    let mut v = Validator::new();
    let draft = parse_contact(&body, &mut v);
    let source = text(&body, "source").unwrap_or("phone");
    v.one_of("source", Some(source), INQUIRY_SOURCES, "Invalid source");
    v.finish()?;
    let mut draft =
        draft.ok_or_else(|| AppError::bad_request("Validation error: invalid inquiry"))?;
    draft.source = source.to_string();
    draft.assigned_to = Some(user.user_id);

    let created = create_inquiry(&state, draft, Some(user.user_id)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize)]
pub struct InquiryListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn filtered<'a>(
    status: Option<&'a str>,
    pattern: Option<&'a str>,
) -> inquiry::BoxedQuery<'a, Pg> {
    let mut query = inquiry::table.into_boxed();
    if let Some(status) = status {
        query = query.filter(inquiry::status.eq(status));
    }
    if let Some(pattern) = pattern {
        query = query.filter(
            inquiry::name
                .ilike(pattern)
                .or(inquiry::email.ilike(pattern))
                .or(inquiry::company.ilike(pattern)),
        );
    }
    query
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub async fn list_inquiries(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<InquiryListQuery>,
) -> AppResult<Json<Page<InquiryResponse>>> {
    let status = params
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "all");
    if let Some(status) = status {
        if !INQUIRY_STATUSES.contains(&status) {
            return Err(AppError::bad_request(format!("invalid status '{status}'")));
        }
    }
    let pattern = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(like_pattern);
    let (page, limit, offset) = PageQuery {
        page: params.page,
        limit: params.limit,
    }
    .resolve();

    let mut conn = state.db()?;
    let total: i64 = filtered(status, pattern.as_deref())
        .select(count_star())
        .first(&mut conn)?;
    let rows: Vec<Inquiry> = filtered(status, pattern.as_deref())
        .order((inquiry::created_at.desc(), inquiry::id.desc()))
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(Page {
        data: rows.into_iter().map(InquiryResponse::from).collect(),
        total,
        page,
        limit,
    }))
}

pub async fn get_inquiry(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(inquiry_id): Path<Uuid>,
) -> AppResult<Json<InquiryResponse>> {
    let mut conn = state.db()?;
    let row: Inquiry = inquiry::table.find(inquiry_id).first(&mut conn)?;
    Ok(Json(row.into()))
}

#[derive(AsChangeset)]
#[diesel(table_name = inquiry)]
struct InquiryChangeset {
    name: Option<String>,
    email: Option<String>,
    phone: Option<Option<String>>,
    company: Option<Option<String>>,
    location: Option<Option<String>>,
    service_type: Option<Option<String>>,
    message: Option<Option<String>>,
    status: Option<String>,
    notes: Option<Option<String>>,
    assigned_to: Option<Option<Uuid>>,
    updated_at: chrono::NaiveDateTime,
}

pub async fn update_inquiry(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(inquiry_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<InquiryResponse>> {
    let name = required_text_change(&body, "name").map_err(AppError::bad_request)?;
    let email = required_text_change(&body, "email").map_err(AppError::bad_request)?;
    if let Some(email) = email.as_deref() {
        if !crate::validation::is_valid_email(email) {
            return Err(AppError::bad_request("Validation error: email: Invalid email format"));
        }
    }
    let status = required_text_change(&body, "status").map_err(AppError::bad_request)?;
    if let Some(status) = status.as_deref() {
        if !INQUIRY_STATUSES.contains(&status) {
            return Err(AppError::bad_request(format!("invalid status '{status}'")));
        }
    }
    let assigned_to = match body.get("assigned_to") {
        None => None,
        Some(Value::Null) => Some(None),
        Some(Value::String(raw)) => Some(Some(
            Uuid::parse_str(raw.trim())
                .map_err(|_| AppError::bad_request("assigned_to must be a valid UUID"))?,
        )),
        Some(_) => return Err(AppError::bad_request("assigned_to must be a UUID or null")),
    };

    let changes = InquiryChangeset {
        name,
        email,
        phone: nullable_text_change(&body, "phone").map_err(AppError::bad_request)?,
        company: nullable_text_change(&body, "company").map_err(AppError::bad_request)?,
        location: nullable_text_change(&body, "location").map_err(AppError::bad_request)?,
        service_type: nullable_text_change(&body, "service_type")
            .map_err(AppError::bad_request)?,
        message: nullable_text_change(&body, "message").map_err(AppError::bad_request)?,
        status,
        notes: nullable_text_change(&body, "notes").map_err(AppError::bad_request)?,
        assigned_to,
        updated_at: Utc::now().naive_utc(),
    };

    let mut conn = state.db()?;
    let before: Inquiry = inquiry::table.find(inquiry_id).first(&mut conn)?;
    let updated: Inquiry = diesel::update(inquiry::table.find(inquiry_id))
        .set(&changes)
        .get_result(&mut conn)?;

    let details = if before.status != updated.status {
        json!({ "from_status": before.status, "to_status": updated.status })
    } else {
        json!({})
    };
    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "inquiry_updated", "inquiry", inquiry_id)
            .inquiry(inquiry_id)
            .details(details),
    );

    Ok(Json(updated.into()))
}

/// Deletes an inquiry together with its notes and activity rows and detaches
/// calendar events and leads. Refused while proposals still point at it.
pub async fn delete_inquiry(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(inquiry_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    user.require_role(&[Role::Admin, Role::Manager])?;

    let mut conn = state.db()?;
    let number = conn.transaction::<String, AppError, _>(|conn| {
        let existing: Inquiry = inquiry::table.find(inquiry_id).for_update().first(conn)?;

        let proposals: i64 = proposal::table
            .filter(proposal::inquiry_id.eq(inquiry_id))
            .select(count_star())
            .first(conn)?;
        if proposals > 0 {
            return Err(AppError::conflict(
                "inquiry has proposals; cancel or remove them first",
            ));
        }

        diesel::delete(inquiry_notes::table.filter(inquiry_notes::inquiry_id.eq(inquiry_id)))
            .execute(conn)?;
        diesel::delete(activity_log::table.filter(activity_log::inquiry_id.eq(inquiry_id)))
            .execute(conn)?;
        diesel::update(calendar_event::table.filter(calendar_event::inquiry_id.eq(inquiry_id)))
            .set(calendar_event::inquiry_id.eq(None::<Uuid>))
            .execute(conn)?;
        diesel::update(lead::table.filter(lead::inquiry_id.eq(inquiry_id)))
            .set(lead::inquiry_id.eq(None::<Uuid>))
            .execute(conn)?;
        diesel::delete(inquiry::table.find(inquiry_id)).execute(conn)?;

        Ok(existing.inquiry_number)
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "inquiry_deleted", "inquiry", inquiry_id)
            .details(json!({ "inquiry_number": number })),
    );
    info!(inquiry_id = %inquiry_id, inquiry_number = %number, user_id = %user.user_id, "inquiry deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn convert_to_lead(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(inquiry_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<LeadResponse>)> {
    let mut conn = state.db()?;
    let created = conn.transaction::<Lead, AppError, _>(|conn| {
        let source: Inquiry = inquiry::table.find(inquiry_id).for_update().first(conn)?;
        if source.status == "converted" {
            return Err(AppError::conflict("inquiry is already converted"));
        }

        let new_lead = NewLead {
            id: Uuid::new_v4(),
            inquiry_id: Some(source.id),
            client_name: source.name.clone(),
            company: source.company.clone(),
            email: source.email.clone(),
            phone: source.phone.clone(),
            location: source.location.clone(),
            service_type: source.service_type.clone(),
            notes: source.message.clone(),
            status: "new".to_string(),
            created_by: Some(user.user_id),
        };
        let created: Lead = diesel::insert_into(lead::table)
            .values(&new_lead)
            .get_result(conn)?;

        diesel::update(inquiry::table.find(inquiry_id))
            .set((
                inquiry::status.eq("converted"),
                inquiry::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        Ok(created)
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "inquiry_converted", "lead", created.id)
            .inquiry(inquiry_id),
    );

    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn list_notes(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(inquiry_id): Path<Uuid>,
) -> AppResult<Json<Vec<NoteResponse>>> {
    let mut conn = state.db()?;
    inquiry::table
        .find(inquiry_id)
        .select(inquiry::id)
        .first::<Uuid>(&mut conn)?;

    let notes: Vec<InquiryNote> = inquiry_notes::table
        .filter(inquiry_notes::inquiry_id.eq(inquiry_id))
        .order(inquiry_notes::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(notes.into_iter().map(NoteResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct AddNoteRequest {
    pub content: String,
}

pub async fn add_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(inquiry_id): Path<Uuid>,
    Json(payload): Json<AddNoteRequest>,
) -> AppResult<(StatusCode, Json<NoteResponse>)> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(AppError::bad_request("content must not be empty"));
    }

    let mut conn = state.db()?;
    inquiry::table
        .find(inquiry_id)
        .select(inquiry::id)
        .first::<Uuid>(&mut conn)?;

    let note: InquiryNote = diesel::insert_into(inquiry_notes::table)
        .values(&NewInquiryNote {
            id: Uuid::new_v4(),
            inquiry_id,
            author_id: Some(user.user_id),
            content: content.to_string(),
        })
        .get_result(&mut conn)?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "note_added", "inquiry", inquiry_id).inquiry(inquiry_id),
    );

    Ok((StatusCode::CREATED, Json(note.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("acme"), "%acme%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn contact_form_collects_all_errors() {
        let mut v = Validator::new();
        let draft = parse_contact(&json!({ "email": "x" }), &mut v);
        assert!(draft.is_none());
        assert_eq!(
            v.message(),
            "Validation error: name: Name is required, email: Invalid email format"
        );
    }

    #[test]
    fn contact_form_trims_and_defaults() {
        let mut v = Validator::new();
        let draft = parse_contact(
            &json!({ "name": " Ana ", "email": "ana@acme.ph", "phone": "", "company": "Acme" }),
            &mut v,
        )
        .unwrap();
        assert!(v.is_empty());
        assert_eq!(draft.name, "Ana");
        assert_eq!(draft.phone, None);
        assert_eq!(draft.source, "website");
        assert_eq!(draft.status, "new");
    }
}
