use std::time::Duration as StdDuration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::to_iso;
use crate::{
    activity::{self, Activity},
    auth::{AuthenticatedUser, Role},
    config::AppConfig,
    error::{AppError, AppResult},
    mailer::{self, OutgoingEmail},
    models::{Inquiry, NewProposal, Proposal},
    schema::{inquiry, proposal},
    state::AppState,
    storage::{object_key, StorageFolder},
    uploads::{pdf_response, Disposition, UploadForm, UploadKind, PDF_MIME},
    utils::token::{generate_token, hash_token},
    workflow::proposal::{
        transition, Actor, ProposalAction, ProposalFacts, ProposalState, ProposalStatus,
    },
};

pub const PDF_FIELD: &str = "proposalPdf";

#[derive(Serialize)]
pub struct ProposalResponse {
    pub id: Uuid,
    pub inquiry_id: Uuid,
    pub requested_by: Uuid,
    pub title: String,
    pub proposal_data: Value,
    pub status: String,
    pub client_response: Option<String>,
    pub client_responded_at: Option<String>,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<String>,
    pub has_pdf: bool,
    pub expires_at: Option<String>,
    pub sent_at: Option<String>,
    pub email_status: Option<String>,
    pub email_error: Option<String>,
    pub email_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Proposal> for ProposalResponse {
    fn from(row: Proposal) -> Self {
        Self {
            id: row.id,
            inquiry_id: row.inquiry_id,
            requested_by: row.requested_by,
            title: row.title,
            proposal_data: row.proposal_data,
            status: row.status,
            client_response: row.client_response,
            client_responded_at: row.client_responded_at.map(to_iso),
            admin_notes: row.admin_notes,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at.map(to_iso),
            has_pdf: row.pdf_url.is_some(),
            expires_at: row.expires_at.map(to_iso),
            sent_at: row.sent_at.map(to_iso),
            email_status: row.email_status,
            email_error: row.email_error,
            email_attempts: row.email_attempts,
            created_at: to_iso(row.created_at),
            updated_at: to_iso(row.updated_at),
        }
    }
}

/// Loads a proposal row locked for the rest of the transaction.
pub(crate) fn lock_proposal(conn: &mut PgConnection, proposal_id: Uuid) -> AppResult<Proposal> {
    Ok(proposal::table
        .find(proposal_id)
        .for_update()
        .first(conn)?)
}

pub(crate) fn check_transition(
    row: &Proposal,
    action: ProposalAction,
    actor: Actor<'_>,
) -> AppResult<ProposalState> {
    let current = ProposalState::of(row)?;
    Ok(transition(current, action, actor, ProposalFacts::of(row))?)
}

/// Sales users only see proposals they own.
fn ensure_visible(user: &AuthenticatedUser, row: &Proposal) -> AppResult<()> {
    if user.has_role(&[Role::Admin, Role::Manager]) || row.requested_by == user.user_id {
        Ok(())
    } else {
        Err(AppError::forbidden("not your proposal"))
    }
}

#[derive(Deserialize)]
pub struct CreateProposalRequest {
    pub inquiry_id: Uuid,
    pub title: String,
    pub proposal_data: Option<Value>,
}

fn validate_proposal_data(data: Option<Value>) -> AppResult<Value> {
    match data {
        None | Some(Value::Null) => Ok(json!({})),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(_) => Err(AppError::bad_request(
            "Validation error: proposal_data: must be an object",
        )),
    }
}

pub async fn create_proposal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateProposalRequest>,
) -> AppResult<(StatusCode, Json<ProposalResponse>)> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("Validation error: title: Title is required"));
    }
    let data = validate_proposal_data(payload.proposal_data)?;

    let mut conn = state.db()?;
    inquiry::table
        .find(payload.inquiry_id)
        .select(inquiry::id)
        .first::<Uuid>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("inquiry does not exist"))?;

    let created: Proposal = diesel::insert_into(proposal::table)
        .values(&NewProposal {
            id: Uuid::new_v4(),
            inquiry_id: payload.inquiry_id,
            requested_by: user.user_id,
            title: title.to_string(),
            proposal_data: data,
            status: ProposalStatus::Draft.as_str().to_string(),
        })
        .get_result(&mut conn)?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "proposal_created", "proposal", created.id)
            .inquiry(created.inquiry_id),
    );
    info!(proposal_id = %created.id, inquiry_id = %created.inquiry_id, "proposal created");

    Ok((StatusCode::CREATED, Json(created.into())))
}

#[derive(Deserialize)]
pub struct ProposalListQuery {
    pub status: Option<String>,
    pub inquiry_id: Option<Uuid>,
}

pub async fn list_proposals(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ProposalListQuery>,
) -> AppResult<Json<Vec<ProposalResponse>>> {
    let mut query = proposal::table.into_boxed();
    if let Some(status) = params.status.as_deref().filter(|s| !s.is_empty()) {
        let status: ProposalStatus = status
            .parse()
            .map_err(|_| AppError::bad_request(format!("invalid status '{status}'")))?;
        query = query.filter(proposal::status.eq(status.as_str()));
    }
    if let Some(inquiry_id) = params.inquiry_id {
        query = query.filter(proposal::inquiry_id.eq(inquiry_id));
    }
    if !user.has_role(&[Role::Admin, Role::Manager]) {
        query = query.filter(proposal::requested_by.eq(user.user_id));
    }

    let mut conn = state.db()?;
    let rows: Vec<Proposal> = query.order(proposal::created_at.desc()).load(&mut conn)?;
    Ok(Json(rows.into_iter().map(ProposalResponse::from).collect()))
}

pub async fn get_proposal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> AppResult<Json<ProposalResponse>> {
    let mut conn = state.db()?;
    let row: Proposal = proposal::table.find(proposal_id).first(&mut conn)?;
    ensure_visible(&user, &row)?;
    Ok(Json(row.into()))
}

#[derive(Deserialize)]
pub struct UpdateProposalRequest {
    pub title: Option<String>,
    pub proposal_data: Option<Value>,
}

/// Revises a draft or a rejected proposal; the result is a draft again.
pub async fn update_proposal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
    Json(payload): Json<UpdateProposalRequest>,
) -> AppResult<Json<ProposalResponse>> {
    let title = match payload.title.as_deref().map(str::trim) {
        Some("") => {
            return Err(AppError::bad_request("Validation error: title: Title is required"))
        }
        other => other.map(str::to_string),
    };
    let data = match payload.proposal_data {
        Some(value) => Some(validate_proposal_data(Some(value))?),
        None => None,
    };

    let mut conn = state.db()?;
    let updated = conn.transaction::<Proposal, AppError, _>(|conn| {
        let row = lock_proposal(conn, proposal_id)?;
        let next = check_transition(&row, ProposalAction::Revise, Actor::Staff(&user))?;
        Ok(diesel::update(proposal::table.find(proposal_id))
            .set((
                proposal::title.eq(title.unwrap_or(row.title)),
                proposal::proposal_data.eq(data.unwrap_or(row.proposal_data)),
                proposal::status.eq(next.status.as_str()),
                proposal::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?)
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "proposal_revised", "proposal", proposal_id)
            .inquiry(updated.inquiry_id),
    );
    Ok(Json(updated.into()))
}

/// Stores the proposal PDF the sales user prepared. Allowed until sent.
pub async fn upload_pdf(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ProposalResponse>> {
    let mut form = UploadForm::read(multipart, PDF_FIELD).await?;
    let file = form.take_file(PDF_FIELD, UploadKind::Pdf)?;

    let existing: Proposal = {
        let mut conn = state.db()?;
        proposal::table.find(proposal_id).first(&mut conn)?
    };
    if existing.requested_by != user.user_id {
        return Err(AppError::forbidden("only the sales owner can upload the PDF"));
    }
    let status: ProposalStatus = existing.status.parse()?;
    if !matches!(
        status,
        ProposalStatus::Draft | ProposalStatus::Approved | ProposalStatus::Rejected
    ) {
        return Err(AppError::conflict(format!(
            "cannot replace the PDF of a {} proposal",
            status.as_str()
        )));
    }

    let now = Utc::now();
    let key = object_key(
        StorageFolder::Proposals,
        now.date_naive(),
        &format!("{}-{}.pdf", proposal_id, Uuid::new_v4()),
    );
    state
        .storage
        .put_object(&key, file.bytes, Some(PDF_MIME.to_string()), None)
        .await?;

    let mut conn = state.db()?;
    let updated: Proposal = diesel::update(proposal::table.find(proposal_id))
        .set((
            proposal::pdf_url.eq(Some(key.clone())),
            proposal::updated_at.eq(now.naive_utc()),
        ))
        .get_result(&mut conn)?;
    drop(conn);

    if let Some(previous) = existing.pdf_url {
        if let Err(err) = state.storage.delete_object(&previous).await {
            warn!(error = %err, key = %previous, "failed to delete replaced proposal PDF");
        }
    }
    info!(proposal_id = %proposal_id, key = %key, "proposal PDF uploaded");

    Ok(Json(updated.into()))
}

pub async fn download_pdf(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> AppResult<Response> {
    let row: Proposal = {
        let mut conn = state.db()?;
        proposal::table.find(proposal_id).first(&mut conn)?
    };
    ensure_visible(&user, &row)?;
    let key = row.pdf_url.ok_or_else(AppError::not_found)?;
    let bytes = state.storage.get_object(&key).await?;
    pdf_response(bytes, Disposition::Attachment, &format!("proposal-{proposal_id}.pdf"))
}

#[derive(Deserialize, Default)]
pub struct ReviewRequest {
    pub admin_notes: Option<String>,
}

async fn review(
    state: &AppState,
    user: &AuthenticatedUser,
    proposal_id: Uuid,
    action: ProposalAction,
    notes: Option<String>,
) -> AppResult<Proposal> {
    let notes = notes
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let mut conn = state.db()?;
    let updated = conn.transaction::<Proposal, AppError, _>(|conn| {
        let row = lock_proposal(conn, proposal_id)?;
        let next = check_transition(&row, action, Actor::Staff(user))?;
        let now = Utc::now().naive_utc();
        Ok(diesel::update(proposal::table.find(proposal_id))
            .set((
                proposal::status.eq(next.status.as_str()),
                proposal::admin_notes.eq(notes.clone()),
                proposal::reviewed_by.eq(Some(user.user_id)),
                proposal::reviewed_at.eq(Some(now)),
                proposal::updated_at.eq(now),
            ))
            .get_result(conn)?)
    })?;

    let action_name = match action {
        ProposalAction::Approve => "proposal_approved",
        _ => "proposal_rejected",
    };
    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), action_name, "proposal", proposal_id)
            .inquiry(updated.inquiry_id)
            .details(json!({ "admin_notes": updated.admin_notes })),
    );
    info!(proposal_id = %proposal_id, status = %updated.status, "proposal reviewed");
    Ok(updated)
}

pub async fn approve_proposal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
    payload: Option<Json<ReviewRequest>>,
) -> AppResult<Json<ProposalResponse>> {
    let notes = payload.and_then(|Json(body)| body.admin_notes);
    let updated = review(&state, &user, proposal_id, ProposalAction::Approve, notes).await?;
    Ok(Json(updated.into()))
}

pub async fn reject_proposal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
    payload: Option<Json<ReviewRequest>>,
) -> AppResult<Json<ProposalResponse>> {
    let notes = payload.and_then(|Json(body)| body.admin_notes);
    let updated = review(&state, &user, proposal_id, ProposalAction::Reject, notes).await?;
    Ok(Json(updated.into()))
}

pub(crate) fn response_links(config: &AppConfig, proposal_id: Uuid, token: &str) -> [String; 3] {
    let base = format!("{}/proposal-response/{}", config.public_app_url, proposal_id);
    [
        format!("{base}?token={token}"),
        format!("{base}/approve?token={token}"),
        format!("{base}/reject?token={token}"),
    ]
}

pub(crate) fn proposal_email(
    config: &AppConfig,
    row: &Proposal,
    client: &Inquiry,
    token: &str,
    expires_at: NaiveDateTime,
) -> OutgoingEmail {
    let [view, approve, reject] = response_links(config, row.id, token);
    let text_body = format!(
        "Hello {name},\n\n\
         Thank you for considering WastePH. Your proposal \"{title}\" is ready.\n\n\
         View the proposal: {view}\n\
         Approve: {approve}\n\
         Reject: {reject}\n\n\
         These links are valid until {expires}.\n\n\
         WastePH Sales Team",
        name = client.name,
        title = row.title,
        expires = expires_at.format("%B %-d, %Y %H:%M UTC"),
    );
    OutgoingEmail {
        to: client.email.clone(),
        subject: format!("Proposal: {}", row.title),
        text_body,
        attachments: Vec::new(),
    }
}

/// Issues a fresh public token, moves the proposal to `sent` and e-mails
/// the links. The state change is committed before delivery; the delivery
/// outcome is stored on the row.
async fn dispatch(
    state: &AppState,
    user: &AuthenticatedUser,
    proposal_id: Uuid,
    action: ProposalAction,
) -> AppResult<Proposal> {
    let token = generate_token();
    let now = Utc::now().naive_utc();
    let expires_at = now + Duration::days(state.config.proposal_link_expiry_days);

    let (sent, client) = {
        let mut conn = state.db()?;
        conn.transaction::<(Proposal, Inquiry), AppError, _>(|conn| {
            let row = lock_proposal(conn, proposal_id)?;
            let next = check_transition(&row, action, Actor::Staff(user))?;
            let client: Inquiry = inquiry::table
                .find(row.inquiry_id)
                .first(conn)
                .optional()?
                .ok_or_else(|| AppError::conflict("the inquiry behind this proposal no longer exists"))?;

            let sent: Proposal = diesel::update(proposal::table.find(proposal_id))
                .set((
                    proposal::status.eq(next.status.as_str()),
                    proposal::public_token_hash.eq(Some(hash_token(&token))),
                    proposal::expires_at.eq(Some(expires_at)),
                    proposal::sent_at.eq(Some(now)),
                    proposal::email_status.eq(Some("pending")),
                    proposal::email_error.eq(None::<String>),
                    proposal::updated_at.eq(now),
                ))
                .get_result(conn)?;
            Ok((sent, client))
        })?
    };

    let email = proposal_email(&state.config, &sent, &client, &token, expires_at);
    let report = mailer::deliver(
        state.mailer.as_ref(),
        email,
        state.config.email_max_attempts,
        StdDuration::from_millis(state.config.email_retry_base_ms),
    )
    .await;

    let mut conn = state.db()?;
    let updated: Proposal = diesel::update(proposal::table.find(proposal_id))
        .set((
            proposal::email_status.eq(Some(report.status())),
            proposal::email_error.eq(report.error.clone()),
            proposal::email_attempts.eq(proposal::email_attempts + report.attempts as i32),
            proposal::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)?;

    let action_name = match action {
        ProposalAction::RetryEmail => "proposal_email_retried",
        _ => "proposal_sent",
    };
    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), action_name, "proposal", proposal_id)
            .inquiry(updated.inquiry_id)
            .details(json!({
                "email_status": report.status(),
                "attempts": report.attempts,
            })),
    );
    info!(
        proposal_id = %proposal_id,
        email_status = report.status(),
        attempts = report.attempts,
        "proposal dispatched"
    );
    Ok(updated)
}

pub async fn send_proposal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> AppResult<Json<ProposalResponse>> {
    let updated = dispatch(&state, &user, proposal_id, ProposalAction::Send).await?;
    Ok(Json(updated.into()))
}

/// Re-sends with a new token; links from earlier e-mails stop working.
pub async fn retry_email(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> AppResult<Json<ProposalResponse>> {
    let updated = dispatch(&state, &user, proposal_id, ProposalAction::RetryEmail).await?;
    Ok(Json(updated.into()))
}

pub async fn cancel_proposal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(proposal_id): Path<Uuid>,
) -> AppResult<Json<ProposalResponse>> {
    let mut conn = state.db()?;
    let updated = conn.transaction::<Proposal, AppError, _>(|conn| {
        let row = lock_proposal(conn, proposal_id)?;
        let next = check_transition(&row, ProposalAction::Cancel, Actor::Staff(&user))?;
        Ok(diesel::update(proposal::table.find(proposal_id))
            .set((
                proposal::status.eq(next.status.as_str()),
                proposal::public_token_hash.eq(None::<String>),
                proposal::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?)
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "proposal_canceled", "proposal", proposal_id)
            .inquiry(updated.inquiry_id),
    );
    Ok(Json(updated.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_data_must_be_an_object() {
        assert_eq!(validate_proposal_data(None).unwrap(), json!({}));
        assert_eq!(
            validate_proposal_data(Some(json!({ "rate": 4.5 }))).unwrap(),
            json!({ "rate": 4.5 })
        );
        assert!(validate_proposal_data(Some(json!([1, 2]))).is_err());
    }
}
