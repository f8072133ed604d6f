//! Token-gated endpoints reached from the links in proposal e-mails.

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{proposals::check_transition, to_iso};
use crate::{
    activity::{self, Activity},
    error::{AppError, AppResult},
    models::{Contract, NewContract, Proposal},
    schema::{contracts, inquiry, proposal},
    state::AppState,
    uploads::{pdf_response, Disposition},
    utils::token::{hash_token, is_well_formed},
    workflow::{
        contract::ContractStatus,
        proposal::{Actor, ProposalAction, ProposalState},
    },
};

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Serialize)]
pub struct PublicProposalStatus {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub client_response: Option<String>,
    pub client_responded_at: Option<String>,
    pub expires_at: Option<String>,
    pub can_respond: bool,
}

#[derive(Serialize)]
pub struct ClientResponseResult {
    pub proposal_id: Uuid,
    pub status: String,
    pub client_response: Option<String>,
    pub contract_id: Option<Uuid>,
}

/// Token matches the stored hash and the link has not expired.
pub fn token_grants_access(row: &Proposal, token: &str, now: NaiveDateTime) -> bool {
    if !is_well_formed(token) {
        return false;
    }
    let matches = row
        .public_token_hash
        .as_deref()
        .is_some_and(|stored| stored == hash_token(token));
    let live = row.expires_at.is_some_and(|expires_at| now < expires_at);
    matches && live
}

fn authorize(
    conn: &mut PgConnection,
    proposal_id: Uuid,
    token: Option<&str>,
    lock: bool,
) -> AppResult<Proposal> {
    let token = token.ok_or_else(AppError::invalid_token)?;
    if !is_well_formed(token) {
        return Err(AppError::invalid_token());
    }
    let row: Option<Proposal> = if lock {
        proposal::table
            .find(proposal_id)
            .for_update()
            .first(conn)
            .optional()?
    } else {
        proposal::table.find(proposal_id).first(conn).optional()?
    };

    match row {
        Some(row) if token_grants_access(&row, token, Utc::now().naive_utc()) => Ok(row),
        _ => {
            warn!(proposal_id = %proposal_id, "rejected public proposal token");
            Err(AppError::invalid_token())
        }
    }
}

pub async fn proposal_status(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Json<PublicProposalStatus>> {
    let mut conn = state.db()?;
    let row = authorize(&mut conn, proposal_id, query.token.as_deref(), false)?;
    let can_respond = ProposalState::of(&row)?.awaiting_client();
    Ok(Json(PublicProposalStatus {
        id: row.id,
        title: row.title,
        status: row.status,
        client_response: row.client_response,
        client_responded_at: row.client_responded_at.map(to_iso),
        expires_at: row.expires_at.map(to_iso),
        can_respond,
    }))
}

pub async fn proposal_pdf(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Response> {
    let row = {
        let mut conn = state.db()?;
        authorize(&mut conn, proposal_id, query.token.as_deref(), false)?
    };
    let key = row.pdf_url.ok_or_else(AppError::not_found)?;
    let bytes = state.storage.get_object(&key).await?;
    pdf_response(bytes, Disposition::Inline, &format!("proposal-{proposal_id}.pdf"))
}

/// Records the client's answer. Approval also opens the contract and marks
/// the inquiry converted, all in one transaction.
fn respond(
    conn: &mut PgConnection,
    proposal_id: Uuid,
    token: Option<&str>,
    action: ProposalAction,
) -> AppResult<(Proposal, Option<Contract>)> {
    conn.transaction::<_, AppError, _>(|conn| {
        let row = authorize(conn, proposal_id, token, true)?;
        let next = check_transition(&row, action, Actor::TokenHolder)?;
        let now = Utc::now().naive_utc();

        let updated: Proposal = diesel::update(proposal::table.find(proposal_id))
            .set((
                proposal::client_response.eq(next.client_response.map(|r| r.as_str())),
                proposal::client_responded_at.eq(Some(now)),
                proposal::updated_at.eq(now),
            ))
            .get_result(conn)?;

        if action != ProposalAction::ClientApprove {
            return Ok((updated, None));
        }

        let contract: Contract = diesel::insert_into(contracts::table)
            .values(&NewContract {
                id: Uuid::new_v4(),
                proposal_id,
                status: ContractStatus::PendingRequest.as_str().to_string(),
            })
            .get_result(conn)?;

        diesel::update(inquiry::table.find(updated.inquiry_id))
            .set((
                inquiry::status.eq("converted"),
                inquiry::updated_at.eq(now),
            ))
            .execute(conn)?;

        Ok((updated, Some(contract)))
    })
}

async fn handle_response(
    state: AppState,
    proposal_id: Uuid,
    token: Option<String>,
    action: ProposalAction,
) -> AppResult<Json<ClientResponseResult>> {
    let mut conn = state.db()?;
    let (updated, contract) = respond(&mut conn, proposal_id, token.as_deref(), action)?;

    let action_name = if action == ProposalAction::ClientApprove {
        "proposal_client_approved"
    } else {
        "proposal_client_rejected"
    };
    activity::record(
        &mut conn,
        Activity::new(None, action_name, "proposal", proposal_id)
            .inquiry(updated.inquiry_id)
            .details(json!({ "contract_id": contract.as_ref().map(|c| c.id) })),
    );
    info!(
        proposal_id = %proposal_id,
        client_response = ?updated.client_response,
        "client responded to proposal"
    );

    Ok(Json(ClientResponseResult {
        proposal_id,
        status: updated.status,
        client_response: updated.client_response,
        contract_id: contract.map(|c| c.id),
    }))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Json<ClientResponseResult>> {
    handle_response(state, proposal_id, query.token, ProposalAction::ClientApprove).await
}

pub async fn reject(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Json<ClientResponseResult>> {
    handle_response(state, proposal_id, query.token, ProposalAction::ClientReject).await
}
