use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::Utc;
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::to_iso;
use crate::{
    activity::{self, Activity},
    auth::{AuthenticatedUser, Role},
    error::{AppError, AppResult},
    mailer::{self, EmailAttachment, OutgoingEmail},
    models::{Contract, Inquiry, Proposal},
    schema::{contracts, inquiry, proposal},
    state::AppState,
    storage::{object_key, StorageFolder},
    uploads::{pdf_response, Disposition, UploadForm, UploadKind, PDF_MIME},
    workflow::contract::{transition, ContractAction, ContractRequest, ContractStatus},
};

pub const CONTRACT_PDF_FIELD: &str = "contractPdf";
pub const TEMPLATE_FIELD: &str = "customTemplate";

#[derive(Serialize)]
pub struct ContractResponse {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub status: String,
    pub request_details: Option<Value>,
    pub request_notes: Option<String>,
    pub requested_by: Option<Uuid>,
    pub requested_at: Option<String>,
    pub has_contract_pdf: bool,
    pub has_custom_template: bool,
    pub admin_notes: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: Option<String>,
    pub sent_to_sales_at: Option<String>,
    pub sent_to_client_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Contract> for ContractResponse {
    fn from(row: Contract) -> Self {
        Self {
            id: row.id,
            proposal_id: row.proposal_id,
            status: row.status,
            request_details: row.request_details,
            request_notes: row.request_notes,
            requested_by: row.requested_by,
            requested_at: row.requested_at.map(to_iso),
            has_contract_pdf: row.contract_pdf_url.is_some(),
            has_custom_template: row.custom_template_url.is_some(),
            admin_notes: row.admin_notes,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at.map(to_iso),
            sent_to_sales_at: row.sent_to_sales_at.map(to_iso),
            sent_to_client_at: row.sent_to_client_at.map(to_iso),
            created_at: to_iso(row.created_at),
            updated_at: to_iso(row.updated_at),
        }
    }
}

fn load_with_proposal(
    conn: &mut PgConnection,
    contract_id: Uuid,
    lock: bool,
) -> AppResult<(Contract, Proposal)> {
    let contract: Contract = if lock {
        contracts::table.find(contract_id).for_update().first(conn)?
    } else {
        contracts::table.find(contract_id).first(conn)?
    };
    let owner: Proposal = proposal::table.find(contract.proposal_id).first(conn)?;
    Ok((contract, owner))
}

fn ensure_visible(user: &AuthenticatedUser, owner: &Proposal) -> AppResult<()> {
    if user.has_role(&[Role::Admin, Role::Manager]) || owner.requested_by == user.user_id {
        Ok(())
    } else {
        Err(AppError::forbidden("not your contract"))
    }
}

fn next_status(
    contract: &Contract,
    owner: &Proposal,
    action: ContractAction,
    user: &AuthenticatedUser,
) -> AppResult<ContractStatus> {
    let current: ContractStatus = contract.status.parse()?;
    Ok(transition(current, action, user, owner.requested_by)?)
}

#[derive(Deserialize)]
pub struct ContractListQuery {
    pub status: Option<String>,
}

pub async fn list_contracts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ContractListQuery>,
) -> AppResult<Json<Vec<ContractResponse>>> {
    let mut query = contracts::table.into_boxed();
    if let Some(status) = params.status.as_deref().filter(|s| !s.is_empty()) {
        let status: ContractStatus = status
            .parse()
            .map_err(|_| AppError::bad_request(format!("invalid status '{status}'")))?;
        query = query.filter(contracts::status.eq(status.as_str()));
    }
    if !user.has_role(&[Role::Admin, Role::Manager]) {
        query = query.filter(
            contracts::proposal_id.eq_any(
                proposal::table
                    .filter(proposal::requested_by.eq(user.user_id))
                    .select(proposal::id),
            ),
        );
    }

    let mut conn = state.db()?;
    let rows: Vec<Contract> = query.order(contracts::created_at.desc()).load(&mut conn)?;
    Ok(Json(rows.into_iter().map(ContractResponse::from).collect()))
}

pub async fn get_contract(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<ContractResponse>> {
    let mut conn = state.db()?;
    let (contract, owner) = load_with_proposal(&mut conn, contract_id, false)?;
    ensure_visible(&user, &owner)?;
    Ok(Json(contract.into()))
}

pub async fn request_contract(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<ContractResponse>> {
    let request = ContractRequest::parse(&body)?;
    let details = serde_json::to_value(&request)?;

    let mut conn = state.db()?;
    let (updated, inquiry_id) = conn.transaction::<_, AppError, _>(|conn| {
        let (contract, owner) = load_with_proposal(conn, contract_id, true)?;
        let next = next_status(&contract, &owner, ContractAction::Request, &user)?;
        let now = Utc::now().naive_utc();
        let updated: Contract = diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::status.eq(next.as_str()),
                contracts::request_details.eq(Some(details)),
                contracts::request_notes.eq(request.request_notes.clone()),
                contracts::requested_by.eq(Some(user.user_id)),
                contracts::requested_at.eq(Some(now)),
                contracts::updated_at.eq(now),
            ))
            .get_result(conn)?;
        Ok((updated, owner.inquiry_id))
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "contract_requested", "contract", contract_id)
            .inquiry(inquiry_id)
            .details(json!({ "contract_type": request.contract_type })),
    );
    Ok(Json(updated.into()))
}

/// Checks the action is allowed before any bytes go to storage.
fn precheck(
    state: &AppState,
    contract_id: Uuid,
    action: ContractAction,
    user: &AuthenticatedUser,
) -> AppResult<(Contract, Proposal)> {
    let mut conn = state.db()?;
    let (contract, owner) = load_with_proposal(&mut conn, contract_id, false)?;
    next_status(&contract, &owner, action, user)?;
    Ok((contract, owner))
}

async fn discard_replaced(state: &AppState, previous: Option<String>, current: &str) {
    if let Some(previous) = previous.filter(|key| key != current) {
        if let Err(err) = state.storage.delete_object(&previous).await {
            warn!(error = %err, key = %previous, "failed to delete replaced contract file");
        }
    }
}

pub async fn upload_custom_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ContractResponse>> {
    let mut form = UploadForm::read(multipart, TEMPLATE_FIELD).await?;
    let file = form.take_file(TEMPLATE_FIELD, UploadKind::ContractTemplate)?;
    let (existing, owner) = precheck(&state, contract_id, ContractAction::AttachTemplate, &user)?;

    let now = Utc::now();
    let key = object_key(
        StorageFolder::ContractTemplates,
        now.date_naive(),
        &format!("{}-{}.{}", contract_id, Uuid::new_v4(), file.extension()),
    );
    let content_type = file.effective_content_type();
    state
        .storage
        .put_object(&key, file.bytes, Some(content_type), None)
        .await?;

    let mut conn = state.db()?;
    let updated = conn.transaction::<Contract, AppError, _>(|conn| {
        let (contract, owner) = load_with_proposal(conn, contract_id, true)?;
        next_status(&contract, &owner, ContractAction::AttachTemplate, &user)?;
        Ok(diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::custom_template_url.eq(Some(key.clone())),
                contracts::updated_at.eq(now.naive_utc()),
            ))
            .get_result(conn)?)
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "contract_template_attached", "contract", contract_id)
            .inquiry(owner.inquiry_id),
    );
    drop(conn);
    discard_replaced(&state, existing.custom_template_url, &key).await;

    Ok(Json(updated.into()))
}

/// Admin uploads the drafted contract. `sendToSales=true` hands it to the
/// sales owner in the same step.
pub async fn upload_contract_pdf(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ContractResponse>> {
    let mut form = UploadForm::read(multipart, CONTRACT_PDF_FIELD).await?;
    let file = form.take_file(CONTRACT_PDF_FIELD, UploadKind::Pdf)?;
    let send_to_sales = form.flag("sendToSales");
    let admin_notes = form.text("adminNotes").map(str::to_string);
    let action = ContractAction::UploadPdf { send_to_sales };

    let (existing, owner) = precheck(&state, contract_id, action, &user)?;

    let now = Utc::now();
    let key = object_key(
        StorageFolder::Contracts,
        now.date_naive(),
        &format!("{}-{}.pdf", contract_id, Uuid::new_v4()),
    );
    state
        .storage
        .put_object(&key, file.bytes, Some(PDF_MIME.to_string()), None)
        .await?;

    let mut conn = state.db()?;
    let updated = conn.transaction::<Contract, AppError, _>(|conn| {
        let (contract, owner) = load_with_proposal(conn, contract_id, true)?;
        let next = next_status(&contract, &owner, action, &user)?;
        let now = now.naive_utc();
        let sent_to_sales_at = if next == ContractStatus::SentToSales {
            Some(now)
        } else {
            contract.sent_to_sales_at
        };
        Ok(diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::status.eq(next.as_str()),
                contracts::contract_pdf_url.eq(Some(key.clone())),
                contracts::admin_notes.eq(admin_notes.clone().or(contract.admin_notes)),
                contracts::uploaded_by.eq(Some(user.user_id)),
                contracts::uploaded_at.eq(Some(now)),
                contracts::sent_to_sales_at.eq(sent_to_sales_at),
                contracts::updated_at.eq(now),
            ))
            .get_result(conn)?)
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "contract_uploaded", "contract", contract_id)
            .inquiry(owner.inquiry_id)
            .details(json!({ "status": updated.status, "send_to_sales": send_to_sales })),
    );
    drop(conn);
    discard_replaced(&state, existing.contract_pdf_url, &key).await;
    info!(contract_id = %contract_id, status = %updated.status, key = %key, "contract PDF uploaded");

    Ok(Json(updated.into()))
}

pub async fn send_to_sales(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<ContractResponse>> {
    let mut conn = state.db()?;
    let (updated, inquiry_id) = conn.transaction::<_, AppError, _>(|conn| {
        let (contract, owner) = load_with_proposal(conn, contract_id, true)?;
        let next = next_status(&contract, &owner, ContractAction::SendToSales, &user)?;
        let now = Utc::now().naive_utc();
        let updated: Contract = diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::status.eq(next.as_str()),
                contracts::sent_to_sales_at.eq(Some(now)),
                contracts::updated_at.eq(now),
            ))
            .get_result(conn)?;
        Ok((updated, owner.inquiry_id))
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "contract_sent_to_sales", "contract", contract_id)
            .inquiry(inquiry_id),
    );
    Ok(Json(updated.into()))
}

fn client_address(contract: &Contract, client: Option<&Inquiry>) -> Option<String> {
    contract
        .request_details
        .as_ref()
        .and_then(|details| details.get("clientEmailContract"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| client.map(|row| row.email.clone()))
}

/// Sales owner e-mails the finished contract to the client, attached.
pub async fn send_to_client(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<ContractResponse>> {
    let (contract, owner, client) = {
        let mut conn = state.db()?;
        let (contract, owner) = load_with_proposal(&mut conn, contract_id, false)?;
        next_status(&contract, &owner, ContractAction::SendToClient, &user)?;
        let client: Option<Inquiry> = inquiry::table
            .find(owner.inquiry_id)
            .first(&mut conn)
            .optional()?;
        (contract, owner, client)
    };

    let key = contract
        .contract_pdf_url
        .clone()
        .ok_or_else(|| AppError::conflict("no contract PDF has been uploaded"))?;
    let to = client_address(&contract, client.as_ref())
        .ok_or_else(|| AppError::conflict("no client e-mail address on file"))?;
    let bytes = state.storage.get_object(&key).await?;

    let client_name = client
        .as_ref()
        .map(|row| row.name.as_str())
        .unwrap_or("Valued Client");
    let email = OutgoingEmail {
        to: to.clone(),
        subject: format!("Your WastePH contract: {}", owner.title),
        text_body: format!(
            "Hello {client_name},\n\n\
             Please find attached your contract for \"{}\".\n\
             Reply to this e-mail if you have any questions.\n\n\
             WastePH Sales Team",
            owner.title
        ),
        attachments: vec![EmailAttachment {
            file_name: format!("contract-{contract_id}.pdf"),
            content_type: PDF_MIME.to_string(),
            bytes,
        }],
    };
    let report = mailer::deliver(
        state.mailer.as_ref(),
        email,
        state.config.email_max_attempts,
        Duration::from_millis(state.config.email_retry_base_ms),
    )
    .await;
    if let Some(error) = report.error {
        return Err(AppError::new(
            StatusCode::BAD_GATEWAY,
            format!("failed to e-mail the contract: {error}"),
        ));
    }

    let mut conn = state.db()?;
    let updated = conn.transaction::<Contract, AppError, _>(|conn| {
        let (contract, owner) = load_with_proposal(conn, contract_id, true)?;
        let next = next_status(&contract, &owner, ContractAction::SendToClient, &user)?;
        let now = Utc::now().naive_utc();
        Ok(diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::status.eq(next.as_str()),
                contracts::sent_to_client_at.eq(Some(now)),
                contracts::updated_at.eq(now),
            ))
            .get_result(conn)?)
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "contract_sent_to_client", "contract", contract_id)
            .inquiry(owner.inquiry_id)
            .details(json!({ "to": to })),
    );
    info!(contract_id = %contract_id, "contract sent to client");

    Ok(Json(updated.into()))
}

async fn stream_contract(
    state: AppState,
    user: AuthenticatedUser,
    contract_id: Uuid,
    disposition: Disposition,
) -> AppResult<Response> {
    let contract = {
        let mut conn = state.db()?;
        let (contract, owner) = load_with_proposal(&mut conn, contract_id, false)?;
        ensure_visible(&user, &owner)?;
        contract
    };
    let key = contract.contract_pdf_url.ok_or_else(AppError::not_found)?;
    let bytes = state.storage.get_object(&key).await?;
    pdf_response(bytes, disposition, &format!("contract-{contract_id}.pdf"))
}

pub async fn download_contract_pdf(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Response> {
    stream_contract(state, user, contract_id, Disposition::Attachment).await
}

pub async fn preview_contract_pdf(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Response> {
    stream_contract(state, user, contract_id, Disposition::Inline).await
}
