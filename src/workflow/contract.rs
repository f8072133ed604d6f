use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::WorkflowError;
use crate::auth::{AuthenticatedUser, Role};
use crate::error::AppError;
use crate::validation::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStatus {
    PendingRequest,
    Requested,
    Drafted,
    SentToSales,
    Finalized,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 5] = [
        ContractStatus::PendingRequest,
        ContractStatus::Requested,
        ContractStatus::Drafted,
        ContractStatus::SentToSales,
        ContractStatus::Finalized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContractStatus::PendingRequest => "pending_request",
            ContractStatus::Requested => "requested",
            ContractStatus::Drafted => "drafted",
            ContractStatus::SentToSales => "sent_to_sales",
            ContractStatus::Finalized => "finalized",
        }
    }
}

impl FromStr for ContractStatus {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| WorkflowError::UnknownStatus {
                entity: "contract",
                value: value.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractAction {
    Request,
    AttachTemplate,
    UploadPdf { send_to_sales: bool },
    SendToSales,
    SendToClient,
}

impl ContractAction {
    fn as_str(self) -> &'static str {
        match self {
            ContractAction::Request => "request the contract",
            ContractAction::AttachTemplate => "attach a template",
            ContractAction::UploadPdf { .. } => "upload the contract",
            ContractAction::SendToSales => "send to sales",
            ContractAction::SendToClient => "send to the client",
        }
    }
}

/// `proposal_owner` is the sales user who owns the proposal behind the
/// contract.
pub fn transition(
    status: ContractStatus,
    action: ContractAction,
    actor: &AuthenticatedUser,
    proposal_owner: Uuid,
) -> Result<ContractStatus, WorkflowError> {
    use ContractStatus::*;

    match action {
        ContractAction::Request | ContractAction::AttachTemplate | ContractAction::SendToClient => {
            if actor.user_id != proposal_owner {
                return Err(WorkflowError::Forbidden(
                    "only the sales owner of the proposal can do this",
                ));
            }
        }
        ContractAction::UploadPdf { .. } | ContractAction::SendToSales => {
            if !actor.has_role(&[Role::Admin]) {
                return Err(WorkflowError::Forbidden("admin role required"));
            }
        }
    }

    let next = match (action, status) {
        (ContractAction::Request, PendingRequest) => Requested,
        (ContractAction::AttachTemplate, PendingRequest | Requested) => status,
        (ContractAction::UploadPdf { send_to_sales }, Requested | Drafted | SentToSales) => {
            if send_to_sales {
                SentToSales
            } else {
                Drafted
            }
        }
        (ContractAction::SendToSales, Drafted) => SentToSales,
        (ContractAction::SendToClient, SentToSales) => Finalized,
        _ => {
            return Err(WorkflowError::InvalidTransition {
                entity: "contract",
                action: action.as_str(),
                state: status.as_str().to_string(),
            })
        }
    };

    Ok(next)
}

pub const CONTRACT_TYPES: &[&str] = &[
    "long_term_variable",
    "long_term_fixed",
    "fixed_rate_term",
    "garbage_bins",
    "garbage_bins_disposal",
];

pub const COLLECTION_SCHEDULES: &[&str] = &["daily", "weekly", "monthly", "bi_weekly", "other"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signatory {
    pub name: String,
    pub position: String,
}

/// Sales user's request for a contract, stored as `request_details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRequest {
    pub contract_type: String,
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub client_email_contract: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    pub service_address: String,
    pub collection_schedule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_schedule_other: Option<String>,
    pub special_clauses: String,
    pub signatories: Vec<Signatory>,
    pub rate_per_kg: String,
    pub client_requests: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waste_allowance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_notes: Option<String>,
}

fn text<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str)
}

fn optional_text(body: &Value, field: &str) -> Option<String> {
    text(body, field)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl ContractRequest {
    /// Validates a raw request body, reporting every violation at once.
    pub fn parse(body: &Value) -> Result<Self, AppError> {
        let mut v = Validator::new();

        let contract_type = text(body, "contractType");
        v.one_of("contractType", contract_type, CONTRACT_TYPES, "Invalid contract type");
        let client_name = v.required("clientName", text(body, "clientName"), "Client name is required");
        let client_email_contract = v.email(
            "clientEmailContract",
            text(body, "clientEmailContract"),
            "Invalid email format",
        );
        let service_address = v.required(
            "serviceAddress",
            text(body, "serviceAddress"),
            "Service address is required",
        );
        let collection_schedule = text(body, "collectionSchedule");
        v.one_of(
            "collectionSchedule",
            collection_schedule,
            COLLECTION_SCHEDULES,
            "Invalid collection schedule",
        );
        let special_clauses = v.required(
            "specialClauses",
            text(body, "specialClauses"),
            "Special clauses or requests field is required",
        );

        let mut signatories = Vec::new();
        match body.get("signatories").and_then(Value::as_array) {
            Some(entries) if !entries.is_empty() => {
                for (index, entry) in entries.iter().enumerate() {
                    let name = v.required(
                        &format!("signatories.{index}.name"),
                        text(entry, "name"),
                        "Signatory name is required",
                    );
                    let position = v.required(
                        &format!("signatories.{index}.position"),
                        text(entry, "position"),
                        "Signatory position is required",
                    );
                    if let (Some(name), Some(position)) = (name, position) {
                        signatories.push(Signatory { name, position });
                    }
                }
            }
            _ => v.push("signatories", "At least one signatory is required"),
        }

        let rate_per_kg = v.required(
            "ratePerKg",
            text(body, "ratePerKg"),
            "Rate per kg specification is required",
        );
        let client_requests = v.required(
            "clientRequests",
            text(body, "clientRequests"),
            "Client requests field is required",
        );

        v.finish()?;

        // All required values are present once the validator passes.
        let missing = || AppError::bad_request("Validation error: incomplete contract request");
        Ok(Self {
            contract_type: contract_type.ok_or_else(missing)?.to_string(),
            client_name: client_name.ok_or_else(missing)?,
            company_name: optional_text(body, "companyName"),
            client_email_contract: client_email_contract.ok_or_else(missing)?,
            client_address: optional_text(body, "clientAddress"),
            service_address: service_address.ok_or_else(missing)?,
            collection_schedule: collection_schedule.ok_or_else(missing)?.to_string(),
            collection_schedule_other: optional_text(body, "collectionScheduleOther"),
            special_clauses: special_clauses.ok_or_else(missing)?,
            signatories,
            rate_per_kg: rate_per_kg.ok_or_else(missing)?,
            client_requests: client_requests.ok_or_else(missing)?,
            contract_duration: optional_text(body, "contractDuration"),
            actual_address: optional_text(body, "actualAddress"),
            waste_allowance: optional_text(body, "wasteAllowance"),
            request_notes: optional_text(body, "requestNotes"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            username: role.into(),
            role: role.into(),
        }
    }

    fn valid_body() -> Value {
        json!({
            "contractType": "long_term_fixed",
            "clientName": "Maria Santos",
            "clientEmailContract": "maria@acme.ph",
            "serviceAddress": "12 Rizal Ave, Makati",
            "collectionSchedule": "weekly",
            "specialClauses": "None",
            "signatories": [{ "name": "Maria Santos", "position": "COO" }],
            "ratePerKg": "PHP 4.50",
            "clientRequests": "Morning pickups",
            "wasteAllowance": "  ",
            "requestNotes": "Rush please"
        })
    }

    #[test]
    fn walks_the_whole_contract_lifecycle() {
        let owner = user("sales");
        let admin = user("admin");
        let owner_id = owner.user_id;

        let s = transition(ContractStatus::PendingRequest, ContractAction::Request, &owner, owner_id).unwrap();
        assert_eq!(s, ContractStatus::Requested);
        let s = transition(s, ContractAction::AttachTemplate, &owner, owner_id).unwrap();
        assert_eq!(s, ContractStatus::Requested);
        let s = transition(s, ContractAction::UploadPdf { send_to_sales: false }, &admin, owner_id).unwrap();
        assert_eq!(s, ContractStatus::Drafted);
        let s = transition(s, ContractAction::SendToSales, &admin, owner_id).unwrap();
        assert_eq!(s, ContractStatus::SentToSales);
        let s = transition(s, ContractAction::SendToClient, &owner, owner_id).unwrap();
        assert_eq!(s, ContractStatus::Finalized);
    }

    #[test]
    fn upload_can_skip_straight_to_sales() {
        let admin = user("admin");
        let next = transition(
            ContractStatus::Requested,
            ContractAction::UploadPdf { send_to_sales: true },
            &admin,
            Uuid::new_v4(),
        )
        .unwrap();
        assert_eq!(next, ContractStatus::SentToSales);
    }

    #[test]
    fn upload_needs_a_request_first_and_an_admin() {
        let admin = user("admin");
        let owner = user("sales");
        assert!(matches!(
            transition(
                ContractStatus::PendingRequest,
                ContractAction::UploadPdf { send_to_sales: false },
                &admin,
                owner.user_id
            ),
            Err(WorkflowError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transition(
                ContractStatus::Requested,
                ContractAction::UploadPdf { send_to_sales: false },
                &owner,
                owner.user_id
            ),
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[test]
    fn finalized_contracts_are_frozen() {
        let owner = user("sales");
        let admin = user("admin");
        for (action, actor) in [
            (ContractAction::Request, &owner),
            (ContractAction::AttachTemplate, &owner),
            (ContractAction::UploadPdf { send_to_sales: true }, &admin),
            (ContractAction::SendToSales, &admin),
            (ContractAction::SendToClient, &owner),
        ] {
            assert!(transition(ContractStatus::Finalized, action, actor, owner.user_id).is_err());
        }
    }

    #[test]
    fn other_sales_users_cannot_request() {
        let owner = user("sales");
        let other = user("sales");
        assert!(matches!(
            transition(ContractStatus::PendingRequest, ContractAction::Request, &other, owner.user_id),
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[test]
    fn parses_a_complete_request() {
        let request = ContractRequest::parse(&valid_body()).unwrap();
        assert_eq!(request.client_name, "Maria Santos");
        assert_eq!(request.signatories.len(), 1);
        assert_eq!(request.waste_allowance, None);
        assert_eq!(request.request_notes.as_deref(), Some("Rush please"));

        let stored = serde_json::to_value(&request).unwrap();
        assert_eq!(stored["clientEmailContract"], "maria@acme.ph");
        assert!(stored.get("wasteAllowance").is_none());
    }

    #[test]
    fn reports_every_problem_with_paths() {
        let mut body = valid_body();
        body["contractType"] = json!("monthly_magic");
        body["clientEmailContract"] = json!("not-an-email");
        body["signatories"] = json!([{ "name": "Ana", "position": "" }]);

        let err = ContractRequest::parse(&body).unwrap_err();
        assert_eq!(
            err.message(),
            "Validation error: contractType: Invalid contract type, \
             clientEmailContract: Invalid email format, \
             signatories.0.position: Signatory position is required"
        );
    }

    #[test]
    fn requires_at_least_one_signatory() {
        let mut body = valid_body();
        body["signatories"] = json!([]);
        let err = ContractRequest::parse(&body).unwrap_err();
        assert!(err
            .message()
            .contains("signatories: At least one signatory is required"));
    }
}
