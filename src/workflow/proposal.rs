use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use super::WorkflowError;
use crate::auth::{AuthenticatedUser, Role};
use crate::models::Proposal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Draft,
    Approved,
    Rejected,
    Sent,
    Canceled,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 5] = [
        ProposalStatus::Draft,
        ProposalStatus::Approved,
        ProposalStatus::Rejected,
        ProposalStatus::Sent,
        ProposalStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Sent => "sent",
            ProposalStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for ProposalStatus {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| WorkflowError::UnknownStatus {
                entity: "proposal",
                value: value.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientResponse {
    Approved,
    Rejected,
}

impl ClientResponse {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientResponse::Approved => "approved",
            ClientResponse::Rejected => "rejected",
        }
    }
}

impl FromStr for ClientResponse {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "approved" => Ok(ClientResponse::Approved),
            "rejected" => Ok(ClientResponse::Rejected),
            other => Err(WorkflowError::UnknownStatus {
                entity: "proposal client response",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalState {
    pub status: ProposalStatus,
    pub client_response: Option<ClientResponse>,
}

impl ProposalState {
    pub fn new(status: ProposalStatus) -> Self {
        Self {
            status,
            client_response: None,
        }
    }

    pub fn of(proposal: &Proposal) -> Result<Self, WorkflowError> {
        Ok(Self {
            status: proposal.status.parse()?,
            client_response: proposal
                .client_response
                .as_deref()
                .map(str::parse)
                .transpose()?,
        })
    }

    /// Sent and still waiting on the client.
    pub fn awaiting_client(self) -> bool {
        self.status == ProposalStatus::Sent && self.client_response.is_none()
    }

    pub fn is_terminal(self) -> bool {
        self.status == ProposalStatus::Canceled || self.client_response.is_some()
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.client_response {
            Some(response) => write!(f, "{} ({} by client)", self.status.as_str(), response.as_str()),
            None => f.write_str(self.status.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalAction {
    Revise,
    Approve,
    Reject,
    Send,
    Cancel,
    RetryEmail,
    ClientApprove,
    ClientReject,
}

impl ProposalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalAction::Revise => "revise",
            ProposalAction::Approve => "approve",
            ProposalAction::Reject => "reject",
            ProposalAction::Send => "send",
            ProposalAction::Cancel => "cancel",
            ProposalAction::RetryEmail => "retry email for",
            ProposalAction::ClientApprove => "approve",
            ProposalAction::ClientReject => "reject",
        }
    }
}

/// Who is asking. Public token holders have already proven the token.
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    Staff(&'a AuthenticatedUser),
    TokenHolder,
}

/// Facts about the stored proposal the guards need beyond its status.
#[derive(Debug, Clone, Copy)]
pub struct ProposalFacts {
    pub owner: Uuid,
    pub has_pdf: bool,
}

impl ProposalFacts {
    pub fn of(proposal: &Proposal) -> Self {
        Self {
            owner: proposal.requested_by,
            has_pdf: proposal.pdf_url.is_some(),
        }
    }
}

/// Applies `action` to `state`. Permission is checked before state so a
/// caller without rights never learns more than 403.
pub fn transition(
    state: ProposalState,
    action: ProposalAction,
    actor: Actor<'_>,
    facts: ProposalFacts,
) -> Result<ProposalState, WorkflowError> {
    authorize(action, actor, facts)?;

    use ProposalAction::*;
    use ProposalStatus::*;

    let invalid = || WorkflowError::InvalidTransition {
        entity: "proposal",
        action: action.as_str(),
        state: state.to_string(),
    };

    let next = match action {
        Revise => match state.status {
            Draft | Rejected => ProposalState::new(Draft),
            _ => return Err(invalid()),
        },
        Approve => match state.status {
            Draft => ProposalState::new(Approved),
            _ => return Err(invalid()),
        },
        Reject => match state.status {
            Draft => ProposalState::new(Rejected),
            _ => return Err(invalid()),
        },
        Send => {
            if state.status != Approved {
                return Err(invalid());
            }
            if !facts.has_pdf {
                return Err(WorkflowError::Precondition(
                    "upload the proposal PDF before sending",
                ));
            }
            ProposalState::new(Sent)
        }
        Cancel => match state.status {
            Draft | Approved => ProposalState::new(Canceled),
            Sent if state.awaiting_client() => ProposalState::new(Canceled),
            _ => return Err(invalid()),
        },
        RetryEmail => {
            if !state.awaiting_client() {
                return Err(invalid());
            }
            state
        }
        ClientApprove | ClientReject => {
            if !state.awaiting_client() {
                return Err(invalid());
            }
            let response = if action == ClientApprove {
                ClientResponse::Approved
            } else {
                ClientResponse::Rejected
            };
            ProposalState {
                status: Sent,
                client_response: Some(response),
            }
        }
    };

    Ok(next)
}

fn authorize(
    action: ProposalAction,
    actor: Actor<'_>,
    facts: ProposalFacts,
) -> Result<(), WorkflowError> {
    use ProposalAction::*;

    match (action, actor) {
        (ClientApprove | ClientReject, Actor::TokenHolder) => Ok(()),
        (ClientApprove | ClientReject, Actor::Staff(_)) => Err(WorkflowError::Forbidden(
            "only the client can respond to a sent proposal",
        )),
        (_, Actor::TokenHolder) => Err(WorkflowError::Forbidden("staff action")),
        (Revise | Send, Actor::Staff(user)) => {
            if user.user_id == facts.owner {
                Ok(())
            } else {
                Err(WorkflowError::Forbidden(
                    "only the sales owner can change this proposal",
                ))
            }
        }
        (Approve | Reject | RetryEmail, Actor::Staff(user)) => {
            if user.has_role(&[Role::Admin]) {
                Ok(())
            } else {
                Err(WorkflowError::Forbidden("admin role required"))
            }
        }
        (Cancel, Actor::Staff(user)) => {
            if user.user_id == facts.owner || user.has_role(&[Role::Admin]) {
                Ok(())
            } else {
                Err(WorkflowError::Forbidden(
                    "only the sales owner or an admin can cancel",
                ))
            }
        }
    }
}
