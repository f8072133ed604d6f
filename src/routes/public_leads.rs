use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    activity::{self, Activity},
    error::AppResult,
    models::{Lead, NewLead},
    schema::lead,
    state::AppState,
    validation::Validator,
};

#[derive(Serialize)]
pub struct PublicLeadReceipt {
    pub id: Uuid,
    pub message: &'static str,
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str)
}

fn optional(body: &Value, name: &str) -> Option<String> {
    field(body, name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn parse_public_lead(body: &Value) -> AppResult<NewLead> {
    let mut v = Validator::new();
    let client_name = v.required("name", field(body, "name"), "Name is required");
    v.max_len("name", field(body, "name"), 255);
    let email = v.email("email", field(body, "email"), "Invalid email format");
    let phone = v.required("phone", field(body, "phone"), "Phone is required");
    v.max_len("phone", field(body, "phone"), 64);
    v.max_len("company", field(body, "company"), 255);
    v.max_len("service_type", field(body, "service_type"), 100);
    v.finish()?;

    Ok(NewLead {
        id: Uuid::new_v4(),
        inquiry_id: None,
        client_name: client_name.unwrap_or_default(),
        company: optional(body, "company"),
        email: email.unwrap_or_default(),
        phone,
        location: optional(body, "location"),
        service_type: optional(body, "service_type"),
        notes: optional(body, "message"),
        status: "new".to_string(),
        created_by: None,
    })
}

/// Landing-page lead form. Throttled per IP by the router.
pub async fn create_public_lead(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<PublicLeadReceipt>)> {
    let new_lead = parse_public_lead(&body)?;

    let mut conn = state.db()?;
    let created: Lead = diesel::insert_into(lead::table)
        .values(&new_lead)
        .get_result(&mut conn)?;

    activity::record(
        &mut conn,
        Activity::new(None, "public_lead_submitted", "lead", created.id)
            .details(json!({ "service_type": created.service_type })),
    );
    info!(lead_id = %created.id, "public lead received");

    Ok((
        StatusCode::CREATED,
        Json(PublicLeadReceipt {
            id: created.id,
            message: "Thank you! Our team will contact you shortly.",
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_name_email_and_phone() {
        let err = parse_public_lead(&json!({ "email": "bad" })).unwrap_err();
        assert_eq!(
            err.message(),
            "Validation error: name: Name is required, email: Invalid email format, phone: Phone is required"
        );
    }

    #[test]
    fn builds_an_unowned_new_lead() {
        let lead = parse_public_lead(&json!({
            "name": "Jose Rizal",
            "email": "jose@example.ph",
            "phone": "+63 917 000 0000",
            "service_type": "hazardous",
            "message": "Need weekly pickup"
        }))
        .unwrap();
        assert_eq!(lead.client_name, "Jose Rizal");
        assert_eq!(lead.created_by, None);
        assert_eq!(lead.status, "new");
        assert_eq!(lead.notes.as_deref(), Some("Need weekly pickup"));
    }
}
