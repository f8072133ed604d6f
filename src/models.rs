use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = inquiry)]
pub struct Inquiry {
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
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = inquiry)]
pub struct NewInquiry {
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
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = inquiry_notes)]
pub struct InquiryNote {
    pub id: Uuid,
    pub inquiry_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = inquiry_notes)]
pub struct NewInquiryNote {
    pub id: Uuid,
    pub inquiry_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = lead)]
pub struct Lead {
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
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = lead)]
pub struct NewLead {
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
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = proposal)]
pub struct Proposal {
    pub id: Uuid,
    pub inquiry_id: Uuid,
    pub requested_by: Uuid,
    pub title: String,
    pub proposal_data: serde_json::Value,
    pub status: String,
    pub client_response: Option<String>,
    pub client_responded_at: Option<NaiveDateTime>,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub pdf_url: Option<String>,
    pub public_token_hash: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
    pub sent_at: Option<NaiveDateTime>,
    pub email_status: Option<String>,
    pub email_error: Option<String>,
    pub email_attempts: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = proposal)]
pub struct NewProposal {
    pub id: Uuid,
    pub inquiry_id: Uuid,
    pub requested_by: Uuid,
    pub title: String,
    pub proposal_data: serde_json::Value,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = contracts)]
pub struct Contract {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub status: String,
    pub request_details: Option<serde_json::Value>,
    pub request_notes: Option<String>,
    pub requested_by: Option<Uuid>,
    pub requested_at: Option<NaiveDateTime>,
    pub contract_pdf_url: Option<String>,
    pub custom_template_url: Option<String>,
    pub admin_notes: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: Option<NaiveDateTime>,
    pub sent_to_sales_at: Option<NaiveDateTime>,
    pub sent_to_client_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = contracts)]
pub struct NewContract {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = calendar_event)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub inquiry_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = calendar_event)]
pub struct NewCalendarEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub inquiry_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: NaiveDateTime,
    pub ends_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = activity_log)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub inquiry_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = activity_log)]
pub struct NewActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub inquiry_id: Option<Uuid>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = clients_showcase)]
pub struct ClientShowcase {
    pub id: Uuid,
    pub company: String,
    pub logo_url: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub employees: Option<String>,
    pub established: Option<String>,
    pub background: Option<String>,
    pub challenge: Option<String>,
    pub solution: Option<String>,
    pub testimonial: Option<String>,
    pub author: Option<String>,
    pub position: Option<String>,
    pub rating: Option<i32>,
    pub waste_reduction: Option<String>,
    pub partnership: Option<String>,
    pub achievements: serde_json::Value,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = clients_showcase)]
pub struct NewClientShowcase {
    pub id: Uuid,
    pub company: String,
    pub logo_url: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub employees: Option<String>,
    pub established: Option<String>,
    pub background: Option<String>,
    pub challenge: Option<String>,
    pub solution: Option<String>,
    pub testimonial: Option<String>,
    pub author: Option<String>,
    pub position: Option<String>,
    pub rating: Option<i32>,
    pub waste_reduction: Option<String>,
    pub partnership: Option<String>,
    pub achievements: serde_json::Value,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
}
