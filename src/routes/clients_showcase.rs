use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::to_iso;
use crate::{
    activity::{self, Activity},
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{ClientShowcase, NewClientShowcase},
    schema::clients_showcase,
    state::AppState,
    validation::Validator,
};

#[derive(Serialize)]
pub struct ShowcaseResponse {
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
    pub achievements: Vec<String>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ClientShowcase> for ShowcaseResponse {
    fn from(row: ClientShowcase) -> Self {
        let achievements = match row.achievements {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Self {
            id: row.id,
            company: row.company,
            logo_url: row.logo_url,
            industry: row.industry,
            location: row.location,
            employees: row.employees,
            established: row.established,
            background: row.background,
            challenge: row.challenge,
            solution: row.solution,
            testimonial: row.testimonial,
            author: row.author,
            position: row.position,
            rating: row.rating,
            waste_reduction: row.waste_reduction,
            partnership: row.partnership,
            achievements,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: to_iso(row.created_at),
            updated_at: to_iso(row.updated_at),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ShowcasePayload {
    pub company: Option<String>,
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
    pub achievements: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Absent fields are left untouched.
#[derive(AsChangeset)]
#[diesel(table_name = clients_showcase)]
struct ShowcaseChangeset {
    company: Option<String>,
    logo_url: Option<String>,
    industry: Option<String>,
    location: Option<String>,
    employees: Option<String>,
    established: Option<String>,
    background: Option<String>,
    challenge: Option<String>,
    solution: Option<String>,
    testimonial: Option<String>,
    author: Option<String>,
    position: Option<String>,
    rating: Option<i32>,
    waste_reduction: Option<String>,
    partnership: Option<String>,
    achievements: Option<Value>,
    is_active: Option<bool>,
    updated_at: NaiveDateTime,
}

impl ShowcasePayload {
    /// `creating` makes the company mandatory; updates only reject a blank one.
    pub fn validate(&self, creating: bool) -> AppResult<()> {
        let mut v = Validator::new();
        match self.company.as_deref() {
            Some(company) => {
                v.required("company", Some(company), "Company name is required");
                v.max_len("company", Some(company), 255);
            }
            None if creating => v.push("company", "Company name is required"),
            None => {}
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                v.push("rating", "Rating must be between 1 and 5");
            }
        }
        v.finish()
    }

    fn into_changeset(self) -> ShowcaseChangeset {
        ShowcaseChangeset {
            company: self.company.map(|company| company.trim().to_string()),
            logo_url: self.logo_url,
            industry: self.industry,
            location: self.location,
            employees: self.employees,
            established: self.established,
            background: self.background,
            challenge: self.challenge,
            solution: self.solution,
            testimonial: self.testimonial,
            author: self.author,
            position: self.position,
            rating: self.rating,
            waste_reduction: self.waste_reduction,
            partnership: self.partnership,
            achievements: self.achievements.map(|items| json!(items)),
            is_active: self.is_active,
            updated_at: Utc::now().naive_utc(),
        }
    }

    fn into_new(self, created_by: Uuid) -> NewClientShowcase {
        NewClientShowcase {
            id: Uuid::new_v4(),
            company: self.company.unwrap_or_default().trim().to_string(),
            logo_url: self.logo_url,
            industry: self.industry,
            location: self.location,
            employees: self.employees,
            established: self.established,
            background: self.background,
            challenge: self.challenge,
            solution: self.solution,
            testimonial: self.testimonial,
            author: self.author,
            position: self.position,
            rating: self.rating,
            waste_reduction: self.waste_reduction,
            partnership: self.partnership,
            achievements: json!(self.achievements.unwrap_or_default()),
            is_active: self.is_active.unwrap_or(true),
            created_by: Some(created_by),
        }
    }
}

fn collect(rows: Vec<ClientShowcase>) -> Json<Vec<ShowcaseResponse>> {
    Json(rows.into_iter().map(ShowcaseResponse::from).collect())
}

/// Public listing for the marketing site.
pub async fn list_active(State(state): State<AppState>) -> AppResult<Json<Vec<ShowcaseResponse>>> {
    let mut conn = state.db()?;
    let rows = clients_showcase::table
        .filter(clients_showcase::is_active.eq(true))
        .order(clients_showcase::created_at.desc())
        .load::<ClientShowcase>(&mut conn)?;
    Ok(collect(rows))
}

pub async fn list_all(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<ShowcaseResponse>>> {
    let mut conn = state.db()?;
    let rows = clients_showcase::table
        .order(clients_showcase::created_at.desc())
        .load::<ClientShowcase>(&mut conn)?;
    Ok(collect(rows))
}

pub async fn get_showcase(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ShowcaseResponse>> {
    let mut conn = state.db()?;
    let row: ClientShowcase = clients_showcase::table.find(id).first(&mut conn)?;
    Ok(Json(row.into()))
}

pub async fn create_showcase(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ShowcasePayload>,
) -> AppResult<(StatusCode, Json<ShowcaseResponse>)> {
    payload.validate(true)?;
    let mut conn = state.db()?;
    let row: ClientShowcase = diesel::insert_into(clients_showcase::table)
        .values(payload.into_new(user.user_id))
        .get_result(&mut conn)?;
    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "showcase_created", "clients_showcase", row.id)
            .details(json!({ "company": row.company })),
    );
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn update_showcase(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ShowcasePayload>,
) -> AppResult<Json<ShowcaseResponse>> {
    payload.validate(false)?;
    let mut conn = state.db()?;
    let row: ClientShowcase = diesel::update(clients_showcase::table.find(id))
        .set(payload.into_changeset())
        .get_result(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "showcase_updated", "clients_showcase", id),
    );
    Ok(Json(row.into()))
}

pub async fn delete_showcase(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(clients_showcase::table.find(id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "showcase_deleted", "clients_showcase", id),
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_showcase(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ShowcaseResponse>> {
    let mut conn = state.db()?;
    let row: ClientShowcase = diesel::update(clients_showcase::table.find(id))
        .set((
            clients_showcase::is_active.eq(diesel::dsl::not(clients_showcase::is_active)),
            clients_showcase::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "showcase_toggled", "clients_showcase", id)
            .details(json!({ "is_active": row.is_active })),
    );
    Ok(Json(row.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_is_required_on_create_only() {
        let payload = ShowcasePayload::default();
        let err = payload.validate(true).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().contains("company: Company name is required"));
        assert!(payload.validate(false).is_ok());
    }

    #[test]
    fn blank_company_is_rejected_on_update() {
        let payload = ShowcasePayload {
            company: Some("   ".into()),
            ..Default::default()
        };
        assert!(payload.validate(false).is_err());
    }

    #[test]
    fn rating_must_be_between_one_and_five() {
        for (rating, ok) in [(0, false), (1, true), (5, true), (6, false)] {
            let payload = ShowcasePayload {
                company: Some("Acme".into()),
                rating: Some(rating),
                ..Default::default()
            };
            assert_eq!(payload.validate(true).is_ok(), ok, "rating {rating}");
        }
    }

    #[test]
    fn new_entries_default_to_active() {
        let user = Uuid::new_v4();
        let row = ShowcasePayload {
            company: Some("  Acme Foods ".into()),
            achievements: Some(vec!["Zero landfill".into()]),
            ..Default::default()
        }
        .into_new(user);
        assert_eq!(row.company, "Acme Foods");
        assert!(row.is_active);
        assert_eq!(row.achievements, json!(["Zero landfill"]));
        assert_eq!(row.created_by, Some(user));
    }
}
