use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, rate_limit, state::AppState};

pub mod activity_logs;
pub mod auth;
pub mod calendar_events;
pub mod clients_showcase;
pub mod contracts;
pub mod health;
pub mod inquiries;
pub mod leads;
pub mod proposals;
pub mod public_leads;
pub mod public_proposals;

/// Multipart uploads are capped at 10 MiB per file; leave room for fields.
pub const BODY_LIMIT_BYTES: usize = 12 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = build_cors(state.config.cors_allowed_origin.as_deref());
    let limiters = state.rate_limiters.clone();

    let login_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .layer(middleware::from_fn_with_state(
            limiters.login.clone(),
            rate_limit::enforce,
        ));

    let public_lead_routes = Router::new()
        .route("/api/public/leads", post(public_leads::create_public_lead))
        .layer(middleware::from_fn_with_state(
            limiters.public_leads.clone(),
            rate_limit::enforce,
        ));

    let public_proposal_routes = Router::new()
        .route(
            "/api/proposals/public/:id/status",
            get(public_proposals::proposal_status),
        )
        .route(
            "/api/proposals/public/:id/pdf",
            get(public_proposals::proposal_pdf),
        )
        .route(
            "/api/proposals/public/:id/approve",
            post(public_proposals::approve),
        )
        .route(
            "/api/proposals/public/:id/reject",
            post(public_proposals::reject),
        )
        .layer(middleware::from_fn_with_state(
            limiters.public_proposals.clone(),
            rate_limit::enforce,
        ));

    let auth_routes = Router::new()
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    // Mixes public and staff handlers on one path; staff handlers extract
    // `AuthenticatedUser` themselves.
    let inquiry_routes = Router::new()
        .route(
            "/",
            get(inquiries::list_inquiries).post(inquiries::create_public_inquiry),
        )
        .route("/manual", post(inquiries::create_manual_inquiry))
        .route(
            "/:id",
            get(inquiries::get_inquiry)
                .patch(inquiries::update_inquiry)
                .delete(inquiries::delete_inquiry),
        )
        .route("/:id/convert-to-lead", post(inquiries::convert_to_lead))
        .route(
            "/:id/notes",
            get(inquiries::list_notes).post(inquiries::add_note),
        );

    let showcase_routes = Router::new()
        .route(
            "/",
            get(clients_showcase::list_active).post(clients_showcase::create_showcase),
        )
        .route("/all", get(clients_showcase::list_all))
        .route(
            "/:id",
            get(clients_showcase::get_showcase)
                .put(clients_showcase::update_showcase)
                .delete(clients_showcase::delete_showcase),
        )
        .route("/:id/toggle", patch(clients_showcase::toggle_showcase));

    let leads_routes = Router::new()
        .route("/", get(leads::list_leads))
        .route("/:id", get(leads::get_lead).patch(leads::update_lead));

    let proposals_routes = Router::new()
        .route(
            "/",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route(
            "/:id",
            get(proposals::get_proposal).put(proposals::update_proposal),
        )
        .route(
            "/:id/pdf",
            get(proposals::download_pdf).post(proposals::upload_pdf),
        )
        .route("/:id/approve", post(proposals::approve_proposal))
        .route("/:id/reject", post(proposals::reject_proposal))
        .route("/:id/send", post(proposals::send_proposal))
        .route("/:id/cancel", post(proposals::cancel_proposal))
        .route("/:id/retry-email", post(proposals::retry_email));

    let contracts_routes = Router::new()
        .route("/", get(contracts::list_contracts))
        .route("/:id", get(contracts::get_contract))
        .route("/:id/request", post(contracts::request_contract))
        .route("/:id/custom-template", post(contracts::upload_custom_template))
        .route("/:id/upload-pdf", post(contracts::upload_contract_pdf))
        .route("/:id/send-to-sales", post(contracts::send_to_sales))
        .route("/:id/send-to-client", post(contracts::send_to_client))
        .route("/:id/contract-pdf", get(contracts::download_contract_pdf))
        .route("/:id/preview-pdf", get(contracts::preview_contract_pdf));

    let calendar_routes = Router::new()
        .route(
            "/",
            get(calendar_events::list_events).post(calendar_events::create_event),
        )
        .route("/:id", axum::routing::delete(calendar_events::delete_event));

    let activity_routes = Router::new().route("/", get(activity_logs::list_activity));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/leads", leads_routes)
        .nest("/api/proposals", proposals_routes)
        .nest("/api/contracts", contracts_routes)
        .nest("/api/calendar-events", calendar_routes)
        .nest("/api/activity-logs", activity_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    let api_routes = Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/inquiries", inquiry_routes)
        .nest("/api/clients-showcase", showcase_routes)
        .layer(middleware::from_fn_with_state(
            limiters.api.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .merge(login_routes)
        .merge(public_lead_routes)
        .merge(public_proposal_routes)
        .merge(api_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
}

fn build_cors(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

impl PageQuery {
    /// `(page, limit, offset)` with page at least 1 and limit in `1..=100`.
    pub fn resolve(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, limit, (page - 1).saturating_mul(limit))
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_clamps_bounds() {
        let query = PageQuery {
            page: Some(0),
            limit: Some(500),
        };
        assert_eq!(query.resolve(), (1, 100, 0));

        let query = PageQuery {
            page: Some(3),
            limit: None,
        };
        assert_eq!(query.resolve(), (3, 20, 40));

        let query = PageQuery {
            page: Some(i64::MAX),
            limit: Some(20),
        };
        assert_eq!(query.resolve(), (i64::MAX, 20, i64::MAX));
    }

    #[test]
    fn iso_timestamps_are_utc() {
        let dt = NaiveDateTime::parse_from_str("2025-02-03 04:05:06", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(to_iso(dt), "2025-02-03T04:05:06+00:00");
    }
}
