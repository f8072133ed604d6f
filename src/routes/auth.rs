//! Staff sign-in. Access tokens are short-lived JWTs; the refresh token is an
//! opaque value in an httpOnly cookie, stored hashed and rotated on every use.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    activity::{self, Activity},
    auth::{password, AuthenticatedUser},
    config::AppConfig,
    error::{AppError, AppResult},
    models::{NewRefreshToken, RefreshToken, User},
    schema::{refresh_tokens, users},
    state::AppState,
    utils::token::{generate_token, hash_token},
};

pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct StaffProfile {
    pub id: Uuid,
    pub username: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: StaffProfile,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<SessionResponse>)> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }

    let mut conn = state.db()?;
    let user: Option<User> = users::table
        .filter(users::username.eq(username))
        .first(&mut conn)
        .optional()?;
    let Some(user) = user else {
        warn!(username, "login for unknown user");
        return Err(AppError::unauthorized());
    };

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        warn!(user_id = %user.id, "login with wrong password");
        activity::record(
            &mut conn,
            Activity::new(Some(user.id), "login_failed", "user", user.id),
        );
        return Err(AppError::unauthorized());
    }

    let refresh = store_refresh_token(&mut conn, &state.config, user.id)?;
    let session = issue_session(&state, &user, refresh)?;
    activity::record(
        &mut conn,
        Activity::new(Some(user.id), "user_logged_in", "user", user.id)
            .details(json!({ "role": user.role })),
    );
    info!(user_id = %user.id, role = %user.role, "staff signed in");
    Ok(session)
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<SessionResponse>)> {
    let presented = jar
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(REFRESH_COOKIE))
        .map(hash_token)
        .ok_or_else(AppError::unauthorized)?;

    let mut conn = state.db()?;
    let config = state.config.clone();
    let (user, refresh) = conn.transaction::<_, AppError, _>(|conn| {
        let now = Utc::now().naive_utc();
        // Locked so two concurrent refreshes cannot both rotate the same token.
        let current: RefreshToken = refresh_tokens::table
            .filter(refresh_tokens::token_hash.eq(&presented))
            .filter(refresh_tokens::revoked_at.is_null())
            .filter(refresh_tokens::expires_at.gt(now))
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(AppError::unauthorized)?;

        diesel::update(refresh_tokens::table.find(current.id))
            .set((
                refresh_tokens::revoked_at.eq(Some(now)),
                refresh_tokens::updated_at.eq(now),
            ))
            .execute(conn)?;
        let user: User = users::table
            .find(current.user_id)
            .first(conn)
            .optional()?
            .ok_or_else(AppError::unauthorized)?;
        let refresh = store_refresh_token(conn, &config, user.id)?;
        Ok((user, refresh))
    })?;

    issue_session(&state, &user, refresh)
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let presented = jar
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(REFRESH_COOKIE))
        .map(hash_token);

    let mut conn = state.db()?;
    let revoked = conn.transaction::<_, AppError, _>(|conn| {
        let now = Utc::now().naive_utc();
        let mut revoked = 0;
        if let Some(hash) = &presented {
            revoked = diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::user_id.eq(user.user_id))
                    .filter(refresh_tokens::token_hash.eq(hash))
                    .filter(refresh_tokens::revoked_at.is_null()),
            )
            .set((
                refresh_tokens::revoked_at.eq(Some(now)),
                refresh_tokens::updated_at.eq(now),
            ))
            .execute(conn)?;
        }
        // No usable cookie: end every session of this user.
        if revoked == 0 {
            revoked = diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::user_id.eq(user.user_id))
                    .filter(refresh_tokens::revoked_at.is_null()),
            )
            .set((
                refresh_tokens::revoked_at.eq(Some(now)),
                refresh_tokens::updated_at.eq(now),
            ))
            .execute(conn)?;
        }
        Ok(revoked)
    })?;

    activity::record(
        &mut conn,
        Activity::new(Some(user.user_id), "user_logged_out", "user", user.user_id)
            .details(json!({ "revoked_sessions": revoked })),
    );
    info!(user_id = %user.user_id, revoked, "staff signed out");

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie_header(&state.config, "", 0, None)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

struct IssuedRefresh {
    value: String,
    expires_at: DateTime<Utc>,
}

fn store_refresh_token(
    conn: &mut PgConnection,
    config: &AppConfig,
    user_id: Uuid,
) -> AppResult<IssuedRefresh> {
    let now = Utc::now();
    let value = generate_token();
    let expires_at = now + ChronoDuration::days(config.refresh_token_expiry_days);
    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token(&value),
            issued_at: now.naive_utc(),
            expires_at: expires_at.naive_utc(),
        })
        .execute(conn)?;
    Ok(IssuedRefresh { value, expires_at })
}

fn issue_session(
    state: &AppState,
    user: &User,
    refresh: IssuedRefresh,
) -> AppResult<(HeaderMap, Json<SessionResponse>)> {
    let access_token = state
        .jwt
        .generate_token(user.id, &user.username, &user.role)
        .map_err(AppError::from)?;

    let max_age = (refresh.expires_at - Utc::now()).num_seconds().max(0);
    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        cookie_header(&state.config, &refresh.value, max_age, Some(refresh.expires_at))?,
    );

    Ok((
        headers,
        Json(SessionResponse {
            access_token,
            token_type: "Bearer",
            expires_in: state.config.jwt_expiry_minutes * 60,
            user: StaffProfile {
                id: user.id,
                username: user.username.clone(),
                role: user.role.clone(),
            },
        }),
    ))
}

/// `Set-Cookie` for the refresh token. An empty value with `max_age` 0 clears it.
fn cookie_header(
    config: &AppConfig,
    value: &str,
    max_age: i64,
    expires_at: Option<DateTime<Utc>>,
) -> AppResult<HeaderValue> {
    refresh_cookie(
        value,
        max_age,
        expires_at,
        config.refresh_cookie_secure,
        config.refresh_cookie_domain.as_deref(),
    )
    .parse()
    .map_err(AppError::internal)
}

fn refresh_cookie(
    value: &str,
    max_age: i64,
    expires_at: Option<DateTime<Utc>>,
    secure: bool,
    domain: Option<&str>,
) -> String {
    let expires = expires_at
        .map(|at| at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
        .unwrap_or_else(|| "Thu, 01 Jan 1970 00:00:00 GMT".to_string());
    let mut cookie = format!(
        "{REFRESH_COOKIE}={value}; Path=/api/auth; HttpOnly; SameSite=Strict; Max-Age={max_age}; Expires={expires}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn refresh_cookie_is_scoped_to_auth_routes() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        let cookie = refresh_cookie("abc", 3600, Some(at), true, Some("wasteph.com"));
        assert!(cookie.starts_with("refresh_token=abc; Path=/api/auth; HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.contains("Expires=Sun, 01 Jun 2025 08:30:00 GMT"));
        assert!(cookie.ends_with("; Secure; Domain=wasteph.com"));
    }

    #[test]
    fn clearing_cookie_expires_it_immediately() {
        let cookie = refresh_cookie("", 0, None, false, None);
        assert!(cookie.starts_with("refresh_token=; "));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("1970"));
        assert!(!cookie.contains("Secure"));
    }
}
