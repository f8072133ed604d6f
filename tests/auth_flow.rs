mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{acquire_db_lock, body_json, TestApp, PASSWORD};
use serde_json::json;

fn refresh_cookie(response: &hyper::Response<Body>) -> String {
    let raw = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("set-cookie header");
    raw.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("alice", "admin").await?;
    let token = app.login_token("alice").await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let user = body_json(response).await?;
    assert_eq!(user["username"], "alice");
    assert_eq!(user["role"], "admin");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_unauthorized() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("bob", "sales").await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "bob", "password": "nope" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "nobody", "password": PASSWORD }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/leads", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_logout_revokes() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("carol", "manager").await?;

    let login = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "carol", "password": PASSWORD }),
            None,
        )
        .await?;
    assert_eq!(login.status(), StatusCode::OK);
    let first_cookie = refresh_cookie(&login);
    let access = body_json(login).await?["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let refresh = |cookie: String| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/auth/refresh")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    };

    let rotated = app.send(refresh(first_cookie.clone())).await?;
    assert_eq!(rotated.status(), StatusCode::OK);
    let second_cookie = refresh_cookie(&rotated);
    assert_ne!(first_cookie, second_cookie);

    // the first cookie was revoked by the rotation
    let replay = app.send(refresh(first_cookie)).await?;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    let logout = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .header(header::COOKIE, second_cookie.clone())
        .body(Body::empty())?;
    let response = app.send(logout).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let after_logout = app.send(refresh(second_cookie)).await?;
    assert_eq!(after_logout.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn logout_without_cookie_ends_every_session_and_is_logged() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let user_id = app.insert_user("dana", "admin").await?;

    let mut cookies = Vec::new();
    let mut access = String::new();
    for _ in 0..2 {
        let login = app
            .post_json(
                "/api/auth/login",
                &json!({ "username": "dana", "password": PASSWORD }),
                None,
            )
            .await?;
        assert_eq!(login.status(), StatusCode::OK);
        cookies.push(refresh_cookie(&login));
        let body = body_json(login).await?;
        assert_eq!(body["user"]["username"], "dana");
        assert_eq!(body["user"]["role"], "admin");
        access = body["access_token"].as_str().unwrap().to_string();
    }

    let response = app.post("/api/auth/logout", Some(&access)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = refresh_cookie(&response);
    assert_eq!(cleared, "refresh_token=");

    for cookie in cookies {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/refresh")
            .header(header::COOKIE, cookie)
            .body(Body::empty())?;
        assert_eq!(app.send(request).await?.status(), StatusCode::UNAUTHORIZED);
    }

    let history = body_json(
        app.get(
            &format!("/api/activity-logs?entity_type=user&entity_id={user_id}"),
            Some(&access),
        )
        .await?,
    )
    .await?;
    let entries = history.as_array().unwrap();
    let logins = entries
        .iter()
        .filter(|entry| entry["action"] == "user_logged_in")
        .count();
    assert_eq!(logins, 2);
    let logout = entries
        .iter()
        .find(|entry| entry["action"] == "user_logged_out")
        .expect("logout entry");
    assert_eq!(logout["details"]["revoked_sessions"], 2);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn health_reports_database() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);

    app.cleanup().await?;
    Ok(())
}
