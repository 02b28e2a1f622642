mod support;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use catalog_service::accounts::Registration;
use common_auth::{AuthError, JwtConfig, Role, SigningKey, TokenValidator};
use serde_json::json;
use support::{TestApp, TEST_SECRET};

#[tokio::test]
async fn alice_registers_logs_in_and_sees_role_changes_live() {
    let app = TestApp::new();

    let first = app.register("alice", "a@x.com", "pw1").await;
    assert_eq!(first.status, StatusCode::CREATED);
    let body = first.json();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "USER");
    assert!(body.get("password_hash").is_none());

    let duplicate = app.register("alice", "b@x.com", "pw2").await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
    assert_eq!(duplicate.error_code(), Some("username_taken"));

    let wrong = app.login("alice", "wrong").await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.error_code(), Some("invalid_credentials"));

    let login = app.login("alice", "pw1").await;
    assert_eq!(login.status, StatusCode::OK);
    let login_body = login.json();
    assert_eq!(login_body["token_type"], "Bearer");
    assert_eq!(login_body["authorities"], json!(["ROLE_USER"]));
    let token = login_body["token"].as_str().expect("token").to_string();

    let key = Arc::new(SigningKey::from_secret(TEST_SECRET.as_bytes()).expect("key"));
    let claims = TokenValidator::new(key, JwtConfig::new())
        .validate(&token)
        .expect("valid token");
    assert_eq!(claims.subject, "alice");
    assert_eq!(claims.role, Role::User);

    let forbidden = app.get("/api/admin/users", Some(&token)).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    app.state
        .accounts
        .set_role("alice", Role::Admin)
        .await
        .expect("set role")
        .expect("alice exists");

    let context = app
        .state
        .gate
        .resolve("/api/admin/users", &bearer(&token))
        .await
        .expect("resolve");
    assert_eq!(context.identity().map(|id| id.role), Some(Role::Admin));

    let allowed = app.get("/api/admin/users", Some(&token)).await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(allowed.json().as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn login_failures_are_byte_identical() {
    let app = TestApp::new();
    app.register("bob", "bob@x.com", "correct-horse").await;

    let unknown = app.login("nobody", "correct-horse").await;
    let mismatch = app.login("bob", "battery-staple").await;

    assert_eq!(unknown.status, mismatch.status);
    assert_eq!(unknown.body, mismatch.body);
    assert_eq!(unknown.error_code(), mismatch.error_code());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_admit_exactly_one_winner() {
    let app = TestApp::new();

    let mut handles = Vec::new();
    for attempt in 0..8 {
        let accounts = app.state.accounts.clone();
        handles.push(tokio::spawn(async move {
            accounts
                .register(Registration {
                    username: "racer".into(),
                    email: format!("racer{attempt}@x.com"),
                    password: "same-password".into(),
                    role: None,
                })
                .await
        }));
    }

    let mut winners = 0;
    let mut taken = 0;
    for handle in handles {
        match handle.await.expect("task") {
            Ok(_) => winners += 1,
            Err(AuthError::UsernameTaken) => taken += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(taken, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_password_changes_admit_exactly_one_winner() {
    let app = TestApp::new();
    app.register("racer", "racer@x.com", "start-pw").await;

    let mut handles = Vec::new();
    for attempt in 0..6 {
        let accounts = app.state.accounts.clone();
        handles.push(tokio::spawn(async move {
            let next = format!("next-pw-{attempt}");
            let outcome = accounts.change_password("racer", "start-pw", &next).await;
            (next, outcome)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.expect("task") {
            (next, Ok(())) => winners.push(next),
            (_, Err(AuthError::InvalidCredentials)) => {}
            (_, Err(other)) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);

    let winner = &winners[0];
    assert!(app.state.accounts.login("racer", winner).await.is_ok());
    assert!(app.state.accounts.login("racer", "start-pw").await.is_err());
    for attempt in 0..6 {
        let loser = format!("next-pw-{attempt}");
        if &loser != winner {
            assert!(app.state.accounts.login("racer", &loser).await.is_err());
        }
    }
}

#[tokio::test]
async fn logout_revokes_the_presented_token() {
    let app = TestApp::new();
    let token = app.user_token("carol", "carol-pw").await;

    assert_eq!(
        app.get("/api/user/profile", Some(&token)).await.status,
        StatusCode::OK
    );

    let logout = app
        .send(Method::POST, "/api/auth/logout", Some(&token), None)
        .await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    assert_eq!(app.state.denylist.len(), 1);

    let after = app.get("/api/user/profile", Some(&token)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    assert_eq!(after.error_code(), Some("unauthenticated"));

    let fresh = app.token_for("carol", "carol-pw").await;
    assert_eq!(
        app.get("/api/user/profile", Some(&fresh)).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn logout_without_token_is_unauthorized() {
    let app = TestApp::new();
    let response = app.send(Method::POST, "/api/auth/logout", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers.get("www-authenticate").map(|v| v.as_bytes()),
        Some(&b"Bearer"[..])
    );
}

#[tokio::test]
async fn profile_update_and_password_change() {
    let app = TestApp::new();
    app.register("dana", "dana@x.com", "dana-pw").await;
    app.register("erin", "erin@x.com", "erin-pw").await;
    let token = app.token_for("dana", "dana-pw").await;

    let taken = app
        .send(
            Method::PUT,
            "/api/user/profile",
            Some(&token),
            Some(json!({ "email": "ERIN@x.com" })),
        )
        .await;
    assert_eq!(taken.status, StatusCode::BAD_REQUEST);
    assert_eq!(taken.error_code(), Some("email_taken"));

    let updated = app
        .send(
            Method::PUT,
            "/api/user/profile",
            Some(&token),
            Some(json!({ "email": "Dana.New@x.com" })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["email"], "dana.new@x.com");

    let wrong = app
        .send(
            Method::POST,
            "/api/user/password",
            Some(&token),
            Some(json!({ "current_password": "nope", "new_password": "dana-pw-2" })),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong.error_code(), Some("invalid_credentials"));

    let changed = app
        .send(
            Method::POST,
            "/api/user/password",
            Some(&token),
            Some(json!({ "current_password": "dana-pw", "new_password": "dana-pw-2" })),
        )
        .await;
    assert_eq!(changed.status, StatusCode::NO_CONTENT);
    assert_eq!(app.login("dana", "dana-pw").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.login("dana", "dana-pw-2").await.status, StatusCode::OK);
}

#[tokio::test]
async fn availability_checks_are_public() {
    let app = TestApp::new();
    app.register("frank", "frank@x.com", "frank-pw").await;

    let response = app
        .get("/api/public/users/available?username=frank&email=new@x.com", None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "username_available": false, "email_available": true })
    );

    let empty = app.get("/api/public/users/available", None).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.error_code(), Some("missing_query"));
}

#[tokio::test]
async fn admin_manages_users() {
    let app = TestApp::new();
    let admin = app.admin_token("root", "root-pw").await;
    app.register("gina", "gina@x.com", "gina-pw").await;

    let promoted = app
        .send(
            Method::PUT,
            "/api/admin/users/gina/role",
            Some(&admin),
            Some(json!({ "role": "ROLE_ADMIN" })),
        )
        .await;
    assert_eq!(promoted.status, StatusCode::OK);
    assert_eq!(promoted.json()["role"], "ADMIN");

    let bogus = app
        .send(
            Method::PUT,
            "/api/admin/users/gina/role",
            Some(&admin),
            Some(json!({ "role": "OWNER" })),
        )
        .await;
    assert_eq!(bogus.error_code(), Some("invalid_role"));

    let missing = app
        .send(
            Method::PUT,
            "/api/admin/users/ghost/role",
            Some(&admin),
            Some(json!({ "role": "USER" })),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let own = app
        .send(Method::DELETE, "/api/admin/users/root", Some(&admin), None)
        .await;
    assert_eq!(own.status, StatusCode::BAD_REQUEST);
    assert_eq!(own.error_code(), Some("cannot_delete_self"));

    let deleted = app
        .send(Method::DELETE, "/api/admin/users/gina", Some(&admin), None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(app.login("gina", "gina-pw").await.status, StatusCode::BAD_REQUEST);
}

fn bearer(token: &str) -> axum::http::HeaderMap {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {token}").parse().expect("header value"),
    );
    headers
}
