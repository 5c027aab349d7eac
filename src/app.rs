use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::state::AppState;
use crate::users::{NewUser, UserStatus};
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

/// Create the configured admin account unless its email is already taken.
pub async fn bootstrap_admin(state: &AppState) -> anyhow::Result<()> {
    let Some(seed) = state.config.admin.clone() else {
        return Ok(());
    };
    let res = state
        .store
        .create(NewUser {
            name: seed.name,
            email: seed.email,
            password: seed.password,
            status: UserStatus::Active,
        })
        .await;
    match res {
        Ok(admin) => info!(user_id = admin.id, email = %admin.email, "admin user bootstrapped"),
        Err(e) if e.is_unique_violation() => debug!("admin user already present"),
        Err(e) => return Err(e).context("create admin user"),
    }
    Ok(())
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{AdminSeed, AppConfig};
    use crate::state::fake;
    use crate::users::Credentials;

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    async fn seed(state: &AppState, email: &str, password: &str, status: UserStatus) -> i32 {
        state
            .store
            .create(NewUser {
                name: "Recepcion".into(),
                email: email.into(),
                password: password.into(),
                status,
            })
            .await
            .unwrap()
            .id
    }

    async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
        call(
            app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn access_token(app: &Router, email: &str, password: &str) -> String {
        let (status, body) = login(app, email, password).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (state, _) = fake::state();
        let app = build_app(state);
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn login_returns_tokens_and_me_works() {
        let (state, _) = fake::state();
        let id = seed(&state, "admin@gmail.com", "12345", UserStatus::Active).await;
        let app = build_app(state);

        let (status, body) = login(&app, "admin@gmail.com", "12345").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], id);
        assert_eq!(body["user"]["status_label"], "ACTIVO");
        assert!(body["user"].get("password_hash").is_none());
        let token = body["access_token"].as_str().unwrap();

        let (status, me) = call(&app, Method::GET, "/api/v1/me", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "admin@gmail.com");
    }

    #[tokio::test]
    async fn failed_logins_are_indistinguishable() {
        let (state, _) = fake::state();
        seed(&state, "a@example.com", "right", UserStatus::Active).await;
        seed(&state, "off@example.com", "right", UserStatus::Inactive).await;
        let app = build_app(state);

        let wrong = login(&app, "a@example.com", "wrong").await;
        let unknown = login(&app, "nobody@example.com", "right").await;
        let inactive = login(&app, "off@example.com", "right").await;
        assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, unknown);
        assert_eq!(wrong, inactive);
    }

    #[tokio::test]
    async fn login_with_blank_email_is_bad_request() {
        let (state, _) = fake::state();
        let app = build_app(state);
        let (status, _) = login(&app, "  ", "pw").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn user_routes_require_access_token() {
        let (state, _) = fake::state();
        seed(&state, "a@example.com", "pw", UserStatus::Active).await;
        let app = build_app(state);

        let (status, _) = call(&app, Method::GET, "/api/v1/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, body) = login(&app, "a@example.com", "pw").await;
        let refresh = body["refresh_token"].as_str().unwrap();
        let (status, body) = call(&app, Method::GET, "/api/v1/users", Some(refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, Value::String("Access token required".into()));
    }

    #[tokio::test]
    async fn user_crud_over_http() {
        let (state, _) = fake::state();
        seed(&state, "admin@gmail.com", "12345", UserStatus::Active).await;
        let app = build_app(state);
        let token = access_token(&app, "admin@gmail.com", "12345").await;
        let t = Some(token.as_str());

        let (status, created) = call(
            &app,
            Method::POST,
            "/api/v1/users",
            t,
            Some(json!({ "name": "TestUsuario", "email": "test7@example.com", "password": "password", "status": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], 2);
        assert_eq!(created["status_label"], "INACTIVO");
        let id = created["id"].as_i64().unwrap();
        let user_uri = format!("/api/v1/users/{}", id);

        let (status, found) = call(&app, Method::GET, "/api/v1/users?q=testusu", t, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found.as_array().unwrap().len(), 1);

        let (status, updated) = call(
            &app,
            Method::PUT,
            &user_uri,
            t,
            Some(json!({ "name": "TestUsuario_u", "email": "utest7@example.com", "status": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "TestUsuario_u");
        assert_eq!(updated["status"], 1);

        let (status, _) = login(&app, "utest7@example.com", "password").await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("{}/password", user_uri),
            t,
            Some(json!({ "password": "new_password" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(login(&app, "utest7@example.com", "password").await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(login(&app, "utest7@example.com", "new_password").await.0, StatusCode::OK);

        let (status, _) = call(&app, Method::DELETE, &user_uri, t, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, &user_uri, t, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, &user_uri, t, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_with_bad_email_is_rejected() {
        let (state, repo) = fake::state();
        seed(&state, "admin@gmail.com", "12345", UserStatus::Active).await;
        let app = build_app(state);
        let token = access_token(&app, "admin@gmail.com", "12345").await;
        let calls_before = repo.call_count();

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(token.as_str()),
            Some(json!({ "name": "X", "email": "nope", "password": "pw", "status": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, Value::String("invalid email".into()));
        assert_eq!(repo.call_count(), calls_before);
    }

    #[tokio::test]
    async fn refresh_stops_working_once_deactivated() {
        let (state, _) = fake::state();
        let store = state.store.clone();
        let id = seed(&state, "r@example.com", "pw", UserStatus::Active).await;
        let app = build_app(state);

        let (_, body) = login(&app, "r@example.com", "pw").await;
        let refresh = json!({ "refresh_token": body["refresh_token"] });

        let (status, renewed) =
            call(&app, Method::POST, "/api/v1/auth/refresh", None, Some(refresh.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renewed["user"]["id"], id);

        let mut user = store.get_by_id(id).await.unwrap().unwrap();
        user.status = UserStatus::Inactive;
        assert!(store.update(&user).await.unwrap());

        let (status, _) = call(&app, Method::POST, "/api/v1/auth/refresh", None, Some(refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn change_own_password_checks_current_one() {
        let (state, _) = fake::state();
        seed(&state, "me@example.com", "old", UserStatus::Active).await;
        let app = build_app(state);
        let token = access_token(&app, "me@example.com", "old").await;

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v1/me/password",
            Some(token.as_str()),
            Some(json!({ "current_password": "guess", "new_password": "new" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v1/me/password",
            Some(token.as_str()),
            Some(json!({ "current_password": "old", "new_password": "new" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(login(&app, "me@example.com", "new").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn bootstrap_admin_creates_active_account() {
        let (mut state, _) = fake::state();
        bootstrap_admin(&state).await.unwrap();
        assert!(state.store.search("").await.unwrap().is_empty());

        state.config = Arc::new(AppConfig {
            admin: Some(AdminSeed {
                name: "admin".into(),
                email: "Admin@Gmail.com".into(),
                password: "12345".into(),
            }),
            ..(*state.config).clone()
        });
        bootstrap_admin(&state).await.unwrap();

        let admin = state
            .store
            .authenticate(&Credentials {
                email: "admin@gmail.com".into(),
                password: "12345".into(),
            })
            .await
            .unwrap()
            .expect("admin can log in");
        assert_eq!(admin.status, UserStatus::Active);

        bootstrap_admin(&state).await.unwrap();
        assert_eq!(state.store.search("").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (state, _) = fake::state();
        seed(&state, "admin@gmail.com", "12345", UserStatus::Active).await;
        let app = build_app(state);
        let token = access_token(&app, "admin@gmail.com", "12345").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(token.as_str()),
            Some(json!({ "name": "Copy", "email": "ADMIN@gmail.com", "password": "pw", "status": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, Value::String("Email already registered".into()));

        let (status, created) = call(
            &app,
            Method::POST,
            "/api/v1/users",
            Some(token.as_str()),
            Some(json!({ "name": "Other", "email": "other@gmail.com", "password": "pw", "status": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/v1/users/{}", created["id"]);
        let (status, _) = call(
            &app,
            Method::PUT,
            &uri,
            Some(token.as_str()),
            Some(json!({ "name": "Other", "email": "admin@gmail.com", "status": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
