use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, ChangePasswordRequest, RefreshRequest},
        jwt::{AuthUser, JwtKeys},
    },
    state::AppState,
    users::{dto::PublicUser, handlers::store_error, Credentials, User, UserStatus},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/password", put(change_own_password))
}

fn invalid_credentials() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "Invalid credentials".into())
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let refresh_token = keys.sign_refresh(user.id).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let user = state
        .store
        .authenticate(&payload)
        .await
        .map_err(store_error)?
        .ok_or_else(invalid_credentials)?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    // Deleted or deactivated accounts lose their session here.
    let user = match state.store.get_by_id(claims.sub).await.map_err(store_error)? {
        Some(u) if u.status == UserStatus::Active => u,
        _ => {
            warn!(user_id = claims.sub, "refresh for missing or inactive user");
            return Err((StatusCode::UNAUTHORIZED, "User not found".into()));
        }
    };

    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state
        .store
        .get_by_id(user_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            error!(user_id, "user not found");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })?;

    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_own_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = state
        .store
        .get_by_id(user_id)
        .await
        .map_err(store_error)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    let verified = state
        .store
        .authenticate(&Credentials {
            email: user.email,
            password: payload.current_password,
        })
        .await
        .map_err(store_error)?;
    if verified.map(|u| u.id) != Some(user_id) {
        return Err(invalid_credentials());
    }

    if !state
        .store
        .update_password(user_id, &payload.new_password)
        .await
        .map_err(store_error)?
    {
        return Err((StatusCode::NOT_FOUND, "User not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}
