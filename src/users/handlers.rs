use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{PublicUser, SearchQuery, SetPasswordRequest, UpdateUserRequest},
    NewUser, StoreError, User,
};
use crate::{auth::jwt::AuthUser, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(search_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/:id/password", put(set_password))
}

/// Maps store failures onto HTTP responses.
pub(crate) fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::Validation(msg) => {
            warn!(%msg, "rejected input");
            (StatusCode::BAD_REQUEST, msg)
        }
        e if e.is_unique_violation() => {
            warn!(error = %e, "email already registered");
            (StatusCode::CONFLICT, "Email already registered".into())
        }
        e => {
            error!(error = %e, "credential store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "User not found".into())
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<PublicUser>>, (StatusCode, String)> {
    let users = state.store.search(&query.q).await.map_err(store_error)?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    let user = state.store.create(payload).await.map_err(store_error)?;
    info!(caller, user_id = user.id, "user created over api");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<i32>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    state
        .store
        .get_by_id(id)
        .await
        .map_err(store_error)?
        .map(|u| Json(u.into()))
        .ok_or_else(not_found)
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = User {
        id,
        name: payload.name,
        email: payload.email,
        password_hash: String::new(),
        status: payload.status,
    };
    if !state.store.update(&user).await.map_err(store_error)? {
        return Err(not_found());
    }
    info!(caller, user_id = id, "user updated over api");
    state
        .store
        .get_by_id(id)
        .await
        .map_err(store_error)?
        .map(|u| Json(u.into()))
        .ok_or_else(not_found)
}

#[instrument(skip(state, payload))]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if !state
        .store
        .update_password(id, &payload.password)
        .await
        .map_err(store_error)?
    {
        return Err(not_found());
    }
    info!(caller, user_id = id, "password reset over api");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, (StatusCode, String)> {
    if !state.store.delete(id).await.map_err(store_error)? {
        return Err(not_found());
    }
    info!(caller, user_id = id, "user deleted over api");
    Ok(StatusCode::NO_CONTENT)
}
