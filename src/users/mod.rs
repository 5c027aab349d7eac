use crate::state::AppState;
use axum::Router;

pub mod dto;
mod error;
pub mod handlers;
mod password;
pub mod repo;
mod repo_types;
mod services;

pub use error::StoreError;
pub use repo_types::{Credentials, NewUser, User, UserStatus};
pub use services::CredentialStore;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
