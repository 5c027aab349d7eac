use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use super::error::StoreError;
use super::password::{hash_password, verify_against_dummy, verify_password};
use super::repo::UserRepository;
use super::repo_types::{Credentials, NewUser, NewUserRow, User, UserStatus};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn checked_email(email: &str) -> Result<String, StoreError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(StoreError::validation("email is required"));
    }
    if !is_valid_email(&email) {
        return Err(StoreError::validation("invalid email"));
    }
    Ok(email)
}

fn checked_name(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::validation("name is required"));
    }
    Ok(name.to_string())
}

fn checked_password(password: &str) -> Result<&str, StoreError> {
    if password.is_empty() {
        return Err(StoreError::validation("password is required"));
    }
    Ok(password)
}

/// Reads and writes staff accounts and decides who may log in.
///
/// Holds no per-call state; clones share the same repository.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn UserRepository>,
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// Insert a user with a freshly hashed password and return the stored row.
    pub async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let name = checked_name(&user.name)?;
        let email = checked_email(&user.email)?;
        let password_hash = hash_password(checked_password(&user.password)?)?;

        let id = self
            .repo
            .insert(&NewUserRow {
                name,
                email,
                password_hash,
                status: user.status,
            })
            .await?;

        let created = self.repo.find_by_id(id).await?.ok_or(StoreError::Storage {
            context: "re-read created user",
            source: sqlx::Error::RowNotFound,
        })?;
        info!(user_id = created.id, email = %created.email, "user created");
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        self.repo.find_by_id(id).await
    }

    /// Users whose name contains `fragment` as given, ignoring case. Empty matches everyone.
    pub async fn search(&self, fragment: &str) -> Result<Vec<User>, StoreError> {
        let users = self.repo.search_by_name(fragment).await?;
        debug!(fragment, found = users.len(), "user search");
        Ok(users)
    }

    /// Overwrite name, email and status. `Ok(false)` when the id is unknown.
    pub async fn update(&self, user: &User) -> Result<bool, StoreError> {
        let updated = User {
            id: user.id,
            name: checked_name(&user.name)?,
            email: checked_email(&user.email)?,
            password_hash: String::new(),
            status: user.status,
        };
        let ok = self.repo.update(&updated).await?;
        if ok {
            info!(user_id = user.id, status = user.status.label(), "user updated");
        }
        Ok(ok)
    }

    /// Replace the stored hash with one computed from `password`.
    pub async fn update_password(&self, id: i32, password: &str) -> Result<bool, StoreError> {
        let password_hash = hash_password(checked_password(password)?)?;
        let ok = self.repo.update_password_hash(id, &password_hash).await?;
        if ok {
            info!(user_id = id, "password changed");
        }
        Ok(ok)
    }

    pub async fn delete(&self, id: i32) -> Result<bool, StoreError> {
        let ok = self.repo.delete(id).await?;
        if ok {
            info!(user_id = id, "user deleted");
        }
        Ok(ok)
    }

    /// `Some(user)` only for an active account whose password verifies.
    ///
    /// Unknown email, inactive account and wrong password all give `Ok(None)`,
    /// and each of them costs exactly one Argon2 verify.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Option<User>, StoreError> {
        let email = normalize_email(&credentials.email);
        if email.is_empty() {
            return Err(StoreError::validation("email is required"));
        }
        checked_password(&credentials.password)?;

        let Some(user) = self.repo.find_by_email(&email).await? else {
            verify_against_dummy(&credentials.password);
            warn!(email = %email, "login unknown email");
            return Ok(None);
        };

        let password_ok = verify_password(&credentials.password, &user.password_hash)?;

        if user.status != UserStatus::Active {
            warn!(user_id = user.id, status = user.status.code(), "login on inactive account");
            return Ok(None);
        }

        if !password_ok {
            warn!(user_id = user.id, "login invalid password");
            return Ok(None);
        }

        info!(user_id = user.id, "user authenticated");
        Ok(Some(user))
    }
}
