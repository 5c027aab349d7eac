use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account status stored in the `estado` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i16", into = "i16")]
pub enum UserStatus {
    Active,
    Inactive,
    /// Any code other than 1 or 2. Kept so the row still loads.
    Unknown(i16),
}

impl UserStatus {
    pub fn code(self) -> i16 {
        match self {
            UserStatus::Active => 1,
            UserStatus::Inactive => 2,
            UserStatus::Unknown(code) => code,
        }
    }

    /// Label shown next to the account; unknown codes render as "".
    pub fn label(self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVO",
            UserStatus::Inactive => "INACTIVO",
            UserStatus::Unknown(_) => "",
        }
    }
}

impl From<i16> for UserStatus {
    fn from(code: i16) -> Self {
        match code {
            1 => UserStatus::Active,
            2 => UserStatus::Inactive,
            other => UserStatus::Unknown(other),
        }
    }
}

impl From<UserStatus> for i16 {
    fn from(status: UserStatus) -> Self {
        status.code()
    }
}

/// Raw row of the `usuarios` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i32,
    pub nombre: String,
    pub password_hash: String,
    pub correo_electronico: String,
    pub estado: i16,
}

/// A staff account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string
    pub status: UserStatus,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            name: r.nombre,
            email: r.correo_electronico,
            password_hash: r.password_hash,
            status: r.estado.into(),
        }
    }
}

/// Input for `CredentialStore::create`; carries the plaintext password.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub status: UserStatus,
}

/// What the repository inserts: the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUserRow {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub status: UserStatus,
}

/// Login attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}
