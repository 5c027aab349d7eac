use async_trait::async_trait;

use super::error::StoreError;
use super::repo_types::{NewUserRow, User, UserRow};
use crate::db::Connector;

/// Persistence port for staff accounts. One statement per call.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a row and return the id the database generated for it.
    async fn insert(&self, user: &NewUserRow) -> Result<i32, StoreError>;
    async fn find_by_id(&self, id: i32) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Case-insensitive substring match on the name, ordered by id.
    async fn search_by_name(&self, fragment: &str) -> Result<Vec<User>, StoreError>;
    /// Overwrite name, email and status. The hash is left alone.
    async fn update(&self, user: &User) -> Result<bool, StoreError>;
    async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<bool, StoreError>;
    async fn delete(&self, id: i32) -> Result<bool, StoreError>;
}

/// `usuarios` table over a fresh connection per call.
#[derive(Clone)]
pub struct PgUserRepository {
    connector: Connector,
}

impl PgUserRepository {
    pub fn new(connector: Connector) -> Self {
        Self { connector }
    }

    async fn connect(&self) -> Result<sqlx::PgConnection, StoreError> {
        self.connector
            .acquire()
            .await
            .map_err(StoreError::storage("connect to database"))
    }

    async fn finish<T>(
        &self,
        conn: sqlx::PgConnection,
        res: Result<T, sqlx::Error>,
        context: &'static str,
    ) -> Result<T, StoreError> {
        self.connector.release(conn).await;
        res.map_err(StoreError::storage(context))
    }
}

/// `%fragment%` with LIKE metacharacters escaped so they match literally.
pub(crate) fn like_pattern(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + 2);
    out.push('%');
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: &NewUserRow) -> Result<i32, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO usuarios (nombre, password_hash, correo_electronico, estado)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.status.code())
        .fetch_optional(&mut conn)
        .await;
        let id = self.finish(conn, res, "insert user").await?;
        // no generated id means nothing was inserted
        id.ok_or(StoreError::Storage {
            context: "insert user returned no id",
            source: sqlx::Error::RowNotFound,
        })
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, nombre, password_hash, correo_electronico, estado
            FROM usuarios
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut conn)
        .await;
        let row = self.finish(conn, res, "get user by id").await?;
        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, nombre, password_hash, correo_electronico, estado
            FROM usuarios
            WHERE correo_electronico = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&mut conn)
        .await;
        let row = self.finish(conn, res, "get user by email").await?;
        Ok(row.map(User::from))
    }

    async fn search_by_name(&self, fragment: &str) -> Result<Vec<User>, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, nombre, password_hash, correo_electronico, estado
            FROM usuarios
            WHERE nombre ILIKE $1
            ORDER BY id
            "#,
        )
        .bind(like_pattern(fragment))
        .fetch_all(&mut conn)
        .await;
        let rows = self.finish(conn, res, "search users").await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn update(&self, user: &User) -> Result<bool, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query(
            r#"
            UPDATE usuarios
            SET nombre = $1, correo_electronico = $2, estado = $3
            WHERE id = $4
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.status.code())
        .bind(user.id)
        .execute(&mut conn)
        .await;
        let done = self.finish(conn, res, "update user").await?;
        Ok(done.rows_affected() > 0)
    }

    async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<bool, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query("UPDATE usuarios SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&mut conn)
            .await;
        let done = self.finish(conn, res, "update user password").await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete(&self, id: i32) -> Result<bool, StoreError> {
        let mut conn = self.connect().await?;
        let res = sqlx::query("DELETE FROM usuarios WHERE id = $1")
            .bind(id)
            .execute(&mut conn)
            .await;
        let done = self.finish(conn, res, "delete user").await?;
        Ok(done.rows_affected() > 0)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_wraps_and_escapes() {
        assert_eq!(like_pattern(""), "%%");
        assert_eq!(like_pattern("Ana"), "%Ana%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
