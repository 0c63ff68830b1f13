use sqlx::{sqlite::SqliteRow, Row};

use claimly_core::domain::company::CompanyId;
use claimly_core::domain::user::{User, UserId};

use super::company::parse_timestamp;
use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, username, email, password_hash, role, manager_id, created_at
             FROM user_account
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, company_id, username, email, password_hash, role, manager_id, created_at
             FROM user_account
             WHERE company_id = ?
             ORDER BY id ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(user_from_row).collect()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_account (
                id, company_id, username, email, password_hash, role, manager_id, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                password_hash = excluded.password_hash,
                role = excluded.role,
                manager_id = excluded.manager_id",
        )
        .bind(&user.id.0)
        .bind(&user.company_id.0)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.manager_id.as_ref().map(|id| id.0.as_str()))
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn user_from_row(row: SqliteRow) -> Result<User, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = role_raw
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unknown role `{role_raw}`")))?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role,
        manager_id: row.try_get::<Option<String>, _>("manager_id")?.map(UserId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
