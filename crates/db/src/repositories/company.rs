use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use claimly_core::domain::company::{Company, CompanyId};

use super::{CompanyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCompanyRepository {
    pool: DbPool,
}

impl SqlCompanyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CompanyRepository for SqlCompanyRepository {
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, reporting_currency, created_at
             FROM company
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(company_from_row).transpose()
    }

    async fn save(&self, company: Company) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO company (id, name, reporting_currency, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                reporting_currency = excluded.reporting_currency",
        )
        .bind(&company.id.0)
        .bind(&company.name)
        .bind(&company.reporting_currency)
        .bind(company.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn company_from_row(row: SqliteRow) -> Result<Company, RepositoryError> {
    Ok(Company {
        id: CompanyId(row.try_get("id")?),
        name: row.try_get("name")?,
        reporting_currency: row.try_get("reporting_currency")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
