use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use claimly_core::domain::company::CompanyId;
use claimly_core::domain::expense::{
    ApprovalRecord, Decision, Expense, ExpenseId, ExpenseStatus,
};
use claimly_core::domain::user::UserId;

use super::company::parse_timestamp;
use super::{ExpenseRepository, RepositoryError};
use crate::DbPool;

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_with_history(&self, rows: Vec<SqliteRow>) -> Result<Vec<Expense>, RepositoryError> {
        let mut expenses = Vec::with_capacity(rows.len());
        for row in rows {
            let mut expense = expense_from_row(row)?;
            expense.history = self.load_history(&expense.id).await?;
            expenses.push(expense);
        }
        Ok(expenses)
    }

    async fn load_history(&self, id: &ExpenseId) -> Result<Vec<ApprovalRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT approver_id, decision, comment, decided_at
             FROM expense_approval
             WHERE expense_id = ?
             ORDER BY seq ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}

const EXPENSE_COLUMNS: &str = "id,
                company_id,
                employee_id,
                amount,
                currency,
                category,
                description,
                expense_date,
                status,
                current_step,
                current_approver,
                version,
                created_at,
                updated_at";

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn insert(&self, expense: &Expense) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO expense ({EXPENSE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&expense.id.0)
        .bind(&expense.company_id.0)
        .bind(&expense.employee_id.0)
        .bind(expense.amount.to_string())
        .bind(&expense.currency)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.expense_date.to_string())
        .bind(expense.status.as_str())
        .bind(i64::from(expense.current_step))
        .bind(expense.current_approver.as_ref().map(|id| id.0.as_str()))
        .bind(expense.version)
        .bind(expense.created_at.to_rfc3339())
        .bind(expense.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        write_history(&mut *tx, expense).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE expense SET
                status = ?,
                current_step = ?,
                current_approver = ?,
                version = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(expense.status.as_str())
        .bind(i64::from(expense.current_step))
        .bind(expense.current_approver.as_ref().map(|id| id.0.as_str()))
        .bind(expense.version)
        .bind(expense.updated_at.to_rfc3339())
        .bind(&expense.id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Another writer got there first (or the row is gone); either
            // way the caller must re-read and retry.
            return Err(RepositoryError::VersionConflict {
                expense_id: expense.id.0.clone(),
                expected: expected_version,
            });
        }

        sqlx::query("DELETE FROM expense_approval WHERE expense_id = ?")
            .bind(&expense.id.0)
            .execute(&mut *tx)
            .await?;
        write_history(&mut *tx, expense).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let mut expense = expense_from_row(row)?;
        expense.history = self.load_history(&expense.id).await?;
        Ok(Some(expense))
    }

    async fn list_pending_for_approver(
        &self,
        approver: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS}
             FROM expense
             WHERE current_approver = ? AND status = 'pending'
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&approver.0)
        .fetch_all(&self.pool)
        .await?;

        self.load_with_history(rows).await
    }

    async fn list_pending_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS}
             FROM expense
             WHERE company_id = ? AND status = 'pending'
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        self.load_with_history(rows).await
    }

    async fn list_for_employee(
        &self,
        employee_id: &UserId,
        status: Option<ExpenseStatus>,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let query = match status {
            Some(_) => format!(
                "SELECT {EXPENSE_COLUMNS}
                 FROM expense
                 WHERE employee_id = ? AND status = ?
                 ORDER BY created_at ASC, id ASC"
            ),
            None => format!(
                "SELECT {EXPENSE_COLUMNS}
                 FROM expense
                 WHERE employee_id = ?
                 ORDER BY created_at ASC, id ASC"
            ),
        };
        let mut rows = sqlx::query(&query).bind(&employee_id.0);
        if let Some(status) = status {
            rows = rows.bind(status.as_str());
        }
        let rows = rows.fetch_all(&self.pool).await?;

        self.load_with_history(rows).await
    }
}

async fn write_history(
    tx: &mut SqliteConnection,
    expense: &Expense,
) -> Result<(), RepositoryError> {
    for (seq, record) in expense.history.iter().enumerate() {
        sqlx::query(
            "INSERT INTO expense_approval (
                expense_id, seq, approver_id, decision, comment, decided_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.id.0)
        .bind(seq as i64)
        .bind(&record.approver.0)
        .bind(record.decision.as_str())
        .bind(record.comment.as_deref())
        .bind(record.decided_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

fn expense_from_row(row: SqliteRow) -> Result<Expense, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ExpenseStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown expense status `{status_raw}`")))?;

    let amount_raw = row.try_get::<String, _>("amount")?;
    let amount = amount_raw
        .parse::<Decimal>()
        .map_err(|_| RepositoryError::Decode(format!("invalid amount `{amount_raw}`")))?;

    let date_raw = row.try_get::<String, _>("expense_date")?;
    let expense_date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
        .map_err(|_| RepositoryError::Decode(format!("invalid expense date `{date_raw}`")))?;

    let current_step = u32::try_from(row.try_get::<i64, _>("current_step")?)
        .map_err(|_| RepositoryError::Decode("negative current_step".to_string()))?;

    Ok(Expense {
        id: ExpenseId(row.try_get("id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        employee_id: UserId(row.try_get("employee_id")?),
        amount,
        currency: row.try_get("currency")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        expense_date,
        status,
        current_step,
        current_approver: row.try_get::<Option<String>, _>("current_approver")?.map(UserId),
        history: Vec::new(),
        version: row.try_get("version")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn record_from_row(row: SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let decision_raw = row.try_get::<String, _>("decision")?;
    let decision = Decision::parse(&decision_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{decision_raw}`")))?;

    Ok(ApprovalRecord {
        approver: UserId(row.try_get("approver_id")?),
        decision,
        comment: row.try_get("comment")?,
        decided_at: parse_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use claimly_core::domain::company::{Company, CompanyId};
    use claimly_core::domain::expense::{
        ApprovalRecord, Decision, Expense, ExpenseId, ExpenseStatus,
    };
    use claimly_core::domain::user::{Role, User, UserId};

    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::{
        CompanyRepository, ExpenseRepository, RepositoryError, SqlCompanyRepository,
        SqlExpenseRepository, SqlUserRepository, UserRepository,
    };
    use crate::DbPool;

    async fn pool_with_org() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        SqlCompanyRepository::new(pool.clone())
            .save(Company {
                id: CompanyId("co-acme".to_string()),
                name: "Acme".to_string(),
                reporting_currency: "USD".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("save company");

        let users = SqlUserRepository::new(pool.clone());
        for (id, role, manager) in [
            ("usr-mia", Role::Manager, None),
            ("usr-frank", Role::Finance, None),
            ("usr-eli", Role::Employee, Some("usr-mia")),
        ] {
            users
                .save(User {
                    id: UserId(id.to_string()),
                    company_id: CompanyId("co-acme".to_string()),
                    username: id.to_string(),
                    email: format!("{id}@acme.test"),
                    password_hash: "hash".to_string(),
                    role,
                    manager_id: manager.map(|m| UserId(m.to_string())),
                    created_at: Utc::now(),
                })
                .await
                .expect("save user");
        }

        pool
    }

    fn pending_expense(id: &str) -> Expense {
        Expense {
            id: ExpenseId(id.to_string()),
            company_id: CompanyId("co-acme".to_string()),
            employee_id: UserId("usr-eli".to_string()),
            amount: Decimal::new(10750, 2),
            currency: "USD".to_string(),
            category: "Travel".to_string(),
            description: "Taxi from airport".to_string(),
            expense_date: NaiveDate::from_ymd_opt(2026, 8, 14).expect("valid date"),
            status: ExpenseStatus::Pending,
            current_step: 1,
            current_approver: Some(UserId("usr-mia".to_string())),
            history: Vec::new(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_find_round_trips_including_history() {
        let pool = pool_with_org().await;
        let repo = SqlExpenseRepository::new(pool);

        let mut expense = pending_expense("EXP-1");
        repo.insert(&expense).await.expect("insert");

        expense.history.push(ApprovalRecord {
            approver: UserId("usr-mia".to_string()),
            decision: Decision::Approved,
            comment: Some("ok".to_string()),
            decided_at: Utc::now(),
        });
        expense.current_step = 2;
        expense.current_approver = Some(UserId("usr-frank".to_string()));
        expense.version = 2;
        repo.update(&expense, 1).await.expect("update");

        let loaded = repo.find_by_id(&expense.id).await.expect("find").expect("present");
        assert_eq!(loaded.amount, expense.amount);
        assert_eq!(loaded.current_step, 2);
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].approver.0, "usr-mia");
        assert_eq!(loaded.history[0].comment.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn stale_writer_gets_a_version_conflict_and_writes_nothing() {
        let pool = pool_with_org().await;
        let repo = SqlExpenseRepository::new(pool);

        let expense = pending_expense("EXP-1");
        repo.insert(&expense).await.expect("insert");

        let mut winner = expense.clone();
        winner.status = ExpenseStatus::Rejected;
        winner.current_approver = None;
        winner.version = 2;
        repo.update(&winner, 1).await.expect("first writer wins");

        let mut loser = expense.clone();
        loser.status = ExpenseStatus::Approved;
        loser.current_step = 0;
        loser.version = 2;
        let error = repo.update(&loser, 1).await.expect_err("second writer is stale");
        assert!(matches!(error, RepositoryError::VersionConflict { expected: 1, .. }));

        let loaded = repo.find_by_id(&expense.id).await.expect("find").expect("present");
        assert_eq!(loaded.status, ExpenseStatus::Rejected, "losing write must not land");
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn listings_filter_by_approver_company_and_employee() {
        let pool = pool_with_org().await;
        let repo = SqlExpenseRepository::new(pool);

        repo.insert(&pending_expense("EXP-1")).await.expect("insert");

        let mut for_frank = pending_expense("EXP-2");
        for_frank.current_approver = Some(UserId("usr-frank".to_string()));
        repo.insert(&for_frank).await.expect("insert");

        let mut terminal = pending_expense("EXP-3");
        terminal.status = ExpenseStatus::Approved;
        terminal.current_step = 0;
        terminal.current_approver = None;
        repo.insert(&terminal).await.expect("insert");

        let for_mia = repo
            .list_pending_for_approver(&UserId("usr-mia".to_string()))
            .await
            .expect("list for approver");
        assert_eq!(for_mia.len(), 1);
        assert_eq!(for_mia[0].id.0, "EXP-1");

        let pending = repo
            .list_pending_for_company(&CompanyId("co-acme".to_string()))
            .await
            .expect("list for company");
        assert_eq!(pending.len(), 2, "terminal expenses are excluded");

        let mine = repo
            .list_for_employee(&UserId("usr-eli".to_string()), None)
            .await
            .expect("list for employee");
        assert_eq!(mine.len(), 3, "employee history includes terminal expenses");

        let mine_pending = repo
            .list_for_employee(&UserId("usr-eli".to_string()), Some(ExpenseStatus::Pending))
            .await
            .expect("filtered list for employee");
        assert_eq!(mine_pending.len(), 2, "status filter narrows the history");
    }
}
