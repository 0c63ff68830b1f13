use sqlx::{Executor, Row};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_COMPANY_ID: &str = "co-demo";

const SEED_USER_IDS: &[&str] = &["usr-ada", "usr-dana", "usr-eli", "usr-frank", "usr-mia"];

const SEED_STEP_APPROVERS: &[(i64, &str)] = &[(1, "submitter_manager"), (2, "finance")];

/// Deterministic demo dataset: one company, one user per role, and a
/// two-step manager-then-finance sequential chain.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset. Idempotent; reloading restores the canonical
    /// rows without duplicating them.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult { company_id: SEED_COMPANY_ID, user_ids: SEED_USER_IDS })
    }

    /// Verify the seeded rows against the dataset contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let company_count = sqlx::query("SELECT COUNT(*) AS count FROM company WHERE id = ?")
            .bind(SEED_COMPANY_ID)
            .fetch_one(pool)
            .await?
            .get::<i64, _>("count");
        checks.push(Check {
            name: "company row present",
            passed: company_count == 1,
            detail: format!("expected 1 company row, found {company_count}"),
        });

        let user_count =
            sqlx::query("SELECT COUNT(*) AS count FROM user_account WHERE company_id = ?")
                .bind(SEED_COMPANY_ID)
                .fetch_one(pool)
                .await?
                .get::<i64, _>("count");
        checks.push(Check {
            name: "one user per role",
            passed: user_count == SEED_USER_IDS.len() as i64,
            detail: format!("expected {} users, found {user_count}", SEED_USER_IDS.len()),
        });

        let manager_of_employee = sqlx::query(
            "SELECT manager_id FROM user_account WHERE id = 'usr-eli' AND company_id = ?",
        )
        .bind(SEED_COMPANY_ID)
        .fetch_optional(pool)
        .await?
        .and_then(|row| row.get::<Option<String>, _>("manager_id"));
        checks.push(Check {
            name: "employee reports to manager",
            passed: manager_of_employee.as_deref() == Some("usr-mia"),
            detail: format!("usr-eli manager_id is {manager_of_employee:?}"),
        });

        let steps: Vec<(i64, String)> = sqlx::query(
            "SELECT step_number, approver FROM approval_rule_step
             WHERE company_id = ? ORDER BY step_number ASC",
        )
        .bind(SEED_COMPANY_ID)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| (row.get::<i64, _>("step_number"), row.get::<String, _>("approver")))
        .collect();
        let steps_match = steps.len() == SEED_STEP_APPROVERS.len()
            && steps
                .iter()
                .zip(SEED_STEP_APPROVERS)
                .all(|((number, approver), (expected_number, expected_approver))| {
                    number == expected_number && approver == expected_approver
                });
        checks.push(Check {
            name: "approval chain is manager then finance",
            passed: steps_match,
            detail: format!("found steps {steps:?}"),
        });

        let passed = checks.iter().all(|check| check.passed);
        Ok(VerificationResult { passed, checks })
    }
}

pub struct SeedResult {
    pub company_id: &'static str,
    pub user_ids: &'static [&'static str],
}

pub struct VerificationResult {
    pub passed: bool,
    pub checks: Vec<Check>,
}

pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::DemoSeedDataset;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    #[tokio::test]
    async fn seed_load_then_verify_passes() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        DemoSeedDataset::load(&pool).await.expect("load seed");
        let verification = DemoSeedDataset::verify(&pool).await.expect("verify seed");

        assert!(
            verification.passed,
            "seed verification failed: {:?}",
            verification
                .checks
                .iter()
                .filter(|check| !check.passed)
                .map(|check| (check.name, check.detail.clone()))
                .collect::<Vec<_>>(),
        );
    }

    #[tokio::test]
    async fn seed_load_is_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        DemoSeedDataset::load(&pool).await.expect("first load");
        DemoSeedDataset::load(&pool).await.expect("second load");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify seed");
        assert!(verification.passed, "reloading the seed should not duplicate rows");
    }
}
