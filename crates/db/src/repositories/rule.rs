use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use claimly_core::domain::company::CompanyId;
use claimly_core::domain::rule::{ApprovalRuleSet, ApprovalStep, RuleType, StepApprover};
use claimly_core::domain::user::UserId;

use super::{RepositoryError, RuleRepository};
use crate::DbPool;

/// A rule set spans three tables; `save` rewrites the step and specific
/// approver rows inside one transaction so readers never observe a partially
/// replaced configuration.
pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RuleRepository for SqlRuleRepository {
    async fn find_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalRuleSet>, RepositoryError> {
        let Some(header) = sqlx::query(
            "SELECT rule_type, percentage_threshold
             FROM approval_rule
             WHERE company_id = ?",
        )
        .bind(&company_id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let rule_type_raw = header.try_get::<String, _>("rule_type")?;
        let rule_type = RuleType::parse(&rule_type_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown rule type `{rule_type_raw}`")))?;
        let percentage_threshold = header
            .try_get::<Option<String>, _>("percentage_threshold")?
            .map(|raw| {
                raw.parse::<Decimal>().map_err(|_| {
                    RepositoryError::Decode(format!("invalid percentage threshold `{raw}`"))
                })
            })
            .transpose()?;

        let steps = sqlx::query(
            "SELECT step_number, approver
             FROM approval_rule_step
             WHERE company_id = ?
             ORDER BY step_number ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            let number = u32::try_from(row.try_get::<i64, _>("step_number")?).map_err(|_| {
                RepositoryError::Decode("negative step number in approval_rule_step".to_string())
            })?;
            let approver_raw = row.try_get::<String, _>("approver")?;
            let approver = StepApprover::parse(&approver_raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown step approver `{approver_raw}`"))
            })?;
            Ok(ApprovalStep { number, approver })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

        let specific_approvers = sqlx::query(
            "SELECT user_id
             FROM approval_rule_specific_approver
             WHERE company_id = ?
             ORDER BY user_id ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Ok(UserId(row.try_get("user_id")?)))
        .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Some(ApprovalRuleSet {
            company_id: company_id.clone(),
            rule_type,
            percentage_threshold,
            specific_approvers,
            steps,
        }))
    }

    async fn save(&self, rules: ApprovalRuleSet) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO approval_rule (company_id, rule_type, percentage_threshold, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(company_id) DO UPDATE SET
                rule_type = excluded.rule_type,
                percentage_threshold = excluded.percentage_threshold,
                updated_at = excluded.updated_at",
        )
        .bind(&rules.company_id.0)
        .bind(rules.rule_type.as_str())
        .bind(rules.percentage_threshold.map(|threshold| threshold.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM approval_rule_step WHERE company_id = ?")
            .bind(&rules.company_id.0)
            .execute(&mut *tx)
            .await?;
        for step in &rules.steps {
            sqlx::query(
                "INSERT INTO approval_rule_step (company_id, step_number, approver)
                 VALUES (?, ?, ?)",
            )
            .bind(&rules.company_id.0)
            .bind(i64::from(step.number))
            .bind(step.approver.as_str())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM approval_rule_specific_approver WHERE company_id = ?")
            .bind(&rules.company_id.0)
            .execute(&mut *tx)
            .await?;
        for user_id in &rules.specific_approvers {
            sqlx::query(
                "INSERT INTO approval_rule_specific_approver (company_id, user_id)
                 VALUES (?, ?)",
            )
            .bind(&rules.company_id.0)
            .bind(&user_id.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use claimly_core::domain::company::{Company, CompanyId};
    use claimly_core::domain::rule::{ApprovalRuleSet, RuleType, StepApprover};
    use claimly_core::domain::user::{Role, UserId};

    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::{
        CompanyRepository, RuleRepository, SqlCompanyRepository, SqlRuleRepository,
    };
    use crate::DbPool;

    async fn pool_with_company() -> DbPool {
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

        pool
    }

    #[tokio::test]
    async fn hybrid_rule_set_round_trips() {
        let pool = pool_with_company().await;
        let repo = SqlRuleRepository::new(pool);

        let mut rules = ApprovalRuleSet::sequential(
            CompanyId("co-acme".to_string()),
            vec![StepApprover::Manager, StepApprover::Role { role: Role::Finance }],
        );
        rules.rule_type = RuleType::Hybrid;
        rules.percentage_threshold = Some(Decimal::from(60));
        rules.specific_approvers = vec![UserId("usr-dana".to_string())];

        repo.save(rules.clone()).await.expect("save");
        let loaded = repo
            .find_by_company(&CompanyId("co-acme".to_string()))
            .await
            .expect("find")
            .expect("present");

        assert_eq!(loaded, rules);
    }

    #[tokio::test]
    async fn saving_again_replaces_the_step_chain() {
        let pool = pool_with_company().await;
        let repo = SqlRuleRepository::new(pool);

        let first = ApprovalRuleSet::sequential(
            CompanyId("co-acme".to_string()),
            vec![
                StepApprover::Manager,
                StepApprover::Role { role: Role::Finance },
                StepApprover::Role { role: Role::Director },
            ],
        );
        repo.save(first).await.expect("save first");

        let second = ApprovalRuleSet::sequential(
            CompanyId("co-acme".to_string()),
            vec![StepApprover::Manager],
        );
        repo.save(second.clone()).await.expect("save second");

        let loaded = repo
            .find_by_company(&CompanyId("co-acme".to_string()))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(loaded, second, "old steps must not linger after a rewrite");
    }

    #[tokio::test]
    async fn missing_company_yields_none() {
        let pool = pool_with_company().await;
        let repo = SqlRuleRepository::new(pool);

        let loaded =
            repo.find_by_company(&CompanyId("co-ghost".to_string())).await.expect("find");
        assert!(loaded.is_none());
    }
}
