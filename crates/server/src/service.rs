use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use claimly_core::audit::{AuditContext, AuditSink};
use claimly_core::currency::{self, RateTable};
use claimly_core::domain::company::{Company, CompanyId};
use claimly_core::domain::expense::{Decision, Expense, ExpenseDraft, ExpenseId, ExpenseStatus};
use claimly_core::domain::rule::ApprovalRuleSet;
use claimly_core::domain::user::{User, UserId};
use claimly_core::errors::ApplicationError;
use claimly_core::workflow::directory::CompanyDirectory;
use claimly_core::workflow::engine::{DecisionOutcome, WorkflowEngine};
use claimly_db::repositories::{
    CompanyRepository, ExpenseRepository, RepositoryError, RuleRepository, UserRepository,
};

/// An expense alongside its value in the company's reporting currency.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseView {
    pub expense: Expense,
    pub reporting_amount: Decimal,
    pub reporting_currency: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecisionView {
    pub expense: ExpenseView,
    pub outcome: DecisionOutcome,
}

/// Application-layer orchestration: loads state, runs the pure workflow
/// engine, and persists the result exactly once per operation.
pub struct WorkflowService<C, U, R, E, S> {
    companies: Arc<C>,
    users: Arc<U>,
    rules: Arc<R>,
    expenses: Arc<E>,
    audit: Arc<S>,
    engine: WorkflowEngine,
    rates: RateTable,
}

impl<C, U, R, E, S> WorkflowService<C, U, R, E, S>
where
    C: CompanyRepository,
    U: UserRepository,
    R: RuleRepository,
    E: ExpenseRepository,
    S: AuditSink,
{
    pub fn new(
        companies: Arc<C>,
        users: Arc<U>,
        rules: Arc<R>,
        expenses: Arc<E>,
        audit: Arc<S>,
        rates: RateTable,
    ) -> Self {
        Self { companies, users, rules, expenses, audit, engine: WorkflowEngine, rates }
    }

    pub async fn submit_expense(
        &self,
        employee_id: &UserId,
        draft: ExpenseDraft,
        correlation_id: &str,
    ) -> Result<ExpenseView, ApplicationError> {
        let employee = self
            .users
            .find_by_id(employee_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "user",
                id: employee_id.0.clone(),
            })?;
        let company = self.load_company(&employee.company_id).await?;
        let rules = self.load_rules(&employee.company_id).await?;
        let directory = self.load_directory(&employee.company_id).await?;

        let expense = self.engine.submit_with_audit(
            &employee,
            &rules,
            draft,
            &directory,
            Utc::now(),
            self.audit.as_ref(),
            &AuditContext::new(None, correlation_id, employee.id.0.clone()),
        )?;
        self.expenses.insert(&expense).await.map_err(repo_error)?;

        tracing::info!(
            expense_id = %expense.id.0,
            employee_id = %employee.id.0,
            correlation_id,
            "expense submitted"
        );
        Ok(self.view(expense, &company))
    }

    /// Applies one decision under compare-and-swap. A `Stalled` outcome is
    /// persisted before it surfaces as a configuration error: the vote is
    /// part of the record even when the workflow cannot advance.
    pub async fn apply_decision(
        &self,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        decision: Decision,
        comment: Option<String>,
        correlation_id: &str,
    ) -> Result<DecisionView, ApplicationError> {
        let mut expense = self
            .expenses
            .find_by_id(expense_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "expense",
                id: expense_id.0.clone(),
            })?;
        let approver = self
            .users
            .find_by_id(approver_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "user",
                id: approver_id.0.clone(),
            })?;
        // Company context comes from the expense, not the approver.
        let company = self.load_company(&expense.company_id).await?;
        let rules = self.load_rules(&expense.company_id).await?;
        let directory = self.load_directory(&expense.company_id).await?;

        let expected_version = expense.version;
        let outcome = self.engine.decide_with_audit(
            &mut expense,
            &rules,
            &approver,
            decision,
            comment,
            &directory,
            Utc::now(),
            self.audit.as_ref(),
            &AuditContext::new(
                Some(expense_id.clone()),
                correlation_id,
                approver.id.0.clone(),
            ),
        )?;
        expense.version += 1;
        self.expenses.update(&expense, expected_version).await.map_err(repo_error)?;

        tracing::info!(
            expense_id = %expense.id.0,
            approver_id = %approver.id.0,
            outcome = outcome.label(),
            correlation_id,
            "decision applied"
        );

        if let DecisionOutcome::Stalled { reason } = &outcome {
            return Err(ApplicationError::Configuration(reason.to_string()));
        }

        Ok(DecisionView { expense: self.view(expense, &company), outcome })
    }

    /// Pending expenses visible to an approver. Admin, finance, and director
    /// roles see the whole company's queue; everyone else only what is
    /// routed to them.
    pub async fn pending_for_approver(
        &self,
        approver_id: &UserId,
    ) -> Result<Vec<ExpenseView>, ApplicationError> {
        let approver = self
            .users
            .find_by_id(approver_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "user",
                id: approver_id.0.clone(),
            })?;
        let company = self.load_company(&approver.company_id).await?;

        let expenses = if approver.role.has_company_wide_visibility() {
            self.expenses.list_pending_for_company(&approver.company_id).await
        } else {
            self.expenses.list_pending_for_approver(&approver.id).await
        }
        .map_err(repo_error)?;

        Ok(expenses.into_iter().map(|expense| self.view(expense, &company)).collect())
    }

    pub async fn expenses_for_employee(
        &self,
        employee_id: &UserId,
        status: Option<ExpenseStatus>,
    ) -> Result<Vec<ExpenseView>, ApplicationError> {
        let employee = self
            .users
            .find_by_id(employee_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "user",
                id: employee_id.0.clone(),
            })?;
        let company = self.load_company(&employee.company_id).await?;

        let expenses = self
            .expenses
            .list_for_employee(&employee.id, status)
            .await
            .map_err(repo_error)?;
        Ok(expenses.into_iter().map(|expense| self.view(expense, &company)).collect())
    }

    async fn load_company(&self, company_id: &CompanyId) -> Result<Company, ApplicationError> {
        self.companies
            .find_by_id(company_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "company",
                id: company_id.0.clone(),
            })
    }

    async fn load_rules(&self, company_id: &CompanyId) -> Result<ApprovalRuleSet, ApplicationError> {
        self.rules
            .find_by_company(company_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| {
                ApplicationError::Configuration(format!(
                    "no approval rule set configured for company `{}`",
                    company_id.0
                ))
            })
    }

    async fn load_directory(
        &self,
        company_id: &CompanyId,
    ) -> Result<CompanyDirectory, ApplicationError> {
        let staff = self.users.list_by_company(company_id).await.map_err(repo_error)?;
        Ok(CompanyDirectory::from_users(staff))
    }

    fn view(&self, expense: Expense, company: &Company) -> ExpenseView {
        let reporting_amount = currency::convert(
            expense.amount,
            &expense.currency,
            &company.reporting_currency,
            &self.rates,
        );
        ExpenseView {
            expense,
            reporting_amount,
            reporting_currency: company.reporting_currency.clone(),
        }
    }
}

fn repo_error(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::VersionConflict { expense_id, expected } => {
            ApplicationError::Conflict(format!(
                "expense `{expense_id}` was modified concurrently (expected version {expected})"
            ))
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}
