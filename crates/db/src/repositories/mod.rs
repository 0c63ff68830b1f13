use async_trait::async_trait;
use thiserror::Error;

use claimly_core::domain::company::{Company, CompanyId};
use claimly_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use claimly_core::domain::rule::ApprovalRuleSet;
use claimly_core::domain::user::{User, UserId};

pub mod company;
pub mod expense;
pub mod memory;
pub mod rule;
pub mod user;

pub use company::SqlCompanyRepository;
pub use expense::SqlExpenseRepository;
pub use memory::{
    InMemoryCompanyRepository, InMemoryExpenseRepository, InMemoryRuleRepository,
    InMemoryUserRepository,
};
pub use rule::SqlRuleRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("version conflict on expense `{expense_id}` (expected version {expected})")]
    VersionConflict { expense_id: String, expected: i64 },
}

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    async fn save(&self, company: Company) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    /// Ordered by ascending user id so role-based approver resolution stays
    /// deterministic across loads.
    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn find_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalRuleSet>, RepositoryError>;
    async fn save(&self, rules: ApprovalRuleSet) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn insert(&self, expense: &Expense) -> Result<(), RepositoryError>;

    /// Compare-and-swap update. `expected_version` is the version the caller
    /// read; the write applies only if the stored row still carries it, and
    /// a mismatch surfaces as `VersionConflict` with nothing written.
    async fn update(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError>;
    async fn list_pending_for_approver(
        &self,
        approver: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError>;
    async fn list_pending_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, RepositoryError>;
    /// Full submission history for an employee, optionally narrowed to one
    /// status. Terminal expenses are included.
    async fn list_for_employee(
        &self,
        employee_id: &UserId,
        status: Option<ExpenseStatus>,
    ) -> Result<Vec<Expense>, RepositoryError>;
}
