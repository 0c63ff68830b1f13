use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use claimly_core::domain::company::{Company, CompanyId};
use claimly_core::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use claimly_core::domain::rule::ApprovalRuleSet;
use claimly_core::domain::user::{User, UserId};

use super::{
    CompanyRepository, ExpenseRepository, RepositoryError, RuleRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryCompanyRepository {
    companies: RwLock<HashMap<String, Company>>,
}

#[async_trait::async_trait]
impl CompanyRepository for InMemoryCompanyRepository {
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id.0).cloned())
    }

    async fn save(&self, company: Company) -> Result<(), RepositoryError> {
        let mut companies = self.companies.write().await;
        companies.insert(company.id.0.clone(), company);
        Ok(())
    }
}

/// Users are kept in a BTreeMap so `list_by_company` returns them in
/// ascending id order, matching the SQL repository's `ORDER BY id`.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<BTreeMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn list_by_company(&self, company_id: &CompanyId) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().filter(|user| user.company_id == *company_id).cloned().collect())
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<HashMap<String, ApprovalRuleSet>>,
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn find_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalRuleSet>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&company_id.0).cloned())
    }

    async fn save(&self, rules: ApprovalRuleSet) -> Result<(), RepositoryError> {
        let mut stored = self.rules.write().await;
        stored.insert(rules.company_id.0.clone(), rules);
        Ok(())
    }
}

/// Mirrors the SQL repository's compare-and-swap contract, including the
/// conflict error, so service tests exercise the same failure path.
#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<BTreeMap<String, Expense>>,
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn insert(&self, expense: &Expense) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.0.clone(), expense.clone());
        Ok(())
    }

    async fn update(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let mut expenses = self.expenses.write().await;
        match expenses.get(&expense.id.0) {
            Some(stored) if stored.version == expected_version => {
                expenses.insert(expense.id.0.clone(), expense.clone());
                Ok(())
            }
            _ => Err(RepositoryError::VersionConflict {
                expense_id: expense.id.0.clone(),
                expected: expected_version,
            }),
        }
    }

    async fn find_by_id(&self, id: &ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id.0).cloned())
    }

    async fn list_pending_for_approver(
        &self,
        approver: &UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses
            .values()
            .filter(|expense| {
                expense.is_pending() && expense.current_approver.as_ref() == Some(approver)
            })
            .cloned()
            .collect())
    }

    async fn list_pending_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses
            .values()
            .filter(|expense| expense.is_pending() && expense.company_id == *company_id)
            .cloned()
            .collect())
    }

    async fn list_for_employee(
        &self,
        employee_id: &UserId,
        status: Option<ExpenseStatus>,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses
            .values()
            .filter(|expense| expense.employee_id == *employee_id)
            .filter(|expense| status.map_or(true, |wanted| expense.status == wanted))
            .cloned()
            .collect())
    }
}
