use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One vote in an expense's audit trail. Records are append-only: the engine
/// pushes one per decision and nothing ever removes or reorders them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approver: UserId,
    pub decision: Decision,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Submission input, before the workflow engine has accepted it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
}

/// The routed entity. `company_id` and `employee_id` are immutable after
/// creation; everything else is mutated only by the workflow engine.
/// `version` backs the store's compare-and-swap: every persisted update must
/// carry the version it read, and a mismatch aborts the write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub company_id: CompanyId,
    pub employee_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
    pub status: ExpenseStatus,
    pub current_step: u32,
    pub current_approver: Option<UserId>,
    pub history: Vec<ApprovalRecord>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, ExpenseStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::ExpenseStatus;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!ExpenseStatus::Pending.is_terminal());
        assert!(ExpenseStatus::Approved.is_terminal());
        assert!(ExpenseStatus::Rejected.is_terminal());
    }
}
