pub mod audit;
pub mod config;
pub mod currency;
pub mod domain;
pub mod errors;
pub mod workflow;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LogFormat};
pub use currency::{convert, RateTable};
pub use domain::company::{Company, CompanyId};
pub use domain::expense::{
    ApprovalRecord, Decision, Expense, ExpenseDraft, ExpenseId, ExpenseStatus,
};
pub use domain::rule::{ApprovalRuleSet, ApprovalStep, RuleSetError, RuleType, StepApprover};
pub use domain::user::{Role, User, UserId};
pub use errors::{ApplicationError, InterfaceError, WorkflowError};
pub use workflow::completion::{Completion, CompletionReason};
pub use workflow::directory::{CompanyDirectory, DirectoryLookup, ResolveError};
pub use workflow::engine::{ApprovalTrigger, DecisionOutcome, WorkflowEngine};
