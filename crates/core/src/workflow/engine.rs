use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::expense::{
    ApprovalRecord, Decision, Expense, ExpenseDraft, ExpenseId, ExpenseStatus,
};
use crate::domain::rule::ApprovalRuleSet;
use crate::domain::user::{User, UserId};
use crate::errors::WorkflowError;
use crate::workflow::completion::{self, CompletionReason};
use crate::workflow::directory::{DirectoryLookup, ResolveError};

/// Why an expense reached Approved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalTrigger {
    AllStepsApproved,
    ThresholdMet { approvals: usize, votes: usize },
    SpecificApprover { approver: UserId },
}

/// Result of applying one decision. Every variant leaves the expense in a
/// persistable state; the caller persists exactly once afterwards. `Stalled`
/// carries the partial-progress policy: the vote is already in the history,
/// but the workflow could not advance past an unresolvable step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Advanced { step: u32, approver: UserId },
    Approved { trigger: ApprovalTrigger },
    Rejected,
    Stalled { reason: ResolveError },
}

impl DecisionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Advanced { .. } => "advanced",
            Self::Approved { .. } => "approved",
            Self::Rejected => "rejected",
            Self::Stalled { .. } => "stalled",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    /// Accept an expense draft into the workflow: validate, locate step 1,
    /// resolve its approver, and build the Pending expense. Nothing is
    /// mutated before validation passes, so a failure implies no write.
    pub fn submit<D>(
        &self,
        employee: &User,
        rules: &ApprovalRuleSet,
        draft: ExpenseDraft,
        directory: &D,
        now: DateTime<Utc>,
    ) -> Result<Expense, WorkflowError>
    where
        D: DirectoryLookup,
    {
        validate_draft(&draft)?;

        if employee.company_id != rules.company_id {
            return Err(WorkflowError::InvariantViolation(format!(
                "rule set belongs to company `{}`, employee to `{}`",
                rules.company_id.0, employee.company_id.0
            )));
        }

        if rules.steps.is_empty() {
            return Err(WorkflowError::Configuration("no workflow defined".to_owned()));
        }
        rules.validate()?;
        let first = rules
            .step(1)
            .ok_or_else(|| WorkflowError::Configuration("workflow misconfigured".to_owned()))?;

        let approver = directory
            .resolve(&first.approver, employee)
            .map_err(|error| WorkflowError::Configuration(error.to_string()))?;

        Ok(Expense {
            id: ExpenseId(format!("EXP-{}", Uuid::new_v4())),
            company_id: employee.company_id.clone(),
            employee_id: employee.id.clone(),
            amount: draft.amount,
            currency: draft.currency.trim().to_ascii_uppercase(),
            category: draft.category,
            description: draft.description,
            expense_date: draft.expense_date,
            status: ExpenseStatus::Pending,
            current_step: 1,
            current_approver: Some(approver.id),
            history: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply one approve/reject decision. Preconditions fail without
    /// mutation; once they pass, the vote is appended to the history
    /// unconditionally and the status/step transition is computed from the
    /// rule set.
    pub fn decide<D>(
        &self,
        expense: &mut Expense,
        rules: &ApprovalRuleSet,
        approver: &User,
        decision: Decision,
        comment: Option<String>,
        directory: &D,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, WorkflowError>
    where
        D: DirectoryLookup,
    {
        if expense.status.is_terminal() {
            return Err(WorkflowError::Terminal { status: expense.status });
        }
        // Identity match is the engine's own invariant check against stale
        // concurrent state; role-gated access control is the caller's job.
        let expected = expense.current_approver.clone().ok_or_else(|| {
            WorkflowError::InvariantViolation(
                "pending expense has no current approver".to_owned(),
            )
        })?;
        if expected != approver.id {
            return Err(WorkflowError::NotCurrentApprover {
                expected: expected.0,
                actual: approver.id.0.clone(),
            });
        }

        expense.history.push(ApprovalRecord {
            approver: approver.id.clone(),
            decision,
            comment,
            decided_at: now,
        });
        expense.updated_at = now;

        if decision == Decision::Rejected {
            expense.status = ExpenseStatus::Rejected;
            expense.current_approver = None;
            // current_step is left as the rejection point, distinct from the
            // step-0 completion marker.
            return Ok(DecisionOutcome::Rejected);
        }

        let completion = completion::evaluate(rules, &expense.history);
        if completion.complete {
            let trigger = match completion.reason {
                CompletionReason::ThresholdMet { approvals, votes } => {
                    ApprovalTrigger::ThresholdMet { approvals, votes }
                }
                CompletionReason::SpecificApproverMatched { approver } => {
                    ApprovalTrigger::SpecificApprover { approver }
                }
                other => {
                    return Err(WorkflowError::InvariantViolation(format!(
                        "completion evaluator returned complete with reason {other:?}"
                    )));
                }
            };
            finalize_approved(expense);
            return Ok(DecisionOutcome::Approved { trigger });
        }

        let next_number = expense.current_step + 1;
        let Some(next_step) = rules.step(next_number) else {
            // No next step: the chain is exhausted.
            finalize_approved(expense);
            return Ok(DecisionOutcome::Approved { trigger: ApprovalTrigger::AllStepsApproved });
        };

        // The next step may be a Manager sentinel, which routes through the
        // submitting employee, not the approver who just voted.
        let submitter = directory.find(&expense.employee_id).ok_or_else(|| {
            WorkflowError::InvariantViolation(format!(
                "submitter `{}` missing from directory snapshot",
                expense.employee_id.0
            ))
        })?;
        match directory.resolve(&next_step.approver, &submitter) {
            Ok(next_approver) => {
                expense.current_step = next_number;
                expense.current_approver = Some(next_approver.id.clone());
                Ok(DecisionOutcome::Advanced { step: next_number, approver: next_approver.id })
            }
            // The vote stays recorded, but state does not advance past an
            // unresolvable step; the expense remains Pending where it is.
            Err(reason) => Ok(DecisionOutcome::Stalled { reason }),
        }
    }

    pub fn submit_with_audit<D, S>(
        &self,
        employee: &User,
        rules: &ApprovalRuleSet,
        draft: ExpenseDraft,
        directory: &D,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<Expense, WorkflowError>
    where
        D: DirectoryLookup,
        S: AuditSink,
    {
        let result = self.submit(employee, rules, draft, directory, now);
        match &result {
            Ok(expense) => sink.emit(
                AuditEvent::new(
                    Some(expense.id.clone()),
                    audit.correlation_id.clone(),
                    "workflow.expense_submitted",
                    AuditCategory::Submission,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("amount", expense.amount.to_string())
                .with_metadata("currency", expense.currency.clone()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    None,
                    audit.correlation_id.clone(),
                    "workflow.submission_rejected",
                    AuditCategory::Submission,
                    audit.actor.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    pub fn decide_with_audit<D, S>(
        &self,
        expense: &mut Expense,
        rules: &ApprovalRuleSet,
        approver: &User,
        decision: Decision,
        comment: Option<String>,
        directory: &D,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<DecisionOutcome, WorkflowError>
    where
        D: DirectoryLookup,
        S: AuditSink,
    {
        let result =
            self.decide(expense, rules, approver, decision, comment, directory, now);
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::new(
                    Some(expense.id.clone()),
                    audit.correlation_id.clone(),
                    "workflow.decision_applied",
                    AuditCategory::Decision,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("decision", format!("{decision:?}"))
                .with_metadata("outcome", outcome.label()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    Some(expense.id.clone()),
                    audit.correlation_id.clone(),
                    "workflow.decision_rejected",
                    AuditCategory::Decision,
                    audit.actor.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}

fn finalize_approved(expense: &mut Expense) {
    expense.status = ExpenseStatus::Approved;
    expense.current_step = 0;
    expense.current_approver = None;
}

fn validate_draft(draft: &ExpenseDraft) -> Result<(), WorkflowError> {
    let mut fields = Vec::new();
    if draft.amount <= Decimal::ZERO {
        fields.push("amount".to_owned());
    }
    if draft.currency.trim().is_empty() {
        fields.push("currency".to_owned());
    }
    if draft.category.trim().is_empty() {
        fields.push("category".to_owned());
    }
    if draft.description.trim().is_empty() {
        fields.push("description".to_owned());
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::Validation { fields })
    }
}
