use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::expense::{ApprovalRecord, Decision};
use crate::domain::rule::{ApprovalRuleSet, RuleType};
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionReason {
    /// Sequential rules only complete by exhausting their step chain.
    SequentialExhaustionOnly,
    NoVotesCast,
    ThresholdNotMet { approvals: usize, votes: usize },
    ThresholdMet { approvals: usize, votes: usize },
    SpecificApproverMatched { approver: UserId },
    NoSpecificApproval,
    NeitherHybridConditionMet,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub complete: bool,
    pub reason: CompletionReason,
}

impl Completion {
    fn complete(reason: CompletionReason) -> Self {
        Self { complete: true, reason }
    }

    fn incomplete(reason: CompletionReason) -> Self {
        Self { complete: false, reason }
    }
}

/// Pure evaluation of a rule set's completion condition against the votes
/// cast so far. Sequential advancement itself is the engine's job; this only
/// answers "is the workflow complete right now".
pub fn evaluate(rules: &ApprovalRuleSet, history: &[ApprovalRecord]) -> Completion {
    match rules.rule_type {
        RuleType::Sequential => Completion::incomplete(CompletionReason::SequentialExhaustionOnly),
        RuleType::Percentage => evaluate_percentage(rules, history),
        RuleType::Specific => evaluate_specific(rules, history),
        RuleType::Hybrid => {
            let percentage = evaluate_percentage(rules, history);
            if percentage.complete {
                return percentage;
            }
            let specific = evaluate_specific(rules, history);
            if specific.complete {
                return specific;
            }
            Completion::incomplete(CompletionReason::NeitherHybridConditionMet)
        }
    }
}

fn evaluate_percentage(rules: &ApprovalRuleSet, history: &[ApprovalRecord]) -> Completion {
    let votes = history.len();
    if votes == 0 {
        return Completion::incomplete(CompletionReason::NoVotesCast);
    }

    // Rejections stay in the denominator; they lower the ratio but are never
    // removed from the vote total.
    let approvals =
        history.iter().filter(|record| record.decision == Decision::Approved).count();
    let Some(threshold) = rules.percentage_threshold else {
        return Completion::incomplete(CompletionReason::ThresholdNotMet { approvals, votes });
    };

    // approvals / votes * 100 >= threshold, kept in integer-exact Decimal form.
    let reached = Decimal::from(approvals as u64 * 100) >= threshold * Decimal::from(votes as u64);
    if reached {
        Completion::complete(CompletionReason::ThresholdMet { approvals, votes })
    } else {
        Completion::incomplete(CompletionReason::ThresholdNotMet { approvals, votes })
    }
}

fn evaluate_specific(rules: &ApprovalRuleSet, history: &[ApprovalRecord]) -> Completion {
    let matched = history.iter().find(|record| {
        record.decision == Decision::Approved && rules.specific_approvers.contains(&record.approver)
    });

    match matched {
        Some(record) => Completion::complete(CompletionReason::SpecificApproverMatched {
            approver: record.approver.clone(),
        }),
        None => Completion::incomplete(CompletionReason::NoSpecificApproval),
    }
}
