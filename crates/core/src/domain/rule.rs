use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::company::CompanyId;
use crate::domain::user::{Role, UserId};

/// How an expense workflow decides it is complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Complete only when the last step has approved.
    Sequential,
    /// Complete once approvals among cast votes reach the threshold.
    Percentage,
    /// Complete as soon as any designated approver approves.
    Specific,
    /// Percentage OR Specific, whichever is satisfied first.
    Hybrid,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Percentage => "percentage",
            Self::Specific => "specific",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sequential" => Some(Self::Sequential),
            "percentage" => Some(Self::Percentage),
            "specific" => Some(Self::Specific),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// Who must approve at a given step. The submitter's personal manager is a
/// distinct variant, not a lookup on `Role::Manager`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepApprover {
    Manager,
    Role { role: Role },
}

impl StepApprover {
    /// Store encoding. The sentinel is spelled out so it cannot collide with
    /// the string form of `Role::Manager`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "submitter_manager",
            Self::Role { role } => role.as_str(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value == "submitter_manager" {
            return Some(Self::Manager);
        }
        value.parse::<Role>().ok().map(|role| Self::Role { role })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub number: u32,
    pub approver: StepApprover,
}

/// A company's approval configuration. Step numbers form a dense 1-based
/// sequence; the engine treats the absence of step `current + 1` as workflow
/// completion, so gaps would silently truncate the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRuleSet {
    pub company_id: CompanyId,
    pub rule_type: RuleType,
    pub percentage_threshold: Option<Decimal>,
    pub specific_approvers: Vec<UserId>,
    pub steps: Vec<ApprovalStep>,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuleSetError {
    #[error("step numbers must form a dense 1-based sequence; expected {expected}, found {found}")]
    NonContiguousSteps { expected: u32, found: u32 },
    #[error("percentage threshold is required for {rule_type:?} rules")]
    MissingPercentageThreshold { rule_type: RuleType },
    #[error("percentage threshold must be within (0, 100], found {found}")]
    ThresholdOutOfRange { found: Decimal },
    #[error("at least one specific approver is required for {rule_type:?} rules")]
    MissingSpecificApprovers { rule_type: RuleType },
}

impl ApprovalRuleSet {
    /// Sequential rule set over the given chain, numbered from 1.
    pub fn sequential(company_id: CompanyId, approvers: Vec<StepApprover>) -> Self {
        let steps = approvers
            .into_iter()
            .enumerate()
            .map(|(index, approver)| ApprovalStep { number: index as u32 + 1, approver })
            .collect();

        Self {
            company_id,
            rule_type: RuleType::Sequential,
            percentage_threshold: None,
            specific_approvers: Vec::new(),
            steps,
        }
    }

    pub fn step(&self, number: u32) -> Option<&ApprovalStep> {
        self.steps.iter().find(|step| step.number == number)
    }

    pub fn validate(&self) -> Result<(), RuleSetError> {
        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.number != expected {
                return Err(RuleSetError::NonContiguousSteps { expected, found: step.number });
            }
        }

        if matches!(self.rule_type, RuleType::Percentage | RuleType::Hybrid) {
            let threshold = self.percentage_threshold.ok_or(
                RuleSetError::MissingPercentageThreshold { rule_type: self.rule_type },
            )?;
            if threshold <= Decimal::ZERO || threshold > Decimal::from(100) {
                return Err(RuleSetError::ThresholdOutOfRange { found: threshold });
            }
        }

        if matches!(self.rule_type, RuleType::Specific | RuleType::Hybrid)
            && self.specific_approvers.is_empty()
        {
            return Err(RuleSetError::MissingSpecificApprovers { rule_type: self.rule_type });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ApprovalRuleSet, ApprovalStep, RuleSetError, RuleType, StepApprover};
    use crate::domain::company::CompanyId;
    use crate::domain::user::{Role, UserId};

    fn company() -> CompanyId {
        CompanyId("co-1".to_string())
    }

    #[test]
    fn sequential_constructor_numbers_steps_from_one() {
        let rules = ApprovalRuleSet::sequential(
            company(),
            vec![StepApprover::Manager, StepApprover::Role { role: Role::Finance }],
        );

        assert_eq!(rules.steps.len(), 2);
        assert_eq!(rules.steps[0].number, 1);
        assert_eq!(rules.steps[1].number, 2);
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn step_lookup_is_by_exact_number() {
        let rules = ApprovalRuleSet::sequential(
            company(),
            vec![StepApprover::Manager, StepApprover::Role { role: Role::Finance }],
        );

        assert_eq!(rules.step(2).map(|s| s.approver), Some(StepApprover::Role { role: Role::Finance }));
        assert!(rules.step(3).is_none());
    }

    #[test]
    fn gap_in_step_numbers_fails_validation() {
        let rules = ApprovalRuleSet {
            company_id: company(),
            rule_type: RuleType::Sequential,
            percentage_threshold: None,
            specific_approvers: Vec::new(),
            steps: vec![
                ApprovalStep { number: 1, approver: StepApprover::Manager },
                ApprovalStep { number: 3, approver: StepApprover::Role { role: Role::Finance } },
            ],
        };

        assert_eq!(
            rules.validate(),
            Err(RuleSetError::NonContiguousSteps { expected: 2, found: 3 })
        );
    }

    #[test]
    fn percentage_rule_requires_threshold_in_range() {
        let mut rules = ApprovalRuleSet::sequential(company(), vec![StepApprover::Manager]);
        rules.rule_type = RuleType::Percentage;

        assert_eq!(
            rules.validate(),
            Err(RuleSetError::MissingPercentageThreshold { rule_type: RuleType::Percentage })
        );

        rules.percentage_threshold = Some(Decimal::from(150));
        assert_eq!(
            rules.validate(),
            Err(RuleSetError::ThresholdOutOfRange { found: Decimal::from(150) })
        );

        rules.percentage_threshold = Some(Decimal::from(60));
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn hybrid_rule_requires_specific_approvers() {
        let mut rules = ApprovalRuleSet::sequential(company(), vec![StepApprover::Manager]);
        rules.rule_type = RuleType::Hybrid;
        rules.percentage_threshold = Some(Decimal::from(60));

        assert_eq!(
            rules.validate(),
            Err(RuleSetError::MissingSpecificApprovers { rule_type: RuleType::Hybrid })
        );

        rules.specific_approvers = vec![UserId("usr-director".to_string())];
        assert!(rules.validate().is_ok());
    }
}
