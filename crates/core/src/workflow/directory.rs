use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::rule::StepApprover;
use crate::domain::user::{Role, User, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("manager not assigned")]
    ManagerNotAssigned { employee: UserId },
    #[error("no user for role {role}")]
    NoUserForRole { role: Role },
}

/// Resolves a step's approver reference to a concrete user within the
/// submitter's company.
pub trait DirectoryLookup {
    fn resolve(&self, approver: &StepApprover, submitter: &User) -> Result<User, ResolveError>;

    fn find(&self, id: &UserId) -> Option<User>;
}

/// Point-in-time snapshot of a company's members, loaded once per operation
/// so the engine itself stays synchronous. Users are kept ordered by id:
/// when several users share a role, resolution always picks the lowest id,
/// which keeps routing deterministic across stores.
#[derive(Clone, Debug, Default)]
pub struct CompanyDirectory {
    users: BTreeMap<UserId, User>,
}

impl CompanyDirectory {
    pub fn from_users(users: Vec<User>) -> Self {
        let users = users.into_iter().map(|user| (user.id.clone(), user)).collect();
        Self { users }
    }

    pub fn get(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl DirectoryLookup for CompanyDirectory {
    fn resolve(&self, approver: &StepApprover, submitter: &User) -> Result<User, ResolveError> {
        match approver {
            StepApprover::Manager => submitter
                .manager_id
                .as_ref()
                .and_then(|manager_id| self.users.get(manager_id))
                .cloned()
                .ok_or_else(|| ResolveError::ManagerNotAssigned {
                    employee: submitter.id.clone(),
                }),
            StepApprover::Role { role } => self
                .users
                .values()
                .find(|user| user.role == *role)
                .cloned()
                .ok_or(ResolveError::NoUserForRole { role: *role }),
        }
    }

    fn find(&self, id: &UserId) -> Option<User> {
        self.users.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{CompanyDirectory, DirectoryLookup, ResolveError};
    use crate::domain::company::CompanyId;
    use crate::domain::rule::StepApprover;
    use crate::domain::user::{Role, User, UserId};

    fn user(id: &str, role: Role, manager_id: Option<&str>) -> User {
        User {
            id: UserId(id.to_string()),
            company_id: CompanyId("co-1".to_string()),
            username: id.to_string(),
            email: format!("{id}@example.com"),
            password_hash: "hash".to_string(),
            role,
            manager_id: manager_id.map(|m| UserId(m.to_string())),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn manager_sentinel_resolves_to_personal_manager() {
        let directory = CompanyDirectory::from_users(vec![
            user("usr-mia", Role::Manager, None),
            user("usr-eli", Role::Employee, Some("usr-mia")),
        ]);
        let submitter = user("usr-eli", Role::Employee, Some("usr-mia"));

        let resolved = directory
            .resolve(&StepApprover::Manager, &submitter)
            .expect("manager should resolve");
        assert_eq!(resolved.id.0, "usr-mia");
    }

    #[test]
    fn manager_sentinel_without_assignment_fails() {
        let directory = CompanyDirectory::from_users(vec![user("usr-eli", Role::Employee, None)]);
        let submitter = user("usr-eli", Role::Employee, None);

        let error = directory
            .resolve(&StepApprover::Manager, &submitter)
            .expect_err("no manager assigned");
        assert_eq!(
            error,
            ResolveError::ManagerNotAssigned { employee: UserId("usr-eli".to_string()) }
        );
        assert_eq!(error.to_string(), "manager not assigned");
    }

    #[test]
    fn role_resolution_picks_lowest_user_id_among_peers() {
        let directory = CompanyDirectory::from_users(vec![
            user("usr-frank", Role::Finance, None),
            user("usr-fiona", Role::Finance, None),
            user("usr-eli", Role::Employee, None),
        ]);
        let submitter = user("usr-eli", Role::Employee, None);

        let resolved = directory
            .resolve(&StepApprover::Role { role: Role::Finance }, &submitter)
            .expect("finance should resolve");
        assert_eq!(resolved.id.0, "usr-fiona");
    }

    #[test]
    fn missing_role_reports_which_role_was_unresolvable() {
        let directory = CompanyDirectory::from_users(vec![user("usr-eli", Role::Employee, None)]);
        let submitter = user("usr-eli", Role::Employee, None);

        let error = directory
            .resolve(&StepApprover::Role { role: Role::Director }, &submitter)
            .expect_err("no director exists");
        assert_eq!(error.to_string(), "no user for role director");
    }
}
