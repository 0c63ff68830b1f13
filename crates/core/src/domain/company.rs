use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub String);

/// A tenant. Each company owns exactly one approval rule set, created at
/// signup, and a reporting currency used for normalized amounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub reporting_currency: String,
    pub created_at: DateTime<Utc>,
}
