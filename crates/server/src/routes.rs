//! JSON API routes for the expense approval workflow.
//!
//! Endpoints:
//! - `POST /expenses`                    — submit an expense for approval
//! - `POST /expenses/{id}/decision`      — record an approve/reject decision
//! - `GET  /approvers/{id}/pending`      — expenses waiting on an approver
//! - `GET  /employees/{id}/expenses`     — an employee's own submissions, optionally `?status=`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use claimly_core::currency::RateTable;
use claimly_core::domain::expense::{Decision, ExpenseDraft, ExpenseId, ExpenseStatus};
use claimly_core::domain::user::UserId;
use claimly_core::errors::{ApplicationError, InterfaceError, WorkflowError};
use claimly_core::TracingAuditSink;
use claimly_db::repositories::{
    SqlCompanyRepository, SqlExpenseRepository, SqlRuleRepository, SqlUserRepository,
};
use claimly_db::DbPool;

use crate::service::{DecisionView, ExpenseView, WorkflowService};

pub type AppService = WorkflowService<
    SqlCompanyRepository,
    SqlUserRepository,
    SqlRuleRepository,
    SqlExpenseRepository,
    TracingAuditSink,
>;

#[derive(Clone)]
pub struct ApiState {
    service: Arc<AppService>,
}

impl ApiState {
    pub fn new(pool: DbPool, rates: RateTable) -> Self {
        let service = WorkflowService::new(
            Arc::new(SqlCompanyRepository::new(pool.clone())),
            Arc::new(SqlUserRepository::new(pool.clone())),
            Arc::new(SqlRuleRepository::new(pool.clone())),
            Arc::new(SqlExpenseRepository::new(pool)),
            Arc::new(TracingAuditSink),
            rates,
        );
        Self { service: Arc::new(service) }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitExpenseRequest {
    pub employee_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub approver_id: String,
    pub decision: String,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalBody {
    pub approver_id: String,
    pub decision: String,
    pub comment: Option<String>,
    pub decided_at: String,
}

#[derive(Debug, Serialize)]
pub struct ExpenseBody {
    pub id: String,
    pub employee_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub expense_date: String,
    pub status: String,
    pub current_step: u32,
    pub current_approver: Option<String>,
    pub reporting_amount: Decimal,
    pub reporting_currency: String,
    pub version: i64,
    pub history: Vec<ApprovalBody>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ExpenseView> for ExpenseBody {
    fn from(view: ExpenseView) -> Self {
        let expense = view.expense;
        Self {
            id: expense.id.0,
            employee_id: expense.employee_id.0,
            amount: expense.amount,
            currency: expense.currency,
            category: expense.category,
            description: expense.description,
            expense_date: expense.expense_date.format("%Y-%m-%d").to_string(),
            status: expense.status.as_str().to_string(),
            current_step: expense.current_step,
            current_approver: expense.current_approver.map(|id| id.0),
            reporting_amount: view.reporting_amount,
            reporting_currency: view.reporting_currency,
            version: expense.version,
            history: expense
                .history
                .into_iter()
                .map(|record| ApprovalBody {
                    approver_id: record.approver.0,
                    decision: record.decision.as_str().to_string(),
                    comment: record.comment,
                    decided_at: record.decided_at.to_rfc3339(),
                })
                .collect(),
            created_at: expense.created_at.to_rfc3339(),
            updated_at: expense.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DecisionBody {
    pub outcome: String,
    pub expense: ExpenseBody,
}

impl From<DecisionView> for DecisionBody {
    fn from(view: DecisionView) -> Self {
        Self { outcome: view.outcome.label().to_string(), expense: view.expense.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct ListBody {
    pub expenses: Vec<ExpenseBody>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(pool: DbPool, rates: RateTable) -> Router {
    Router::new()
        .route("/expenses", post(submit_expense))
        .route("/expenses/{id}/decision", post(apply_decision))
        .route("/approvers/{id}/pending", get(pending_for_approver))
        .route("/employees/{id}/expenses", get(expenses_for_employee))
        .with_state(ApiState::new(pool, rates))
}

/// Correlation id from the caller's `x-correlation-id` header, or a fresh
/// one when absent. Echoed in every error body so a support ticket can be
/// matched to the server logs.
fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::Misconfigured { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Internal detail goes to the log under the correlation id; the wire body
/// carries only the generic user message.
fn reject(error: ApplicationError, correlation_id: String) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    let status = status_for(&interface);
    if status.is_server_error() {
        tracing::error!(correlation_id = interface.correlation_id(), error = %interface, "request failed");
    } else {
        tracing::warn!(correlation_id = interface.correlation_id(), error = %interface, "request refused");
    }
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_expense(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<SubmitExpenseRequest>,
) -> Result<(StatusCode, Json<ExpenseBody>), (StatusCode, Json<ApiError>)> {
    let correlation = correlation_id(&headers);
    let draft = ExpenseDraft {
        amount: request.amount,
        currency: request.currency,
        category: request.category,
        description: request.description,
        expense_date: request.expense_date,
    };
    let view = state
        .service
        .submit_expense(&UserId(request.employee_id), draft, &correlation)
        .await
        .map_err(|error| reject(error, correlation.clone()))?;
    Ok((StatusCode::CREATED, Json(view.into())))
}

async fn apply_decision(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<DecisionBody>, (StatusCode, Json<ApiError>)> {
    let correlation = correlation_id(&headers);
    let decision = Decision::parse(&request.decision).ok_or_else(|| {
        reject(
            ApplicationError::Workflow(WorkflowError::Validation {
                fields: vec!["decision".to_string()],
            }),
            correlation.clone(),
        )
    })?;
    let view = state
        .service
        .apply_decision(
            &ExpenseId(id),
            &UserId(request.approver_id),
            decision,
            request.comment,
            &correlation,
        )
        .await
        .map_err(|error| reject(error, correlation.clone()))?;
    Ok(Json(view.into()))
}

async fn pending_for_approver(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ListBody>, (StatusCode, Json<ApiError>)> {
    let correlation = correlation_id(&headers);
    let views = state
        .service
        .pending_for_approver(&UserId(id))
        .await
        .map_err(|error| reject(error, correlation.clone()))?;
    Ok(Json(ListBody { expenses: views.into_iter().map(ExpenseBody::from).collect() }))
}

async fn expenses_for_employee(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Result<Json<ListBody>, (StatusCode, Json<ApiError>)> {
    let correlation = correlation_id(&headers);
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(ExpenseStatus::parse(raw).ok_or_else(|| {
            reject(
                ApplicationError::Workflow(WorkflowError::Validation {
                    fields: vec!["status".to_string()],
                }),
                correlation.clone(),
            )
        })?),
    };
    let views = state
        .service
        .expenses_for_employee(&UserId(id), status)
        .await
        .map_err(|error| reject(error, correlation.clone()))?;
    Ok(Json(ListBody { expenses: views.into_iter().map(ExpenseBody::from).collect() }))
}
