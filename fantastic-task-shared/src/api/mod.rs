use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::points::{TransactionType, VerificationStatus};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

pub fn tenant_scope(tenant_id: &str) -> String {
    format!("{}/family/{}", API_V1_PREFIX, tenant_id)
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

// Members/Tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub points_balance: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDto {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub duration_minutes: Option<i32>,
    /// 7-char Monday-first mask, absent when the task is due every day.
    pub recurrence: Option<String>,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskReq {
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub duration_minutes: Option<i32>,
    pub recurrence: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateTaskReq {
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub duration_minutes: Option<i32>,
    pub recurrence: Option<String>,
    pub active: bool,
}

/// A task due on a given day, carrying its index in the family task list.
#[derive(Debug, Serialize, Deserialize)]
pub struct DueTaskDto {
    pub index: usize,
    #[serde(flatten)]
    pub task: TaskDto,
    /// Whether an approved completion exists for this task on that day.
    pub completed: bool,
}

// Completions
#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteTaskReq {
    pub task_id: String,
    /// ISO calendar date; defaults to today in the family timezone.
    pub date: Option<String>,
    pub comment: Option<String>,
    pub time_spent_minutes: Option<i32>,
    pub bonus_points: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionDto {
    pub id: i32,
    pub task_id: String,
    pub assignment_id: Option<i32>,
    pub member_id: String,
    /// Family-local timestamp, `YYYY-MM-DDTHH:MM:SS`.
    pub completed_at: String,
    pub points_awarded: i32,
    pub comment: Option<String>,
    pub time_spent_minutes: Option<i32>,
    pub status: VerificationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDto {
    pub id: i32,
    pub member_id: String,
    pub points: Option<i32>,
    pub bonus_points: Option<i32>,
    pub transaction_type: TransactionType,
    pub description: String,
    pub completion_id: Option<i32>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteTaskResp {
    pub completion: CompletionDto,
    /// Empty while the completion is pending verification.
    pub transactions: Vec<TransactionDto>,
    /// Absent while the completion is pending verification.
    pub points_balance: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UndoResp {
    pub member_id: String,
    pub points_balance: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResp {
    pub completion: CompletionDto,
    /// Present only when the resolution affected the balance (approval).
    pub points_balance: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingCompletionDto {
    pub completion: CompletionDto,
    pub member: MemberDto,
    pub task: TaskDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingCountDto {
    pub count: i64,
}

/// Manual ledger adjustment: spending saved-up points, a penalty, or an
/// out-of-band award. Not tied to any completion.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustPointsReq {
    pub points: Option<i32>,
    pub bonus_points: Option<i32>,
    pub transaction_type: TransactionType,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustPointsResp {
    pub transaction: TransactionDto,
    pub points_balance: i32,
}

// Balance
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceDto {
    pub member_id: String,
    pub points_balance: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileResp {
    pub member_id: String,
    pub ledger_total: i32,
    pub points_balance: i32,
    /// True when the cached balance had drifted and was repaired.
    pub repaired: bool,
}

/// Events broadcast to SSE subscribers after mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    BalanceUpdated {
        member_id: String,
        points_balance: i32,
    },
    PendingCount {
        count: i64,
    },
}
