mod acl;
pub mod auth;
mod config;
mod events;

use std::collections::HashMap;
use std::sync::Arc;

use crate::server::auth::AuthCtx;
use crate::storage::{self, StorageError};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{delete, get, post, put},
};
use bcrypt::verify;
use chrono::{NaiveDate, Utc};
pub use config::{AppConfig, ConfigError, UserConfig};
use fantastic_task_shared::api;
use fantastic_task_shared::auth::Role;
use fantastic_task_shared::domain::{self, RecurrenceMask};
use fantastic_task_shared::points::{TransactionType, VerificationStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

/// One mutex per member, serializing every balance-affecting operation so
/// each read-modify-write sees the balance the previous one produced.
type MemberLockMap = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: storage::Store,
    member_locks: MemberLockMap,
    pub(crate) events: broadcast::Sender<api::ServerEvent>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: storage::Store) -> Self {
        let (events, _) = broadcast::channel(events::EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            store,
            member_locks: Default::default(),
            events,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn member_lock(&self, member_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.member_locks.lock().await;
        map.entry(member_id.to_string())
            .or_insert_with(Default::default)
            .clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let family = Router::new()
        .route("/members", get(api_list_members))
        .route("/members/{id}/balance", get(api_member_balance))
        .route("/members/{id}/transactions", get(api_member_transactions))
        .route("/members/{id}/completions", post(api_complete_task))
        .route("/members/{id}/adjustments", post(api_adjust_points))
        .route("/members/{id}/reconcile", post(api_reconcile_member))
        .route("/tasks", get(api_list_tasks).post(api_create_task))
        .route("/tasks/due", get(api_tasks_due))
        .route("/tasks/{id}", put(api_update_task).delete(api_delete_task))
        .route("/completions/pending", get(api_list_pending))
        .route("/completions/pending/count", get(api_pending_count))
        .route("/completions/{id}", delete(api_undo_completion))
        .route("/completions/{id}/approve", post(api_approve_completion))
        .route("/completions/{id}/reject", post(api_reject_completion))
        .route("/events", get(events::api_events));

    let tenant_scope = api::tenant_scope(&state.config.tenant_id);
    let private = Router::new()
        .nest(&tenant_scope, family)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            acl::enforce_acl,
        ))
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            member_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route(
            &format!("{}/auth/login", api::API_V1_PREFIX),
            post(api_auth_login),
        )
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    // Put into request extensions for trace layer & handlers
    req.extensions_mut().insert(ReqId(rid.clone()));
    // Call next
    let mut resp = next.run(req).await;
    // Set header on response
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    // General security headers for all responses
    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(auth.claims.role));
        if let Some(mid) = &auth.claims.member_id {
            span.record("member_id", tracing::field::display(mid));
        }
    }
    Ok(next.run(req).await)
}

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    // Find user in config
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    // For child role, ensure member_id provided
    if user.role == Role::Child && user.member_id.is_none() {
        tracing::error!(username=%body.username, "login: child user missing member_id in config");
        return Err(AppError::internal("child user missing member_id"));
    }
    let token =
        auth::issue_jwt_for_user(&state, &user.username, user.role, user.member_id.clone()).await?;
    Ok(Json(api::AuthResp { token }))
}

async fn api_list_members(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::MemberDto>>, AppError> {
    // ACL enforced by middleware
    let rows = state
        .store
        .list_members()
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(member_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

async fn api_member_balance(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::BalanceDto>, AppError> {
    let member = state
        .store
        .get_member(&id)
        .await
        .map_err(AppError::from_storage)?
        .ok_or_else(|| AppError::not_found(format!("member not found: {}", id)))?;
    Ok(Json(api::BalanceDto {
        member_id: member.id,
        points_balance: member.points_balance,
    }))
}

#[derive(Deserialize)]
struct TransactionOpts {
    page: Option<usize>,
    per_page: Option<usize>,
    #[serde(rename = "type")]
    type_filter: Option<String>,
}

async fn api_member_transactions(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Query(opts): Query<TransactionOpts>,
) -> Result<Json<Vec<api::TransactionDto>>, AppError> {
    let page = opts.page.unwrap_or(1);
    let per_page = opts.per_page.unwrap_or(20);
    let type_filter = opts
        .type_filter
        .as_deref()
        .map(|s| s.parse::<TransactionType>())
        .transpose()
        .map_err(AppError::bad_request_from)?;
    let rows = state
        .store
        .list_transactions_for_member(&id, page, per_page, type_filter)
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(transaction_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

#[derive(Deserialize)]
struct MemberPathId {
    id: String,
}

async fn api_complete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<MemberPathId>,
    Json(body): Json<api::CompleteTaskReq>,
) -> Result<Json<api::CompleteTaskResp>, AppError> {
    let bonus = body.bonus_points.unwrap_or(0);
    if bonus < 0 {
        return Err(AppError::bad_request("bonus_points must be non-negative"));
    }

    let tz = state.config.timezone();
    let now_local = Utc::now().with_timezone(&tz).naive_local();
    let date = match body.date.as_deref() {
        Some(s) => parse_date(s)?,
        None => now_local.date(),
    };
    let completed_at = domain::resolve_completed_at(date, now_local);

    // The gate applies to the acting user: a child's own completions are
    // held for review, an adult recording one resolves it immediately.
    let status = VerificationStatus::initial_for(
        auth.claims.role,
        state.config.verification_required(),
    );
    if status == VerificationStatus::Pending && bonus > 0 {
        return Err(AppError::bad_request(
            "bonus points cannot be granted on a completion awaiting verification",
        ));
    }

    // Serialize balance updates for this member
    let lock = state.member_lock(&p.id).await;
    let _guard = lock.lock().await;

    let outcome = state
        .store
        .complete_task(storage::CompleteTask {
            member_id: p.id.clone(),
            task_id: body.task_id.clone(),
            completed_at,
            comment: body.comment.clone(),
            time_spent_minutes: body.time_spent_minutes,
            bonus_points: body.bonus_points,
            status,
        })
        .await
        .map_err(AppError::from_storage)?;

    match outcome.new_balance {
        Some(points_balance) => events::publish(
            &state,
            api::ServerEvent::BalanceUpdated {
                member_id: p.id.clone(),
                points_balance,
            },
        ),
        None => {
            let count = state
                .store
                .pending_count()
                .await
                .map_err(AppError::from_storage)?;
            events::publish(&state, api::ServerEvent::PendingCount { count });
        }
    }

    let transactions = outcome
        .transactions
        .into_iter()
        .map(transaction_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(api::CompleteTaskResp {
        completion: completion_dto(outcome.completion)?,
        transactions,
        points_balance: outcome.new_balance,
    }))
}

async fn api_undo_completion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::UndoResp>, AppError> {
    let completion = state
        .store
        .get_completion(id)
        .await
        .map_err(AppError::from_storage)?
        .ok_or_else(|| AppError::not_found(format!("completion not found: {}", id)))?;

    // A child may only undo their own completions.
    if auth.claims.role == Role::Child
        && auth.claims.member_id.as_deref() != Some(completion.member_id.as_str())
    {
        return Err(AppError::forbidden());
    }

    let lock = state.member_lock(&completion.member_id).await;
    let _guard = lock.lock().await;

    let outcome = state
        .store
        .undo_completion(id)
        .await
        .map_err(AppError::from_storage)?
        .ok_or_else(|| AppError::not_found(format!("completion not found: {}", id)))?;

    events::publish(
        &state,
        api::ServerEvent::BalanceUpdated {
            member_id: outcome.member_id.clone(),
            points_balance: outcome.new_balance,
        },
    );

    Ok(Json(api::UndoResp {
        member_id: outcome.member_id,
        points_balance: outcome.new_balance,
    }))
}

async fn api_approve_completion(
    state: State<AppState>,
    auth: Extension<AuthCtx>,
    id: Path<i32>,
) -> Result<Json<api::VerifyResp>, AppError> {
    verify_completion(state, auth, id, true).await
}

async fn api_reject_completion(
    state: State<AppState>,
    auth: Extension<AuthCtx>,
    id: Path<i32>,
) -> Result<Json<api::VerifyResp>, AppError> {
    verify_completion(state, auth, id, false).await
}

async fn verify_completion(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    approved: bool,
) -> Result<Json<api::VerifyResp>, AppError> {
    let completion = state
        .store
        .get_completion(id)
        .await
        .map_err(AppError::from_storage)?
        .ok_or_else(|| AppError::not_found(format!("completion not found: {}", id)))?;

    let lock = state.member_lock(&completion.member_id).await;
    let _guard = lock.lock().await;

    let outcome = state
        .store
        .verify_completion(id, approved)
        .await
        .map_err(AppError::from_storage)?
        .ok_or_else(|| AppError::not_found(format!("completion not found: {}", id)))?;

    if let Some(points_balance) = outcome.new_balance {
        events::publish(
            &state,
            api::ServerEvent::BalanceUpdated {
                member_id: completion.member_id.clone(),
                points_balance,
            },
        );
    }
    let count = state
        .store
        .pending_count()
        .await
        .map_err(AppError::from_storage)?;
    events::publish(&state, api::ServerEvent::PendingCount { count });

    Ok(Json(api::VerifyResp {
        completion: completion_dto(outcome.completion)?,
        points_balance: outcome.new_balance,
    }))
}

async fn api_adjust_points(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::AdjustPointsReq>,
) -> Result<Json<api::AdjustPointsResp>, AppError> {
    if body.description.trim().is_empty() {
        return Err(AppError::bad_request("description is required"));
    }

    let lock = state.member_lock(&id).await;
    let _guard = lock.lock().await;

    let (tx_row, points_balance) = state
        .store
        .record_adjustment(
            &id,
            body.points,
            body.bonus_points,
            body.transaction_type,
            body.description,
        )
        .await
        .map_err(AppError::from_storage)?
        .ok_or_else(|| AppError::not_found(format!("member not found: {}", id)))?;

    events::publish(
        &state,
        api::ServerEvent::BalanceUpdated {
            member_id: id,
            points_balance,
        },
    );

    Ok(Json(api::AdjustPointsResp {
        transaction: transaction_dto(tx_row)?,
        points_balance,
    }))
}

async fn api_reconcile_member(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::ReconcileResp>, AppError> {
    let lock = state.member_lock(&id).await;
    let _guard = lock.lock().await;

    let outcome = state
        .store
        .reconcile_balance(&id)
        .await
        .map_err(AppError::from_storage)?
        .ok_or_else(|| AppError::not_found(format!("member not found: {}", id)))?;

    if outcome.repaired {
        events::publish(
            &state,
            api::ServerEvent::BalanceUpdated {
                member_id: id.clone(),
                points_balance: outcome.points_balance,
            },
        );
    }

    Ok(Json(api::ReconcileResp {
        member_id: id,
        ledger_total: outcome.ledger_total,
        points_balance: outcome.points_balance,
        repaired: outcome.repaired,
    }))
}

async fn api_list_tasks(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::TaskDto>>, AppError> {
    let rows = state
        .store
        .list_tasks(true)
        .await
        .map_err(AppError::from_storage)?;
    let items = rows.into_iter().map(task_dto).collect();
    Ok(Json(items))
}

#[derive(Deserialize)]
struct DueOpts {
    date: Option<String>,
}

async fn api_tasks_due(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Query(opts): Query<DueOpts>,
) -> Result<Json<Vec<api::DueTaskDto>>, AppError> {
    let tz = state.config.timezone();
    let date = match opts.date.as_deref() {
        Some(s) => parse_date(s)?,
        None => Utc::now().with_timezone(&tz).date_naive(),
    };

    let rows = state
        .store
        .list_tasks(false)
        .await
        .map_err(AppError::from_storage)?;
    let domain_tasks = rows
        .iter()
        .map(|t| domain_task(t.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let completions = state
        .store
        .list_completions_on(date)
        .await
        .map_err(AppError::from_storage)?;

    let due = domain::due_tasks(&domain_tasks, date);
    let items = due
        .into_iter()
        .map(|(index, task)| api::DueTaskDto {
            index,
            completed: completions.iter().any(|c| c.task_id == task.id),
            task: task_dto(rows[index].clone()),
        })
        .collect();
    Ok(Json(items))
}

async fn api_create_task(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateTaskReq>,
) -> Result<Json<api::TaskDto>, AppError> {
    let recurrence = parse_recurrence(body.recurrence.as_deref())?;
    let row = state
        .store
        .create_task(storage::NewTaskData {
            title: body.title,
            description: body.description,
            points: body.points,
            duration_minutes: body.duration_minutes,
            recurrence,
        })
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(task_dto(row)))
}

async fn api_update_task(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::UpdateTaskReq>,
) -> Result<Json<api::TaskDto>, AppError> {
    let recurrence = parse_recurrence(body.recurrence.as_deref())?;
    let row = state
        .store
        .update_task(
            &id,
            storage::TaskUpdate {
                title: body.title,
                description: body.description,
                points: body.points,
                duration_minutes: body.duration_minutes,
                recurrence,
                active: body.active,
            },
        )
        .await
        .map_err(AppError::from_storage)?
        .ok_or_else(|| AppError::not_found(format!("task not found: {}", id)))?;
    Ok(Json(task_dto(row)))
}

async fn api_delete_task(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .store
        .delete_task(&id)
        .await
        .map_err(AppError::from_storage)?;
    if !deleted {
        return Err(AppError::not_found(format!("task not found: {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn api_list_pending(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::PendingCompletionDto>>, AppError> {
    let rows = state
        .store
        .list_pending_completions()
        .await
        .map_err(AppError::from_storage)?;
    let items = rows
        .into_iter()
        .map(|(completion, member, task)| {
            Ok(api::PendingCompletionDto {
                completion: completion_dto(completion)?,
                member: member_dto(member)?,
                task: task_dto(task),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(Json(items))
}

async fn api_pending_count(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<api::PendingCountDto>, AppError> {
    let count = state
        .store
        .pending_count()
        .await
        .map_err(AppError::from_storage)?;
    Ok(Json(api::PendingCountDto { count }))
}

fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::bad_request(format!("invalid date: {}", s)))
}

fn parse_recurrence(s: Option<&str>) -> Result<Option<RecurrenceMask>, AppError> {
    s.map(|m| m.parse::<RecurrenceMask>())
        .transpose()
        .map_err(AppError::bad_request_from)
}

fn member_dto(row: crate::storage::models::Member) -> Result<api::MemberDto, AppError> {
    let role = row.role.parse::<Role>().map_err(AppError::internal)?;
    Ok(api::MemberDto {
        id: row.id,
        display_name: row.display_name,
        role,
        points_balance: row.points_balance,
    })
}

fn task_dto(row: crate::storage::models::Task) -> api::TaskDto {
    api::TaskDto {
        id: row.id,
        title: row.title,
        description: row.description,
        points: row.points,
        duration_minutes: row.duration_minutes,
        recurrence: row.recurrence,
        active: row.active,
    }
}

fn domain_task(row: crate::storage::models::Task) -> Result<domain::Task, AppError> {
    let recurrence = row
        .recurrence
        .as_deref()
        .map(|m| m.parse::<RecurrenceMask>())
        .transpose()
        .map_err(AppError::internal)?;
    Ok(domain::Task {
        id: row.id,
        title: row.title,
        description: row.description,
        points: row.points,
        duration_minutes: row.duration_minutes,
        recurrence,
    })
}

fn completion_dto(row: crate::storage::models::Completion) -> Result<api::CompletionDto, AppError> {
    let status = row
        .status
        .parse::<VerificationStatus>()
        .map_err(AppError::internal)?;
    Ok(api::CompletionDto {
        id: row.id,
        task_id: row.task_id,
        assignment_id: row.assignment_id,
        member_id: row.member_id,
        completed_at: row.completed_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        points_awarded: row.points_awarded,
        comment: row.comment,
        time_spent_minutes: row.time_spent_minutes,
        status,
    })
}

fn transaction_dto(
    row: crate::storage::models::PointsTransaction,
) -> Result<api::TransactionDto, AppError> {
    let transaction_type = row
        .transaction_type
        .parse::<TransactionType>()
        .map_err(AppError::internal)?;
    Ok(api::TransactionDto {
        id: row.id,
        member_id: row.member_id,
        points: row.points,
        bonus_points: row.bonus_points,
        transaction_type,
        description: row.description,
        completion_id: row.completion_id,
        created_at: row.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
    })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn bad_request_from<E: std::fmt::Display>(e: E) -> Self {
        Self::BadRequest(e.to_string())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// Storage failures keep their kind where the caller is at fault;
    /// everything else is an opaque internal error.
    fn from_storage(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::InvalidInput(msg) => Self::BadRequest(msg),
            other => Self::internal(other),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        // Log any error responses at ERROR level for troubleshooting
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}
