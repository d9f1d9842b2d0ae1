//! Minimal REST client helpers for consumers (clients).

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        // Keep TCP connections alive at kernel level
        .tcp_keepalive(Some(Duration::from_secs(180)))
        // Enable and tune the connection pool
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(180))
        // Bound request duration
        .timeout(Duration::from_secs(180))
        .build()
        .expect("failed to build HTTP client")
});

fn mk_client() -> Result<reqwest::Client, RestError> {
    Ok(HTTP_CLIENT.clone())
}

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

pub async fn login(base: &str, req: &AuthReq) -> Result<AuthResp, RestError> {
    let client = mk_client()?;
    let url = ep::auth_login(base);
    let res = client
        .post(url)
        .json(req)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn list_members(
    base: &str,
    tenant_id: &str,
    bearer: &str,
) -> Result<Vec<MemberDto>, RestError> {
    let client = mk_client()?;
    let url = ep::members(base, tenant_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn list_tasks(
    base: &str,
    tenant_id: &str,
    bearer: &str,
) -> Result<Vec<TaskDto>, RestError> {
    let client = mk_client()?;
    let url = ep::tasks(base, tenant_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn due_tasks(
    base: &str,
    tenant_id: &str,
    date: &str,
    bearer: &str,
) -> Result<Vec<DueTaskDto>, RestError> {
    let client = mk_client()?;
    let url = ep::tasks_due(base, tenant_id, date);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn member_balance(
    base: &str,
    tenant_id: &str,
    member_id: &str,
    bearer: &str,
) -> Result<BalanceDto, RestError> {
    let client = mk_client()?;
    let url = ep::member_balance(base, tenant_id, member_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn member_transactions(
    base: &str,
    tenant_id: &str,
    member_id: &str,
    bearer: &str,
) -> Result<Vec<TransactionDto>, RestError> {
    let client = mk_client()?;
    let url = ep::member_transactions(base, tenant_id, member_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn complete_task(
    base: &str,
    tenant_id: &str,
    member_id: &str,
    bearer: &str,
    body: &CompleteTaskReq,
) -> Result<CompleteTaskResp, RestError> {
    let client = mk_client()?;
    let url = ep::member_completions(base, tenant_id, member_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn undo_completion(
    base: &str,
    tenant_id: &str,
    completion_id: i32,
    bearer: &str,
) -> Result<UndoResp, RestError> {
    let client = mk_client()?;
    let url = ep::completion(base, tenant_id, completion_id);
    let res = client
        .delete(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn approve_completion(
    base: &str,
    tenant_id: &str,
    completion_id: i32,
    bearer: &str,
) -> Result<VerifyResp, RestError> {
    let client = mk_client()?;
    let url = ep::completion_approve(base, tenant_id, completion_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn reject_completion(
    base: &str,
    tenant_id: &str,
    completion_id: i32,
    bearer: &str,
) -> Result<VerifyResp, RestError> {
    let client = mk_client()?;
    let url = ep::completion_reject(base, tenant_id, completion_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn pending_completions(
    base: &str,
    tenant_id: &str,
    bearer: &str,
) -> Result<Vec<PendingCompletionDto>, RestError> {
    let client = mk_client()?;
    let url = ep::completions_pending(base, tenant_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn pending_count(
    base: &str,
    tenant_id: &str,
    bearer: &str,
) -> Result<PendingCountDto, RestError> {
    let client = mk_client()?;
    let url = ep::completions_pending_count(base, tenant_id);
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn adjust_points(
    base: &str,
    tenant_id: &str,
    member_id: &str,
    bearer: &str,
    body: &AdjustPointsReq,
) -> Result<AdjustPointsResp, RestError> {
    let client = mk_client()?;
    let url = ep::member_adjustments(base, tenant_id, member_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn reconcile_member(
    base: &str,
    tenant_id: &str,
    member_id: &str,
    bearer: &str,
) -> Result<ReconcileResp, RestError> {
    let client = mk_client()?;
    let url = ep::member_reconcile(base, tenant_id, member_id);
    let res = client
        .post(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}
