use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, tenant_scope};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn members(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/members", tenant_scope(tenant_id)))
}
pub fn member_balance(base: &str, tenant_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/members/{}/balance",
            tenant_scope(tenant_id),
            enc(member_id)
        ),
    )
}
pub fn member_transactions(base: &str, tenant_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/members/{}/transactions",
            tenant_scope(tenant_id),
            enc(member_id)
        ),
    )
}
pub fn member_completions(base: &str, tenant_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/members/{}/completions",
            tenant_scope(tenant_id),
            enc(member_id)
        ),
    )
}
pub fn member_adjustments(base: &str, tenant_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/members/{}/adjustments",
            tenant_scope(tenant_id),
            enc(member_id)
        ),
    )
}
pub fn member_reconcile(base: &str, tenant_id: &str, member_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/members/{}/reconcile",
            tenant_scope(tenant_id),
            enc(member_id)
        ),
    )
}
pub fn tasks(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/tasks", tenant_scope(tenant_id)))
}
pub fn task(base: &str, tenant_id: &str, task_id: &str) -> String {
    base_join(
        base,
        &format!("{}/tasks/{}", tenant_scope(tenant_id), enc(task_id)),
    )
}
pub fn tasks_due(base: &str, tenant_id: &str, date: &str) -> String {
    base_join(
        base,
        &format!("{}/tasks/due?date={}", tenant_scope(tenant_id), enc(date)),
    )
}
pub fn completion(base: &str, tenant_id: &str, completion_id: i32) -> String {
    base_join(
        base,
        &format!("{}/completions/{}", tenant_scope(tenant_id), completion_id),
    )
}
pub fn completion_approve(base: &str, tenant_id: &str, completion_id: i32) -> String {
    base_join(
        base,
        &format!(
            "{}/completions/{}/approve",
            tenant_scope(tenant_id),
            completion_id
        ),
    )
}
pub fn completion_reject(base: &str, tenant_id: &str, completion_id: i32) -> String {
    base_join(
        base,
        &format!(
            "{}/completions/{}/reject",
            tenant_scope(tenant_id),
            completion_id
        ),
    )
}
pub fn completions_pending(base: &str, tenant_id: &str) -> String {
    base_join(
        base,
        &format!("{}/completions/pending", tenant_scope(tenant_id)),
    )
}
pub fn completions_pending_count(base: &str, tenant_id: &str) -> String {
    base_join(
        base,
        &format!("{}/completions/pending/count", tenant_scope(tenant_id)),
    )
}
pub fn events(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/events", tenant_scope(tenant_id)))
}
