pub mod models;
pub mod schema;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use fantastic_task_shared::domain::RecurrenceMask;
use fantastic_task_shared::points::{self, TransactionType, VerificationStatus};
use models::{
    Assignment, Completion, Member, NewAssignment, NewCompletion, NewMember,
    NewPointsTransaction, NewSession, NewTask, PointsTransaction, Task,
};
use tracing::trace;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct NewTaskData {
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub duration_minutes: Option<i32>,
    pub recurrence: Option<RecurrenceMask>,
}

#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub duration_minutes: Option<i32>,
    pub recurrence: Option<RecurrenceMask>,
    pub active: bool,
}

/// Input to [`Store::complete_task`]. `completed_at` is the resolved
/// (possibly backdated) timestamp; its date portion becomes the due date
/// of an auto-created assignment.
#[derive(Debug, Clone)]
pub struct CompleteTask {
    pub member_id: String,
    pub task_id: String,
    pub completed_at: NaiveDateTime,
    pub comment: Option<String>,
    pub time_spent_minutes: Option<i32>,
    pub bonus_points: Option<i32>,
    pub status: VerificationStatus,
}

#[derive(Debug)]
pub struct CompletionOutcome {
    pub completion: Completion,
    pub transactions: Vec<PointsTransaction>,
    /// None while the completion is pending verification.
    pub new_balance: Option<i32>,
}

#[derive(Debug)]
pub struct UndoOutcome {
    pub member_id: String,
    pub new_balance: i32,
}

#[derive(Debug)]
pub struct VerifyOutcome {
    pub completion: Completion,
    /// Present only for approvals.
    pub new_balance: Option<i32>,
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub ledger_total: i32,
    pub points_balance: i32,
    pub repaired: bool,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    pub async fn seed_from_config(
        &self,
        cfg_members: &[fantastic_task_shared::domain::Member],
        cfg_tasks: &[fantastic_task_shared::domain::Task],
    ) -> Result<(), StorageError> {
        use schema::{members, tasks};

        let pool = self.pool.clone();
        let members_owned = cfg_members.to_owned();
        let tasks_owned = cfg_tasks.to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            // Upsert members; the points balance belongs to the ledger and
            // is never touched by seeding.
            for m in &members_owned {
                let new_member = NewMember {
                    id: &m.id,
                    display_name: &m.display_name,
                    role: m.role.as_str(),
                };
                diesel::insert_into(members::table)
                    .values(&new_member)
                    .on_conflict(members::id)
                    .do_update()
                    .set((
                        members::display_name.eq(new_member.display_name),
                        members::role.eq(new_member.role),
                    ))
                    .execute(&mut conn)?;
            }

            // Upsert tasks
            for t in &tasks_owned {
                let recurrence = t.recurrence.map(|m| m.to_string());
                let new_task = NewTask {
                    id: &t.id,
                    title: &t.title,
                    description: t.description.as_deref(),
                    points: t.points,
                    duration_minutes: t.duration_minutes,
                    recurrence: recurrence.as_deref(),
                    created_at: Utc::now().naive_utc(),
                };
                diesel::insert_into(tasks::table)
                    .values(&new_task)
                    .on_conflict(tasks::id)
                    .do_update()
                    .set((
                        tasks::title.eq(new_task.title),
                        tasks::description.eq(new_task.description),
                        tasks::points.eq(new_task.points),
                        tasks::duration_minutes.eq(new_task.duration_minutes),
                        tasks::recurrence.eq(recurrence.as_deref()),
                    ))
                    .execute(&mut conn)?;
            }

            Ok(())
        })
        .await?
    }

    pub async fn list_members(&self) -> Result<Vec<Member>, StorageError> {
        use schema::members::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Member>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(members.order(display_name.asc()).load::<Member>(&mut conn)?)
        })
        .await?
    }

    pub async fn get_member(&self, id_: &str) -> Result<Option<Member>, StorageError> {
        use schema::members::dsl::*;
        let pool = self.pool.clone();
        let mid = id_.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Member>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(members
                .filter(id.eq(&mid))
                .first::<Member>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Tasks in creation order. The position in this list is the "original
    /// index" callers use to correlate due tasks with per-day logs.
    pub async fn list_tasks(&self, include_inactive: bool) -> Result<Vec<Task>, StorageError> {
        use schema::tasks::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Task>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let query = tasks.order((created_at.asc(), id.asc()));
            let rows = if include_inactive {
                query.load::<Task>(&mut conn)?
            } else {
                query.filter(active.eq(true)).load::<Task>(&mut conn)?
            };
            Ok(rows)
        })
        .await?
    }

    pub async fn get_task_by_id(&self, id_: &str) -> Result<Option<Task>, StorageError> {
        use schema::tasks::dsl::*;
        let pool = self.pool.clone();
        let tid = id_.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Task>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(tasks
                .filter(id.eq(&tid))
                .first::<Task>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn create_task(&self, data: NewTaskData) -> Result<Task, StorageError> {
        use schema::tasks::dsl as t;
        if data.points < 0 {
            return Err(StorageError::InvalidInput(
                "task points must be non-negative".to_string(),
            ));
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            // Slug the title into an id, suffixing on collision.
            let base = {
                let s = slug::slugify(&data.title);
                if s.is_empty() { "task".to_string() } else { s }
            };
            let mut candidate = base.clone();
            let mut n = 2;
            loop {
                let count: i64 = t::tasks
                    .filter(t::id.eq(&candidate))
                    .count()
                    .get_result(&mut conn)?;
                if count == 0 {
                    break;
                }
                candidate = format!("{}-{}", base, n);
                n += 1;
            }

            let recurrence = data.recurrence.map(|m| m.to_string());
            let new_task = NewTask {
                id: &candidate,
                title: &data.title,
                description: data.description.as_deref(),
                points: data.points,
                duration_minutes: data.duration_minutes,
                recurrence: recurrence.as_deref(),
                created_at: Utc::now().naive_utc(),
            };
            Ok(diesel::insert_into(t::tasks)
                .values(&new_task)
                .returning(Task::as_returning())
                .get_result(&mut conn)?)
        })
        .await?
    }

    pub async fn update_task(
        &self,
        id_: &str,
        update: TaskUpdate,
    ) -> Result<Option<Task>, StorageError> {
        use schema::tasks::dsl as t;
        if update.points < 0 {
            return Err(StorageError::InvalidInput(
                "task points must be non-negative".to_string(),
            ));
        }
        let pool = self.pool.clone();
        let tid = id_.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Task>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let recurrence = update.recurrence.map(|m| m.to_string());
            let updated = diesel::update(t::tasks.filter(t::id.eq(&tid)))
                .set((
                    t::title.eq(&update.title),
                    t::description.eq(update.description.as_deref()),
                    t::points.eq(update.points),
                    t::duration_minutes.eq(update.duration_minutes),
                    t::recurrence.eq(recurrence.as_deref()),
                    t::active.eq(update.active),
                ))
                .execute(&mut conn)?;
            if updated == 0 {
                return Ok(None);
            }
            Ok(t::tasks
                .filter(t::id.eq(&tid))
                .first::<Task>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Hard-delete a task, cascading to its completions and assignments.
    /// Ledger rows are history: they stay, with their completion reference
    /// cleared, so member balances do not drift.
    pub async fn delete_task(&self, id_: &str) -> Result<bool, StorageError> {
        let pool = self.pool.clone();
        let tid = id_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            use schema::{assignments, completions, points_transactions, tasks};
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut deleted = false;
            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                let completion_ids: Vec<i32> = completions::table
                    .filter(completions::task_id.eq(&tid))
                    .select(completions::id)
                    .load::<i32>(conn)?;
                if !completion_ids.is_empty() {
                    diesel::update(
                        points_transactions::table
                            .filter(points_transactions::completion_id.eq_any(&completion_ids)),
                    )
                    .set(points_transactions::completion_id.eq::<Option<i32>>(None))
                    .execute(conn)?;
                    diesel::delete(
                        completions::table.filter(completions::id.eq_any(&completion_ids)),
                    )
                    .execute(conn)?;
                }
                diesel::delete(assignments::table.filter(assignments::task_id.eq(&tid)))
                    .execute(conn)?;
                let n = diesel::delete(tasks::table.filter(tasks::id.eq(&tid))).execute(conn)?;
                deleted = n > 0;
                Ok(())
            })?;
            Ok(deleted)
        })
        .await?
    }

    /// Record a completion, its ledger transactions and the balance update
    /// in one transaction. A pending completion writes no ledger rows and
    /// leaves the balance untouched.
    ///
    /// The member balance is read and written inside the same transaction;
    /// callers additionally hold the per-member lock, so each completion
    /// sees the balance produced by the previous one.
    pub async fn complete_task(
        &self,
        req: CompleteTask,
    ) -> Result<CompletionOutcome, StorageError> {
        let pool = self.pool.clone();
        trace!(
            member_id = %req.member_id,
            task_id = %req.task_id,
            status = %req.status,
            "complete_task starting"
        );
        tokio::task::spawn_blocking(move || -> Result<CompletionOutcome, StorageError> {
            use schema::assignments::dsl as asg;
            use schema::{completions, members, points_transactions, tasks};
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<CompletionOutcome, StorageError> {
                let task: Task = tasks::table
                    .filter(tasks::id.eq(&req.task_id))
                    .first::<Task>(conn)
                    .optional()?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!("task not found: {}", req.task_id))
                    })?;
                if !task.active {
                    return Err(StorageError::InvalidInput(format!(
                        "task is not active: {}",
                        task.id
                    )));
                }
                let member: Member = members::table
                    .filter(members::id.eq(&req.member_id))
                    .first::<Member>(conn)
                    .optional()?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!("member not found: {}", req.member_id))
                    })?;

                let due_date = req.completed_at.date();

                // Find an open assignment for that day, or auto-create one
                // dated to the completion date (not the wall-clock date).
                let existing: Option<Assignment> = asg::assignments
                    .filter(asg::task_id.eq(&task.id))
                    .filter(asg::due_date.eq(due_date))
                    .filter(
                        asg::member_id
                            .eq(&req.member_id)
                            .or(asg::member_id.is_null()),
                    )
                    .order(asg::id.asc())
                    .first::<Assignment>(conn)
                    .optional()?;
                let assignment = match existing {
                    Some(a) => a,
                    None => {
                        let new_assignment = NewAssignment {
                            task_id: &task.id,
                            member_id: Some(&req.member_id),
                            due_date,
                            completed: false,
                            auto_created: true,
                        };
                        diesel::insert_into(asg::assignments)
                            .values(&new_assignment)
                            .returning(Assignment::as_returning())
                            .get_result(conn)?
                    }
                };
                diesel::update(asg::assignments.filter(asg::id.eq(assignment.id)))
                    .set(asg::completed.eq(true))
                    .execute(conn)?;

                let bonus = req.bonus_points.unwrap_or(0);
                let points_awarded = if req.status.affects_points() {
                    task.points + bonus
                } else {
                    task.points
                };
                let new_completion = NewCompletion {
                    task_id: &task.id,
                    assignment_id: Some(assignment.id),
                    member_id: &req.member_id,
                    completed_at: req.completed_at,
                    points_awarded,
                    comment: req.comment.as_deref(),
                    time_spent_minutes: req.time_spent_minutes,
                    status: req.status.as_str(),
                };
                let completion: Completion = diesel::insert_into(completions::table)
                    .values(&new_completion)
                    .returning(Completion::as_returning())
                    .get_result(conn)?;

                if !req.status.affects_points() {
                    return Ok(CompletionOutcome {
                        completion,
                        transactions: Vec::new(),
                        new_balance: None,
                    });
                }

                let now = Utc::now().naive_utc();
                let mut transactions = Vec::new();
                let base_tx = NewPointsTransaction {
                    member_id: &req.member_id,
                    points: Some(task.points),
                    bonus_points: None,
                    transaction_type: TransactionType::Earned.as_str(),
                    description: &task.title,
                    completion_id: Some(completion.id),
                    created_at: now,
                };
                transactions.push(
                    diesel::insert_into(points_transactions::table)
                        .values(&base_tx)
                        .returning(PointsTransaction::as_returning())
                        .get_result::<PointsTransaction>(conn)?,
                );
                if bonus > 0 {
                    let description = format!("Bonus: {}", task.title);
                    let bonus_tx = NewPointsTransaction {
                        member_id: &req.member_id,
                        points: None,
                        bonus_points: Some(bonus),
                        transaction_type: TransactionType::Bonus.as_str(),
                        description: &description,
                        completion_id: Some(completion.id),
                        created_at: now,
                    };
                    transactions.push(
                        diesel::insert_into(points_transactions::table)
                            .values(&bonus_tx)
                            .returning(PointsTransaction::as_returning())
                            .get_result::<PointsTransaction>(conn)?,
                    );
                }

                // The ledger rows just written are authoritative for the
                // credit, not the completion's points_awarded.
                let total =
                    points::ledger_total(transactions.iter().map(|t| (t.points, t.bonus_points)));
                let new_balance = member.points_balance + total;
                diesel::update(members::table.filter(members::id.eq(&req.member_id)))
                    .set(members::points_balance.eq(new_balance))
                    .execute(conn)?;

                Ok(CompletionOutcome {
                    completion,
                    transactions,
                    new_balance: Some(new_balance),
                })
            })
        })
        .await?
    }

    /// Reverse a completion: subtract the sum of the ledger rows that
    /// reference it (never a recomputed figure) from the member balance,
    /// floored at zero, then remove the rows and the completion itself.
    pub async fn undo_completion(
        &self,
        completion_id: i32,
    ) -> Result<Option<UndoOutcome>, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<UndoOutcome>, StorageError> {
            use schema::assignments::dsl as asg;
            use schema::points_transactions::dsl as tx;
            use schema::{completions, members};
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Option<UndoOutcome>, StorageError> {
                let Some(completion) = completions::table
                    .filter(completions::id.eq(completion_id))
                    .first::<Completion>(conn)
                    .optional()?
                else {
                    return Ok(None);
                };

                let transactions: Vec<PointsTransaction> = tx::points_transactions
                    .filter(tx::completion_id.eq(completion_id))
                    .load::<PointsTransaction>(conn)?;
                let total =
                    points::ledger_total(transactions.iter().map(|t| (t.points, t.bonus_points)));

                let member: Member = members::table
                    .filter(members::id.eq(&completion.member_id))
                    .first::<Member>(conn)
                    .optional()?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!(
                            "member not found: {}",
                            completion.member_id
                        ))
                    })?;
                let new_balance = points::debit_clamped(member.points_balance, total);
                diesel::update(members::table.filter(members::id.eq(&member.id)))
                    .set(members::points_balance.eq(new_balance))
                    .execute(conn)?;

                diesel::delete(tx::points_transactions.filter(tx::completion_id.eq(completion_id)))
                    .execute(conn)?;
                diesel::delete(completions::table.filter(completions::id.eq(completion_id)))
                    .execute(conn)?;

                // Clean up the assignment this completion satisfied.
                if let Some(assignment_id) = completion.assignment_id {
                    let remaining: i64 = completions::table
                        .filter(completions::assignment_id.eq(assignment_id))
                        .count()
                        .get_result(conn)?;
                    if remaining == 0 {
                        let auto: Option<bool> = asg::assignments
                            .filter(asg::id.eq(assignment_id))
                            .select(asg::auto_created)
                            .first::<bool>(conn)
                            .optional()?;
                        match auto {
                            Some(true) => {
                                diesel::delete(asg::assignments.filter(asg::id.eq(assignment_id)))
                                    .execute(conn)?;
                            }
                            Some(false) => {
                                diesel::update(asg::assignments.filter(asg::id.eq(assignment_id)))
                                    .set(asg::completed.eq(false))
                                    .execute(conn)?;
                            }
                            None => {}
                        }
                    }
                }

                Ok(Some(UndoOutcome {
                    member_id: member.id,
                    new_balance,
                }))
            })
        })
        .await?
    }

    /// Resolve a pending completion. Approval creates the ledger rows
    /// (base points read from the task at approval time) and credits the
    /// balance; rejection only flips the status. Resolving a completion
    /// that is not pending is an input error.
    pub async fn verify_completion(
        &self,
        completion_id: i32,
        approved: bool,
    ) -> Result<Option<VerifyOutcome>, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<VerifyOutcome>, StorageError> {
            use schema::{completions, members, points_transactions, tasks};
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Option<VerifyOutcome>, StorageError> {
                let Some(completion) = completions::table
                    .filter(completions::id.eq(completion_id))
                    .first::<Completion>(conn)
                    .optional()?
                else {
                    return Ok(None);
                };

                let status: VerificationStatus = completion
                    .status
                    .parse()
                    .map_err(|e: points::PointsError| StorageError::InvalidInput(e.to_string()))?;
                let resolved = status
                    .resolve(approved)
                    .map_err(|e| StorageError::InvalidInput(e.to_string()))?;

                if !resolved.affects_points() {
                    diesel::update(completions::table.filter(completions::id.eq(completion_id)))
                        .set(completions::status.eq(resolved.as_str()))
                        .execute(conn)?;
                    let updated = completions::table
                        .filter(completions::id.eq(completion_id))
                        .first::<Completion>(conn)?;
                    return Ok(Some(VerifyOutcome {
                        completion: updated,
                        new_balance: None,
                    }));
                }

                let task: Task = tasks::table
                    .filter(tasks::id.eq(&completion.task_id))
                    .first::<Task>(conn)
                    .optional()?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!("task not found: {}", completion.task_id))
                    })?;
                let member: Member = members::table
                    .filter(members::id.eq(&completion.member_id))
                    .first::<Member>(conn)
                    .optional()?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!(
                            "member not found: {}",
                            completion.member_id
                        ))
                    })?;

                let new_tx = NewPointsTransaction {
                    member_id: &member.id,
                    points: Some(task.points),
                    bonus_points: None,
                    transaction_type: TransactionType::Earned.as_str(),
                    description: &task.title,
                    completion_id: Some(completion.id),
                    created_at: Utc::now().naive_utc(),
                };
                let tx_row: PointsTransaction = diesel::insert_into(points_transactions::table)
                    .values(&new_tx)
                    .returning(PointsTransaction::as_returning())
                    .get_result(conn)?;

                let total = points::ledger_total([(tx_row.points, tx_row.bonus_points)]);
                let new_balance = member.points_balance + total;
                diesel::update(members::table.filter(members::id.eq(&member.id)))
                    .set(members::points_balance.eq(new_balance))
                    .execute(conn)?;

                diesel::update(completions::table.filter(completions::id.eq(completion_id)))
                    .set((
                        completions::status.eq(resolved.as_str()),
                        completions::points_awarded.eq(task.points),
                    ))
                    .execute(conn)?;
                let updated = completions::table
                    .filter(completions::id.eq(completion_id))
                    .first::<Completion>(conn)?;

                Ok(Some(VerifyOutcome {
                    completion: updated,
                    new_balance: Some(new_balance),
                }))
            })
        })
        .await?
    }

    pub async fn get_completion(&self, id_: i32) -> Result<Option<Completion>, StorageError> {
        use schema::completions::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Completion>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(completions
                .filter(id.eq(id_))
                .first::<Completion>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Non-rejected completions whose timestamp falls on `date`.
    pub async fn list_completions_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Completion>, StorageError> {
        use schema::completions::dsl as c;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Completion>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let day_start = date.and_time(chrono::NaiveTime::MIN);
            let day_end = day_start + chrono::Duration::days(1);
            Ok(c::completions
                .filter(c::completed_at.ge(day_start))
                .filter(c::completed_at.lt(day_end))
                .filter(c::status.ne(VerificationStatus::Rejected.as_str()))
                .order(c::completed_at.asc())
                .load::<Completion>(&mut conn)?)
        })
        .await?
    }

    pub async fn list_pending_completions(
        &self,
    ) -> Result<Vec<(Completion, Member, Task)>, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Completion, Member, Task)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                use schema::{completions, members, tasks};
                let rows = completions::table
                    .inner_join(members::table.on(members::id.eq(completions::member_id)))
                    .inner_join(tasks::table.on(tasks::id.eq(completions::task_id)))
                    .filter(completions::status.eq(VerificationStatus::Pending.as_str()))
                    .order(completions::completed_at.desc())
                    .select((
                        Completion::as_select(),
                        Member::as_select(),
                        Task::as_select(),
                    ))
                    .load::<(Completion, Member, Task)>(&mut conn)?;
                Ok(rows)
            },
        )
        .await?
    }

    pub async fn pending_count(&self) -> Result<i64, StorageError> {
        use schema::completions::dsl as c;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<i64, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(c::completions
                .filter(c::status.eq(VerificationStatus::Pending.as_str()))
                .count()
                .get_result(&mut conn)?)
        })
        .await?
    }

    pub async fn list_transactions_for_member(
        &self,
        member: &str,
        page: usize,
        per_page: usize,
        type_filter: Option<TransactionType>,
    ) -> Result<Vec<PointsTransaction>, StorageError> {
        use schema::points_transactions::dsl as tx;
        let pool = self.pool.clone();
        let member = member.to_string();
        let page = page.max(1);
        let per_page = per_page.clamp(1, 1000) as i64;
        let offset = ((page as i64) - 1) * per_page;
        tokio::task::spawn_blocking(move || -> Result<Vec<PointsTransaction>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut query = tx::points_transactions
                .filter(tx::member_id.eq(&member))
                .into_boxed();
            if let Some(ty) = type_filter {
                query = query.filter(tx::transaction_type.eq(ty.as_str()));
            }
            Ok(query
                .order(tx::created_at.desc())
                .offset(offset)
                .limit(per_page)
                .load::<PointsTransaction>(&mut conn)?)
        })
        .await?
    }

    /// Record a manual ledger adjustment (spend, penalty, or out-of-band
    /// award) and apply it to the balance, floored at zero. Earned/bonus
    /// adjustments must not be negative; spent/penalty must not be positive.
    pub async fn record_adjustment(
        &self,
        member: &str,
        adjust_points: Option<i32>,
        adjust_bonus: Option<i32>,
        transaction_type: TransactionType,
        description: String,
    ) -> Result<Option<(PointsTransaction, i32)>, StorageError> {
        let total = points::tx_total(adjust_points, adjust_bonus);
        match transaction_type {
            TransactionType::Earned | TransactionType::Bonus if total < 0 => {
                return Err(StorageError::InvalidInput(format!(
                    "{} adjustments must not be negative",
                    transaction_type
                )));
            }
            TransactionType::Spent | TransactionType::Penalty if total > 0 => {
                return Err(StorageError::InvalidInput(format!(
                    "{} adjustments must not be positive",
                    transaction_type
                )));
            }
            _ => {}
        }
        let pool = self.pool.clone();
        let member = member.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<Option<(PointsTransaction, i32)>, StorageError> {
                use schema::{members, points_transactions};
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.immediate_transaction(
                    |conn| -> Result<Option<(PointsTransaction, i32)>, StorageError> {
                        let Some(row) = members::table
                            .filter(members::id.eq(&member))
                            .first::<Member>(conn)
                            .optional()?
                        else {
                            return Ok(None);
                        };
                        let new_tx = NewPointsTransaction {
                            member_id: &member,
                            points: adjust_points,
                            bonus_points: adjust_bonus,
                            transaction_type: transaction_type.as_str(),
                            description: &description,
                            completion_id: None,
                            created_at: Utc::now().naive_utc(),
                        };
                        let tx_row: PointsTransaction =
                            diesel::insert_into(points_transactions::table)
                                .values(&new_tx)
                                .returning(PointsTransaction::as_returning())
                                .get_result(conn)?;
                        let new_balance = (row.points_balance + total).max(0);
                        diesel::update(members::table.filter(members::id.eq(&member)))
                            .set(members::points_balance.eq(new_balance))
                            .execute(conn)?;
                        Ok(Some((tx_row, new_balance)))
                    },
                )
            },
        )
        .await?
    }

    /// Re-sum the member's ledger and repair the cached balance if it has
    /// drifted. The reconciled value is the floored ledger sum.
    pub async fn reconcile_balance(
        &self,
        member: &str,
    ) -> Result<Option<ReconcileOutcome>, StorageError> {
        use diesel::dsl::sum;
        let pool = self.pool.clone();
        let member = member.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<ReconcileOutcome>, StorageError> {
            use schema::members;
            use schema::points_transactions::dsl as tx;
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Option<ReconcileOutcome>, StorageError> {
                let Some(row) = members::table
                    .filter(members::id.eq(&member))
                    .first::<Member>(conn)
                    .optional()?
                else {
                    return Ok(None);
                };
                let points_sum: Option<i64> = tx::points_transactions
                    .filter(tx::member_id.eq(&member))
                    .select(sum(tx::points))
                    .first::<Option<i64>>(conn)?;
                let bonus_sum: Option<i64> = tx::points_transactions
                    .filter(tx::member_id.eq(&member))
                    .select(sum(tx::bonus_points))
                    .first::<Option<i64>>(conn)?;
                let ledger_total = (points_sum.unwrap_or(0) + bonus_sum.unwrap_or(0)) as i32;
                let expected = ledger_total.max(0);
                let repaired = expected != row.points_balance;
                if repaired {
                    diesel::update(members::table.filter(members::id.eq(&member)))
                        .set(members::points_balance.eq(expected))
                        .execute(conn)?;
                }
                Ok(Some(ReconcileOutcome {
                    ledger_total,
                    points_balance: expected,
                    repaired,
                }))
            })
        })
        .await?
    }

    // Session helpers for JWT inactivity windows
    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        let u = username_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new = NewSession {
                jti: &j,
                username: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    ///
    /// This combines the idle timeout check and the `last_used_at` update into
    /// a single atomic UPDATE, eliminating the race condition between checking
    /// and updating the session.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}
