use crate::storage::schema::{
    assignments, completions, members, points_transactions, sessions, tasks,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = members)]
pub struct Member {
    pub id: String,
    pub display_name: String,
    pub role: String,
    pub points_balance: i32,
}

#[derive(Insertable)]
#[diesel(table_name = members)]
pub struct NewMember<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub role: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub duration_minutes: Option<i32>,
    pub recurrence: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub points: i32,
    pub duration_minutes: Option<i32>,
    pub recurrence: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = assignments)]
#[diesel(belongs_to(Task, foreign_key = task_id))]
pub struct Assignment {
    pub id: i32,
    pub task_id: String,
    pub member_id: Option<String>,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub auto_created: bool,
}

#[derive(Insertable)]
#[diesel(table_name = assignments)]
pub struct NewAssignment<'a> {
    pub task_id: &'a str,
    pub member_id: Option<&'a str>,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub auto_created: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = completions)]
#[diesel(belongs_to(Task, foreign_key = task_id))]
#[diesel(belongs_to(Member, foreign_key = member_id))]
pub struct Completion {
    pub id: i32,
    pub task_id: String,
    pub assignment_id: Option<i32>,
    pub member_id: String,
    pub completed_at: NaiveDateTime,
    pub points_awarded: i32,
    pub comment: Option<String>,
    pub time_spent_minutes: Option<i32>,
    pub status: String,
}

#[derive(Insertable)]
#[diesel(table_name = completions)]
pub struct NewCompletion<'a> {
    pub task_id: &'a str,
    pub assignment_id: Option<i32>,
    pub member_id: &'a str,
    pub completed_at: NaiveDateTime,
    pub points_awarded: i32,
    pub comment: Option<&'a str>,
    pub time_spent_minutes: Option<i32>,
    pub status: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = points_transactions)]
#[diesel(belongs_to(Member, foreign_key = member_id))]
pub struct PointsTransaction {
    pub id: i32,
    pub member_id: String,
    pub points: Option<i32>,
    pub bonus_points: Option<i32>,
    pub transaction_type: String,
    pub description: String,
    pub completion_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = points_transactions)]
pub struct NewPointsTransaction<'a> {
    pub member_id: &'a str,
    pub points: Option<i32>,
    pub bonus_points: Option<i32>,
    pub transaction_type: &'a str,
    pub description: &'a str,
    pub completion_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(primary_key(jti))]
pub struct Session {
    pub jti: String,
    pub username: String,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}
