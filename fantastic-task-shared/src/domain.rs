use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Weekly recurrence pattern, Monday-first: index 0 is Monday, 6 is Sunday.
///
/// Serialized as a 7-character string of `0`/`1`, e.g. `"1111100"` for
/// Monday through Friday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecurrenceMask(pub [bool; 7]);

#[derive(Debug, thiserror::Error)]
#[error("invalid recurrence mask: {0:?} (expected 7 chars of 0/1)")]
pub struct InvalidRecurrenceMask(pub String);

impl RecurrenceMask {
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        self.0[date.weekday().num_days_from_monday() as usize]
    }
}

impl FromStr for RecurrenceMask {
    type Err = InvalidRecurrenceMask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut days = [false; 7];
        if s.len() != 7 {
            return Err(InvalidRecurrenceMask(s.to_string()));
        }
        for (i, c) in s.chars().enumerate() {
            days[i] = match c {
                '0' => false,
                '1' => true,
                _ => return Err(InvalidRecurrenceMask(s.to_string())),
            };
        }
        Ok(RecurrenceMask(days))
    }
}

impl TryFrom<String> for RecurrenceMask {
    type Error = InvalidRecurrenceMask;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecurrenceMask> for String {
    fn from(mask: RecurrenceMask) -> String {
        mask.to_string()
    }
}

impl fmt::Display for RecurrenceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for due in self.0 {
            f.write_str(if due { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub display_name: String,
    pub role: crate::auth::Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: i32,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub recurrence: Option<RecurrenceMask>,
}

/// Tasks due on `date`, paired with their position in the input list.
///
/// A task with no recurrence mask is due every day. Input order is kept and
/// the original index is returned so callers can correlate entries with
/// per-day completion logs.
pub fn due_tasks(tasks: &[Task], date: NaiveDate) -> Vec<(usize, &Task)> {
    tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| {
            task.recurrence
                .as_ref()
                .is_none_or(|mask| mask.is_due_on(date))
        })
        .collect()
}

/// Timestamp for a (possibly backdated) completion: the selected calendar
/// date combined with the time-of-day of `now`. The date portion is taken
/// from `selected` alone, never from `now`.
pub fn resolve_completed_at(selected: NaiveDate, now: NaiveDateTime) -> NaiveDateTime {
    selected.and_time(now.time())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, recurrence: Option<&str>) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            description: None,
            points: 1,
            duration_minutes: None,
            recurrence: recurrence.map(|m| m.parse().unwrap()),
        }
    }

    #[test]
    fn weekday_mask_mon_to_fri() {
        let tasks = vec![task("dishes", Some("1111100"))];
        // 2025-08-06 is a Wednesday, 2025-08-09 a Saturday.
        let wednesday = NaiveDate::from_ymd_opt(2025, 8, 6).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2025, 8, 9).unwrap();
        assert_eq!(due_tasks(&tasks, wednesday).len(), 1);
        assert!(due_tasks(&tasks, saturday).is_empty());
    }

    #[test]
    fn maskless_task_always_due() {
        let tasks = vec![task("feed-cat", None)];
        let mut day = NaiveDate::from_ymd_opt(2025, 8, 4).unwrap();
        for _ in 0..7 {
            assert_eq!(due_tasks(&tasks, day).len(), 1, "not due on {day}");
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn due_tasks_keeps_original_indices() {
        let tasks = vec![
            task("weekend-only", Some("0000011")),
            task("daily", None),
            task("monday", Some("1000000")),
        ];
        let monday = NaiveDate::from_ymd_opt(2025, 8, 4).unwrap();
        let due = due_tasks(&tasks, monday);
        let indices: Vec<usize> = due.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(due[0].1.id, "daily");
        assert_eq!(due[1].1.id, "monday");
    }

    #[test]
    fn mask_parse_rejects_garbage() {
        assert!("11111".parse::<RecurrenceMask>().is_err());
        assert!("11111x1".parse::<RecurrenceMask>().is_err());
        assert!("111110011".parse::<RecurrenceMask>().is_err());
        let mask: RecurrenceMask = "1111100".parse().unwrap();
        assert_eq!(mask.to_string(), "1111100");
    }

    #[test]
    fn backdated_completion_keeps_selected_date() {
        let selected = NaiveDate::from_ymd_opt(2025, 8, 6).unwrap();
        let now = NaiveDate::from_ymd_opt(2025, 8, 7)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap();
        let resolved = resolve_completed_at(selected, now);
        assert_eq!(resolved.date(), selected);
        assert_eq!(resolved.time(), now.time());
        assert_eq!(resolved.to_string(), "2025-08-06 15:30:00");
    }

    #[test]
    fn completion_date_round_trips_across_year_boundary() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 5, 42)
            .unwrap();
        let eve = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(
            resolve_completed_at(eve, now).to_string(),
            "2024-12-31 00:05:42"
        );
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(resolve_completed_at(day, now).date(), day);
    }
}
