// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Daily allocation guard.
//!
//! Task work and leave share one budget per user and calendar date: their day
//! units must not add up to more than [`DAY_CAPACITY`]. Every write path
//! (creating or editing a task log, creating a leave log) goes through
//! [`check_allocation`].
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{LeaveLog, TaskLog};

/// Day units available per user and calendar date.
pub const DAY_CAPACITY: f64 = 1.0;

// Absorbs binary rounding, e.g. 0.6 + 0.3 + 0.1.
const ALLOCATION_TOLERANCE: f64 = 1e-9;

/// Identifies a log row. Task and leave ids come from different tables, so
/// the kind is part of the identity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum LogRef {
    Task(i64),
    Leave(i64),
}

/// One row's claim on a date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationEntry {
    pub log: LogRef,
    pub date: NaiveDate,
    pub day_units: f64,
}

impl From<&TaskLog> for AllocationEntry {
    fn from(log: &TaskLog) -> Self {
        Self {
            log: LogRef::Task(log.id),
            date: log.log_date,
            day_units: log.worked_day,
        }
    }
}

impl From<&LeaveLog> for AllocationEntry {
    fn from(log: &LeaveLog) -> Self {
        Self {
            log: LogRef::Leave(log.id),
            date: log.leave_date,
            day_units: log.day_units(),
        }
    }
}

/// Builds the entry list from both kinds of logs.
pub fn entries_from_logs(task_logs: &[TaskLog], leave_logs: &[LeaveLog]) -> Vec<AllocationEntry> {
    task_logs
        .iter()
        .map(AllocationEntry::from)
        .chain(leave_logs.iter().map(AllocationEntry::from))
        .collect()
}

/// Day units already claimed on `date`, ignoring `exclude` (the row being edited).
pub fn allocated_on(date: NaiveDate, entries: &[AllocationEntry], exclude: Option<LogRef>) -> f64 {
    entries
        .iter()
        .filter(|entry| entry.date == date)
        .filter(|entry| Some(entry.log) != exclude)
        .map(|entry| entry.day_units)
        .sum()
}

/// What is left of the day, never below zero.
pub fn remaining_on(date: NaiveDate, entries: &[AllocationEntry], exclude: Option<LogRef>) -> f64 {
    (DAY_CAPACITY - allocated_on(date, entries, exclude)).max(0.0)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AllocationCheck {
    pub date: NaiveDate,
    pub allocated: f64,
    pub remaining: f64,
    pub proposed: f64,
    pub is_valid: bool,
}

impl AllocationCheck {
    pub fn message(&self) -> String {
        if self.is_valid {
            format!(
                "{:.2} of a day remains on {} after this entry.",
                (self.remaining - self.proposed).max(0.0),
                self.date
            )
        } else {
            format!(
                "Only {:.2} of a day is left on {}; {:.2} was requested.",
                self.remaining, self.date, self.proposed
            )
        }
    }
}

/// Checks whether `proposed` more day units fit on `date`.
///
/// The cap is inclusive: filling the day exactly is accepted.
pub fn check_allocation(
    date: NaiveDate,
    entries: &[AllocationEntry],
    exclude: Option<LogRef>,
    proposed: f64,
) -> AllocationCheck {
    let allocated = allocated_on(date, entries, exclude);
    AllocationCheck {
        date,
        allocated,
        remaining: (DAY_CAPACITY - allocated).max(0.0),
        proposed,
        is_valid: allocated + proposed <= DAY_CAPACITY + ALLOCATION_TOLERANCE,
    }
}
