// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod allocation;
pub mod calendar;
pub mod quota;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use allocation::{AllocationCheck, AllocationEntry, DAY_CAPACITY, LogRef};
pub use calendar::HolidayCalendar;
pub use quota::{QuotaSummary, QuotaValidation};

/// A named bundle of annual allowances.
///
/// Annual records point at a plan instead of copying its numbers, so editing
/// a plan changes the allowance of every record linked to it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct QuotaPlan {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub quota_vacation_day: f64,
    pub quota_medical_expense_baht: f64,
    pub created_at: DateTime<Utc>,
}

/// Payload used to create a quota plan or replace its allowances.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuotaPlanPayload {
    pub name: String,
    pub year: i32,
    pub quota_vacation_day: f64,
    pub quota_medical_expense_baht: f64,
}

/// Per-user, per-year ledger of what has been consumed.
///
/// There is at most one record per `(user_id, year)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AnnualRecord {
    pub id: i64,
    pub user_id: i64,
    pub year: i32,
    pub quota_plan_id: i64,
    pub rollover_vacation_day: f64,
    pub used_vacation_day: f64,
    pub used_sick_leave_day: f64,
    pub worked_on_holiday_day: f64,
    pub used_medical_expense_baht: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateAnnualRecordPayload {
    pub user_id: i64,
    pub year: i32,
    pub quota_plan_id: i64,
    // Days carried over from last year; zero when omitted.
    pub rollover_vacation_day: Option<f64>,
}

/// A slice of a working day spent on a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskLog {
    pub id: i64,
    pub user_id: i64,
    pub log_date: NaiveDate,
    pub description: String,
    // Fraction of a day, 0 < worked_day <= 1.
    pub worked_day: f64,
    // Set when `log_date` is a weekend or a registered holiday.
    pub is_work_on_holiday: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateTaskLogPayload {
    pub user_id: i64,
    pub log_date: NaiveDate,
    pub description: String,
    pub worked_day: f64,
}

/// Partial update of a task log. Fields left out keep their current value.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateTaskLogPayload {
    pub log_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub worked_day: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LeaveType {
    Vacation,
    Sick,
}

/// A day (or part of a day) of leave.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LeaveLog {
    pub id: i64,
    pub user_id: i64,
    pub leave_date: NaiveDate,
    pub leave_type: LeaveType,
    // A missing amount counts as a full day.
    pub worked_day: Option<f64>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LeaveLog {
    /// Day units consumed by this leave.
    pub fn day_units(&self) -> f64 {
        self.worked_day.unwrap_or(DAY_CAPACITY)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateLeaveLogPayload {
    pub user_id: i64,
    pub leave_date: NaiveDate,
    pub leave_type: LeaveType,
    pub worked_day: Option<f64>,
    pub reason: Option<String>,
}

/// Partial update of a leave log. Fields left out keep their current value.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateLeaveLogPayload {
    pub leave_date: Option<NaiveDate>,
    pub leave_type: Option<LeaveType>,
    pub worked_day: Option<f64>,
    pub reason: Option<String>,
}

/// A calendar date marked as non-working.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Holiday {
    pub id: i64,
    pub holiday_date: NaiveDate,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateHolidayPayload {
    pub holiday_date: NaiveDate,
    pub name: String,
}

/// A reimbursement claim counted against the medical budget.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MedicalExpense {
    pub id: i64,
    pub user_id: i64,
    pub expense_date: NaiveDate,
    pub amount_baht: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateMedicalExpensePayload {
    pub user_id: i64,
    pub expense_date: NaiveDate,
    pub amount_baht: f64,
    pub description: String,
}

/// Input of the stateless leave pre-check.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LeaveCheckPayload {
    pub quota_vacation_days: f64,
    pub rollover_days: f64,
    pub worked_on_holiday_days: f64,
    pub used_vacation_days: f64,
    pub new_leave_days: f64,
    // Pro-ration date; today when omitted.
    pub as_of: Option<NaiveDate>,
}

/// Input of the stateless medical pre-check.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MedicalCheckPayload {
    pub quota_baht: f64,
    pub used_baht: f64,
    pub new_expense_baht: f64,
    pub as_of: Option<NaiveDate>,
}

/// Query-string filter for log listings.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LogFilter {
    pub user_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Request body of the year-end rollover.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RolloverPayload {
    pub from_year: i32,
    // Falls back to the server's configured cap.
    pub max_rollover_days: Option<f64>,
    // Plan for the new records; each user keeps their current plan otherwise.
    pub quota_plan_id: Option<i64>,
}
