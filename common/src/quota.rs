// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Pro-rated quota arithmetic.
//!
//! An annual allowance accrues linearly over the year: by a given date the
//! holder is entitled to `quota * days_passed / days_in_year`. Rollover days
//! and days credited for working on holidays are not time-gated and count in
//! full from January 1st.
//!
//! Every function here is pure. Nothing is sanitized: a `NaN` input
//! propagates into the result and makes it invalid.
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::{days_in_year, days_passed_in_year};
use crate::{AnnualRecord, QuotaPlan};

/// Share of `quota` accrued after `days_passed` out of `days_in_year` days.
pub fn pro_rated(quota: f64, days_passed: u32, days_in_year: u32) -> f64 {
    quota * f64::from(days_passed) / f64::from(days_in_year)
}

/// Share of `quota` accrued on `as_of`, Jan 1st counting as the first day.
pub fn pro_rated_as_of(quota: f64, as_of: NaiveDate) -> f64 {
    pro_rated(
        quota,
        days_passed_in_year(as_of),
        days_in_year(as_of.year()),
    )
}

/// Outcome of a quota check, shaped for form-disable logic on the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaValidation {
    pub is_valid: bool,
    pub remaining_before: f64,
    pub remaining_after: f64,
    pub message: String,
}

/// Checks a new medical expense against the budget accrued on `as_of`.
pub fn validate_medical_expense(
    quota_baht: f64,
    used_baht: f64,
    new_expense_baht: f64,
    as_of: NaiveDate,
) -> QuotaValidation {
    validate_medical_expense_at(
        quota_baht,
        used_baht,
        new_expense_baht,
        days_passed_in_year(as_of),
        days_in_year(as_of.year()),
    )
}

/// Same as [`validate_medical_expense`] with an explicit time fraction.
pub fn validate_medical_expense_at(
    quota_baht: f64,
    used_baht: f64,
    new_expense_baht: f64,
    days_passed: u32,
    days_in_year: u32,
) -> QuotaValidation {
    let remaining_before = pro_rated(quota_baht, days_passed, days_in_year) - used_baht;
    let remaining_after = remaining_before - new_expense_baht;
    let is_valid = remaining_after >= 0.0;

    let message = if is_valid {
        format!(
            "Remaining medical budget: {:.2} baht (before this expense: {:.2} baht).",
            remaining_after, remaining_before
        )
    } else {
        format!(
            "Medical expense exceeds the available budget by {:.2} baht (available: {:.2} baht).",
            -remaining_after, remaining_before
        )
    };

    QuotaValidation {
        is_valid,
        remaining_before,
        remaining_after,
        message,
    }
}

/// Checks a new leave against the vacation days available on `as_of`.
pub fn validate_leave_quota(
    quota_vacation_days: f64,
    rollover_days: f64,
    worked_on_holiday_days: f64,
    used_vacation_days: f64,
    new_leave_days: f64,
    as_of: NaiveDate,
) -> QuotaValidation {
    validate_leave_quota_at(
        quota_vacation_days,
        rollover_days,
        worked_on_holiday_days,
        used_vacation_days,
        new_leave_days,
        days_passed_in_year(as_of),
        days_in_year(as_of.year()),
    )
}

/// Same as [`validate_leave_quota`] with an explicit time fraction.
pub fn validate_leave_quota_at(
    quota_vacation_days: f64,
    rollover_days: f64,
    worked_on_holiday_days: f64,
    used_vacation_days: f64,
    new_leave_days: f64,
    days_passed: u32,
    days_in_year: u32,
) -> QuotaValidation {
    let remaining_before = rollover_days
        + worked_on_holiday_days
        + pro_rated(quota_vacation_days, days_passed, days_in_year)
        - used_vacation_days;
    let remaining_after = remaining_before - new_leave_days;
    let is_valid = remaining_after >= 0.0;

    let message = if is_valid {
        format!(
            "Remaining vacation: {:.1} days (before this leave: {:.1} days).",
            remaining_after, remaining_before
        )
    } else {
        format!(
            "Leave exceeds the available vacation quota by {:.1} days (available: {:.1} days).",
            -remaining_after, remaining_before
        )
    };

    QuotaValidation {
        is_valid,
        remaining_before,
        remaining_after,
        message,
    }
}

/// Vacation balance once the whole annual quota has accrued.
pub fn year_end_vacation_balance(record: &AnnualRecord, plan: &QuotaPlan) -> f64 {
    record.rollover_vacation_day + record.worked_on_holiday_day + plan.quota_vacation_day
        - record.used_vacation_day
}

/// Snapshot of what a user has accrued and what is left on a given date.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuotaSummary {
    pub user_id: i64,
    pub year: i32,
    pub as_of: NaiveDate,
    pub quota_plan_id: i64,
    pub accrued_vacation_day: f64,
    pub available_vacation_day: f64,
    pub remaining_vacation_day: f64,
    pub used_sick_leave_day: f64,
    pub accrued_medical_expense_baht: f64,
    pub remaining_medical_expense_baht: f64,
}

impl QuotaSummary {
    pub fn compute(record: &AnnualRecord, plan: &QuotaPlan, as_of: NaiveDate) -> Self {
        let accrued_vacation_day = pro_rated_as_of(plan.quota_vacation_day, as_of);
        let available_vacation_day =
            record.rollover_vacation_day + record.worked_on_holiday_day + accrued_vacation_day;
        let accrued_medical_expense_baht = pro_rated_as_of(plan.quota_medical_expense_baht, as_of);

        Self {
            user_id: record.user_id,
            year: record.year,
            as_of,
            quota_plan_id: plan.id,
            accrued_vacation_day,
            available_vacation_day,
            remaining_vacation_day: available_vacation_day - record.used_vacation_day,
            used_sick_leave_day: record.used_sick_leave_day,
            accrued_medical_expense_baht,
            remaining_medical_expense_baht: accrued_medical_expense_baht
                - record.used_medical_expense_baht,
        }
    }
}
