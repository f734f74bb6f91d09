// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::database;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use hr_common::AllocationCheck;
use hr_common::quota::{self, QuotaSummary, QuotaValidation};
use hr_common::{
    AnnualRecord, CreateAnnualRecordPayload, CreateHolidayPayload, CreateLeaveLogPayload,
    CreateMedicalExpensePayload, CreateTaskLogPayload, Holiday, LeaveCheckPayload, LeaveLog,
    LogFilter, MedicalCheckPayload, MedicalExpense, QuotaPlan, QuotaPlanPayload, RolloverPayload,
    TaskLog, UpdateLeaveLogPayload, UpdateTaskLogPayload,
};
use serde::Deserialize;
use tracing::{debug, error, info};

#[derive(Deserialize, Debug, Default)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        error!("Validation failed: {} is empty.", field);
        return Err(AppError::bad_request(&format!("{field} cannot be empty.")));
    }
    Ok(())
}

fn require_non_negative(value: f64, field: &str) -> Result<(), AppError> {
    if !value.is_finite() || value < 0.0 {
        error!("Validation failed: {} = {}.", field, value);
        return Err(AppError::bad_request(&format!(
            "{field} must be a non-negative number."
        )));
    }
    Ok(())
}

/// Day amounts are fractions of one day: 0 < value <= 1.
fn require_day_fraction(value: f64, field: &str) -> Result<(), AppError> {
    if !value.is_finite() || value <= 0.0 || value > hr_common::DAY_CAPACITY {
        error!("Validation failed: {} = {}.", field, value);
        return Err(AppError::bad_request(&format!(
            "{field} must be greater than 0 and at most 1."
        )));
    }
    Ok(())
}

fn validate_plan(payload: &QuotaPlanPayload) -> Result<(), AppError> {
    require_text(&payload.name, "Plan name")?;
    require_non_negative(payload.quota_vacation_day, "quota_vacation_day")?;
    require_non_negative(payload.quota_medical_expense_baht, "quota_medical_expense_baht")
}

/// Pro-ration date for `year`: `as_of` (today by default) pulled into the year.
fn pro_ration_date(year: i32, as_of: Option<NaiveDate>) -> Result<NaiveDate, AppError> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| AppError::bad_request(&format!("Year {year} is out of range.")))?;
    let last = NaiveDate::from_ymd_opt(year, 12, 31)
        .ok_or_else(|| AppError::bad_request(&format!("Year {year} is out of range.")))?;
    let date = as_of.unwrap_or_else(|| Utc::now().date_naive());
    Ok(date.clamp(first, last))
}

// --- Quota plans ---

pub async fn list_quota_plans(
    State(state): State<AppState>,
) -> Result<Json<Vec<QuotaPlan>>, AppError> {
    let plans = database::list_quota_plans(&state.pool).await?;
    info!("Successfully retrieved {} quota plans.", plans.len());
    Ok(Json(plans))
}

pub async fn create_quota_plan(
    State(state): State<AppState>,
    Json(payload): Json<QuotaPlanPayload>,
) -> Result<(StatusCode, Json<QuotaPlan>), AppError> {
    debug!("Received request to create quota plan: {}", payload.name);
    validate_plan(&payload)?;

    let plan = database::create_quota_plan(&state.pool, payload).await?;
    info!("Quota plan created successfully with ID: {}", plan.id);
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn update_quota_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<i64>,
    Json(payload): Json<QuotaPlanPayload>,
) -> Result<Json<QuotaPlan>, AppError> {
    debug!("Received request to update quota plan {}", plan_id);
    validate_plan(&payload)?;

    let plan = database::update_quota_plan(&state.pool, plan_id, payload).await?;
    info!("Quota plan {} updated.", plan_id);
    Ok(Json(plan))
}

// --- Holidays ---

pub async fn list_holidays(
    State(state): State<AppState>,
    Query(query): Query<YearQuery>,
) -> Result<Json<Vec<Holiday>>, AppError> {
    let holidays = database::list_holidays(&state.pool, query.year).await?;
    info!("Successfully retrieved {} holidays.", holidays.len());
    Ok(Json(holidays))
}

pub async fn create_holiday(
    State(state): State<AppState>,
    Json(payload): Json<CreateHolidayPayload>,
) -> Result<(StatusCode, Json<Holiday>), AppError> {
    require_text(&payload.name, "Holiday name")?;

    let holiday = database::create_holiday(&state.pool, payload, state.holidays()).await?;
    info!(
        "Holiday {} registered on {}.",
        holiday.name, holiday.holiday_date
    );
    Ok((StatusCode::CREATED, Json(holiday)))
}

pub async fn delete_holiday(
    State(state): State<AppState>,
    Path(holiday_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    match database::delete_holiday(&state.pool, holiday_id, state.holidays()).await? {
        Some(_) => {
            info!("Holiday with ID {} deleted successfully.", holiday_id);
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(AppError::not_found(&format!(
            "Holiday with ID {holiday_id} not found."
        ))),
    }
}

// --- Annual records and quotas ---

pub async fn create_annual_record(
    State(state): State<AppState>,
    Json(payload): Json<CreateAnnualRecordPayload>,
) -> Result<(StatusCode, Json<AnnualRecord>), AppError> {
    if let Some(rollover) = payload.rollover_vacation_day {
        require_non_negative(rollover, "rollover_vacation_day")?;
    }

    let record = database::create_annual_record(&state.pool, payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_annual_record(
    State(state): State<AppState>,
    Path((user_id, year)): Path<(i64, i32)>,
) -> Result<Json<AnnualRecord>, AppError> {
    database::get_annual_record(&state.pool, user_id, year)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::not_found(&format!("User {user_id} has no annual record for {year}."))
        })
}

pub async fn get_quota_summary(
    State(state): State<AppState>,
    Path((user_id, year)): Path<(i64, i32)>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<QuotaSummary>, AppError> {
    let as_of = pro_ration_date(year, query.as_of)?;
    let summary = database::get_quota_summary(&state.pool, user_id, year, as_of).await?;
    Ok(Json(summary))
}

pub async fn get_daily_allocation(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(i64, NaiveDate)>,
) -> Result<Json<AllocationCheck>, AppError> {
    let check = database::get_daily_allocation(&state.pool, user_id, date).await?;
    Ok(Json(check))
}

// --- Stateless pre-checks ---

pub async fn validate_leave(
    Json(payload): Json<LeaveCheckPayload>,
) -> Json<QuotaValidation> {
    let as_of = payload.as_of.unwrap_or_else(|| Utc::now().date_naive());
    Json(quota::validate_leave_quota(
        payload.quota_vacation_days,
        payload.rollover_days,
        payload.worked_on_holiday_days,
        payload.used_vacation_days,
        payload.new_leave_days,
        as_of,
    ))
}

pub async fn validate_medical(
    Json(payload): Json<MedicalCheckPayload>,
) -> Json<QuotaValidation> {
    let as_of = payload.as_of.unwrap_or_else(|| Utc::now().date_naive());
    Json(quota::validate_medical_expense(
        payload.quota_baht,
        payload.used_baht,
        payload.new_expense_baht,
        as_of,
    ))
}

// --- Task logs ---

pub async fn list_task_logs(
    State(state): State<AppState>,
    Query(filter): Query<LogFilter>,
) -> Result<Json<Vec<TaskLog>>, AppError> {
    let logs = database::list_task_logs(&state.pool, &filter).await?;
    info!("Successfully retrieved {} task logs.", logs.len());
    Ok(Json(logs))
}

pub async fn create_task_log(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskLogPayload>,
) -> Result<(StatusCode, Json<TaskLog>), AppError> {
    debug!(
        "Received request to log {} day(s) for user {} on {}",
        payload.worked_day, payload.user_id, payload.log_date
    );
    require_text(&payload.description, "Description")?;
    require_day_fraction(payload.worked_day, "worked_day")?;

    let log = database::create_task_log(&state.pool, payload, state.holidays()).await?;
    info!("Task log created successfully with ID: {}", log.id);
    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn update_task_log(
    State(state): State<AppState>,
    Path(log_id): Path<i64>,
    Json(payload): Json<UpdateTaskLogPayload>,
) -> Result<Json<TaskLog>, AppError> {
    if let Some(description) = &payload.description {
        require_text(description, "Description")?;
    }
    if let Some(worked_day) = payload.worked_day {
        require_day_fraction(worked_day, "worked_day")?;
    }

    let log = database::update_task_log(&state.pool, log_id, payload, state.holidays()).await?;
    info!("Task log {} updated.", log_id);
    Ok(Json(log))
}

pub async fn delete_task_log(
    State(state): State<AppState>,
    Path(log_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if database::soft_delete_task_log(&state.pool, log_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        error!("Task log with ID {} not found for deletion.", log_id);
        Err(AppError::not_found(&format!(
            "Task log with ID {log_id} not found for deletion."
        )))
    }
}

// --- Leave logs ---

pub async fn list_leave_logs(
    State(state): State<AppState>,
    Query(filter): Query<LogFilter>,
) -> Result<Json<Vec<LeaveLog>>, AppError> {
    let logs = database::list_leave_logs(&state.pool, &filter).await?;
    info!("Successfully retrieved {} leave logs.", logs.len());
    Ok(Json(logs))
}

pub async fn create_leave_log(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeaveLogPayload>,
) -> Result<(StatusCode, Json<LeaveLog>), AppError> {
    debug!(
        "Received {:?} leave request for user {} on {}",
        payload.leave_type, payload.user_id, payload.leave_date
    );
    if let Some(worked_day) = payload.worked_day {
        require_day_fraction(worked_day, "worked_day")?;
    }

    let log = database::create_leave_log(&state.pool, payload).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn update_leave_log(
    State(state): State<AppState>,
    Path(log_id): Path<i64>,
    Json(payload): Json<UpdateLeaveLogPayload>,
) -> Result<Json<LeaveLog>, AppError> {
    if let Some(worked_day) = payload.worked_day {
        require_day_fraction(worked_day, "worked_day")?;
    }

    let log = database::update_leave_log(&state.pool, log_id, payload).await?;
    info!("Leave log {} updated.", log_id);
    Ok(Json(log))
}

pub async fn delete_leave_log(
    State(state): State<AppState>,
    Path(log_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if database::soft_delete_leave_log(&state.pool, log_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        error!("Leave log with ID {} not found for deletion.", log_id);
        Err(AppError::not_found(&format!(
            "Leave log with ID {log_id} not found for deletion."
        )))
    }
}

// --- Medical expenses ---

pub async fn list_medical_expenses(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<YearQuery>,
) -> Result<Json<Vec<MedicalExpense>>, AppError> {
    let expenses = database::list_medical_expenses(&state.pool, user_id, query.year).await?;
    Ok(Json(expenses))
}

pub async fn create_medical_expense(
    State(state): State<AppState>,
    Json(payload): Json<CreateMedicalExpensePayload>,
) -> Result<(StatusCode, Json<MedicalExpense>), AppError> {
    require_text(&payload.description, "Description")?;
    if !payload.amount_baht.is_finite() || payload.amount_baht <= 0.0 {
        error!("Validation failed: amount_baht = {}.", payload.amount_baht);
        return Err(AppError::bad_request("amount_baht must be greater than 0."));
    }

    let expense = database::create_medical_expense(&state.pool, payload).await?;
    info!(
        "Medical expense {} of {:.2} baht recorded for user {}.",
        expense.id, expense.amount_baht, expense.user_id
    );
    Ok((StatusCode::CREATED, Json(expense)))
}

// --- Year-end rollover ---

pub async fn rollover_annual_records(
    State(state): State<AppState>,
    Json(payload): Json<RolloverPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    debug!("Received request to roll over year {}.", payload.from_year);
    let max_rollover_days = payload
        .max_rollover_days
        .unwrap_or(state.config.max_rollover_days);
    require_non_negative(max_rollover_days, "max_rollover_days")?;

    let count = database::rollover_year(
        &state.pool,
        payload.from_year,
        max_rollover_days,
        payload.quota_plan_id,
    )
    .await?;

    let to_year = payload.from_year + 1;
    Ok(Json(serde_json::json!({
        "message": format!("Successfully rolled over {} annual records into {}.", count, to_year),
        "records_created": count,
        "to_year": to_year,
    })))
}
