// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate, Utc};
use hr_common::allocation::{self, AllocationCheck, AllocationEntry, LogRef};
use hr_common::quota::{self, QuotaSummary};
use hr_common::{
    AnnualRecord, CreateAnnualRecordPayload, CreateHolidayPayload, CreateLeaveLogPayload,
    CreateMedicalExpensePayload, CreateTaskLogPayload, Holiday, HolidayCalendar, LeaveLog,
    LeaveType, LogFilter, MedicalExpense, QuotaPlan, QuotaPlanPayload, TaskLog,
    UpdateLeaveLogPayload, UpdateTaskLogPayload,
};
use parking_lot::RwLock;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction, migrate::MigrateDatabase};
use tracing::{debug, info, warn};

use crate::error::LedgerError;

/// Table definitions, applied in order on every startup.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS quota_plans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        year INTEGER NOT NULL,
        quota_vacation_day REAL NOT NULL,
        quota_medical_expense_baht REAL NOT NULL,
        created_at TIMESTAMP NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS annual_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        year INTEGER NOT NULL,
        quota_plan_id INTEGER NOT NULL REFERENCES quota_plans(id),
        rollover_vacation_day REAL NOT NULL DEFAULT 0.0,
        used_vacation_day REAL NOT NULL DEFAULT 0.0,
        used_sick_leave_day REAL NOT NULL DEFAULT 0.0,
        worked_on_holiday_day REAL NOT NULL DEFAULT 0.0,
        used_medical_expense_baht REAL NOT NULL DEFAULT 0.0,
        UNIQUE (user_id, year)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS holidays (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        holiday_date DATE NOT NULL UNIQUE,
        name TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        log_date DATE NOT NULL,
        description TEXT NOT NULL,
        worked_day REAL NOT NULL,
        is_work_on_holiday BOOLEAN NOT NULL,
        created_at TIMESTAMP NOT NULL,
        deleted_at TIMESTAMP WITH TIME ZONE NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS leave_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        leave_date DATE NOT NULL,
        leave_type TEXT NOT NULL,
        worked_day REAL NULL,
        reason TEXT NULL,
        created_at TIMESTAMP NOT NULL,
        deleted_at TIMESTAMP WITH TIME ZONE NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS medical_expenses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        expense_date DATE NOT NULL,
        amount_baht REAL NOT NULL,
        description TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_task_logs_user_date ON task_logs (user_id, log_date);",
    "CREATE INDEX IF NOT EXISTS idx_leave_logs_user_date ON leave_logs (user_id, leave_date);",
];

/// Establishes the database connection pool.
/// If the database does not exist, it creates it (and its parent directory).
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        ensure_parent_dir(database_url)?;
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the schema applied.
///
/// Every connection to `sqlite::memory:` opens its own database, so the pool
/// is pinned to one connection that never expires.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;

    init_schema(&pool).await?;

    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to apply schema statement: {}", statement.trim()))?;
    }
    info!("Database schema is ready.");
    Ok(())
}

fn ensure_parent_dir(database_url: &str) -> Result<()> {
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Write transaction that holds SQLite's write lock from its first statement.
///
/// Concurrent writers queue on the busy timeout and read the committed state
/// once they get the lock.
async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .context("Failed to begin write transaction")
}

fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1).context("Year out of range")?;
    let last = NaiveDate::from_ymd_opt(year, 12, 31).context("Year out of range")?;
    Ok((first, last))
}

// --- Quota plans ---

pub async fn list_quota_plans(pool: &SqlitePool) -> Result<Vec<QuotaPlan>> {
    sqlx::query_as::<_, QuotaPlan>("SELECT * FROM quota_plans ORDER BY year DESC, name ASC")
        .fetch_all(pool)
        .await
        .context("Failed to retrieve quota plans from DB")
}

pub async fn create_quota_plan(pool: &SqlitePool, payload: QuotaPlanPayload) -> Result<QuotaPlan> {
    let created_at = Utc::now();
    debug!(
        "Insert quota plan: name={}, year={}, vacation={}, medical={}",
        payload.name, payload.year, payload.quota_vacation_day, payload.quota_medical_expense_baht
    );

    let id = sqlx::query(
        "INSERT INTO quota_plans (name, year, quota_vacation_day, quota_medical_expense_baht, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(payload.year)
    .bind(payload.quota_vacation_day)
    .bind(payload.quota_medical_expense_baht)
    .bind(created_at)
    .execute(pool)
    .await
    .context("Failed to insert quota plan into DB")?
    .last_insert_rowid();

    Ok(QuotaPlan {
        id,
        name: payload.name,
        year: payload.year,
        quota_vacation_day: payload.quota_vacation_day,
        quota_medical_expense_baht: payload.quota_medical_expense_baht,
        created_at,
    })
}

/// Replaces the allowances of a plan. Every annual record linked to it sees
/// the new numbers immediately.
pub async fn update_quota_plan(
    pool: &SqlitePool,
    plan_id: i64,
    payload: QuotaPlanPayload,
) -> Result<QuotaPlan> {
    let result = sqlx::query(
        "UPDATE quota_plans SET name = ?, year = ?, quota_vacation_day = ?, quota_medical_expense_baht = ? WHERE id = ?",
    )
    .bind(&payload.name)
    .bind(payload.year)
    .bind(payload.quota_vacation_day)
    .bind(payload.quota_medical_expense_baht)
    .bind(plan_id)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to update quota plan with ID: {plan_id}"))?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::NotFound(format!("Quota plan with ID {plan_id} not found.")).into());
    }

    let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
    fetch_quota_plan(&mut conn, plan_id)
        .await?
        .ok_or_else(|| anyhow!("Quota plan {plan_id} vanished after update"))
}

async fn fetch_quota_plan(conn: &mut SqliteConnection, plan_id: i64) -> Result<Option<QuotaPlan>> {
    sqlx::query_as::<_, QuotaPlan>("SELECT * FROM quota_plans WHERE id = ?")
        .bind(plan_id)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("Failed to retrieve quota plan with ID: {plan_id}"))
}

// --- Holidays ---

/// Lists holidays, optionally restricted to one calendar year.
pub async fn list_holidays(pool: &SqlitePool, year: Option<i32>) -> Result<Vec<Holiday>> {
    let query = match year {
        Some(year) => {
            let (first, last) = year_bounds(year)?;
            sqlx::query_as::<_, Holiday>(
                "SELECT * FROM holidays WHERE holiday_date BETWEEN ? AND ? ORDER BY holiday_date ASC",
            )
            .bind(first)
            .bind(last)
        }
        None => sqlx::query_as::<_, Holiday>("SELECT * FROM holidays ORDER BY holiday_date ASC"),
    };

    query
        .fetch_all(pool)
        .await
        .context("Failed to retrieve holidays from DB")
}

/// Registers a holiday. The calendar cache learns about it while the write
/// lock is still held, so no task log can be written against a stale cache.
pub async fn create_holiday(
    pool: &SqlitePool,
    payload: CreateHolidayPayload,
    holidays: &RwLock<HolidayCalendar>,
) -> Result<Holiday> {
    let mut tx = begin_write(pool).await?;

    let existing: Option<Holiday> =
        sqlx::query_as("SELECT * FROM holidays WHERE holiday_date = ?")
            .bind(payload.holiday_date)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to look up holiday")?;
    if let Some(existing) = existing {
        return Err(LedgerError::Conflict(format!(
            "{} is already registered as holiday '{}'.",
            existing.holiday_date, existing.name
        ))
        .into());
    }

    let id = sqlx::query("INSERT INTO holidays (holiday_date, name) VALUES (?, ?)")
        .bind(payload.holiday_date)
        .bind(&payload.name)
        .execute(&mut *tx)
        .await
        .context("Failed to insert holiday into DB")?
        .last_insert_rowid();

    holidays.write().insert(payload.holiday_date);
    if let Err(e) = tx.commit().await {
        holidays.write().remove(&payload.holiday_date);
        return Err(e).context("Failed to commit holiday");
    }

    Ok(Holiday {
        id,
        holiday_date: payload.holiday_date,
        name: payload.name,
    })
}

/// Deletes a holiday and returns it, or `None` if no holiday has that ID.
pub async fn delete_holiday(
    pool: &SqlitePool,
    holiday_id: i64,
    holidays: &RwLock<HolidayCalendar>,
) -> Result<Option<Holiday>> {
    let mut tx = begin_write(pool).await?;

    let holiday: Option<Holiday> = sqlx::query_as("SELECT * FROM holidays WHERE id = ?")
        .bind(holiday_id)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("Failed to retrieve holiday with ID: {holiday_id}"))?;

    let Some(holiday) = holiday else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM holidays WHERE id = ?")
        .bind(holiday_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to delete holiday with ID: {holiday_id}"))?;

    holidays.write().remove(&holiday.holiday_date);
    if let Err(e) = tx.commit().await {
        holidays.write().insert(holiday.holiday_date);
        return Err(e).context("Failed to commit holiday deletion");
    }
    Ok(Some(holiday))
}

// --- Annual records ---

pub async fn create_annual_record(
    pool: &SqlitePool,
    payload: CreateAnnualRecordPayload,
) -> Result<AnnualRecord> {
    let mut tx = begin_write(pool).await?;

    if fetch_quota_plan(&mut tx, payload.quota_plan_id).await?.is_none() {
        return Err(LedgerError::NotFound(format!(
            "Quota plan with ID {} not found.",
            payload.quota_plan_id
        ))
        .into());
    }
    if fetch_annual_record(&mut tx, payload.user_id, payload.year)
        .await?
        .is_some()
    {
        return Err(LedgerError::Conflict(format!(
            "User {} already has an annual record for {}.",
            payload.user_id, payload.year
        ))
        .into());
    }

    let record = insert_annual_record(
        &mut tx,
        payload.user_id,
        payload.year,
        payload.quota_plan_id,
        payload.rollover_vacation_day.unwrap_or(0.0),
    )
    .await?;

    tx.commit().await.context("Failed to commit annual record")?;
    info!(
        "Created annual record {} for user {} in {}.",
        record.id, record.user_id, record.year
    );
    Ok(record)
}

async fn insert_annual_record(
    conn: &mut SqliteConnection,
    user_id: i64,
    year: i32,
    quota_plan_id: i64,
    rollover_vacation_day: f64,
) -> Result<AnnualRecord> {
    let id = sqlx::query(
        "INSERT INTO annual_records (user_id, year, quota_plan_id, rollover_vacation_day, used_vacation_day, used_sick_leave_day, worked_on_holiday_day, used_medical_expense_baht) VALUES (?, ?, ?, ?, 0.0, 0.0, 0.0, 0.0)",
    )
    .bind(user_id)
    .bind(year)
    .bind(quota_plan_id)
    .bind(rollover_vacation_day)
    .execute(&mut *conn)
    .await
    .context("Failed to insert annual record into DB")?
    .last_insert_rowid();

    Ok(AnnualRecord {
        id,
        user_id,
        year,
        quota_plan_id,
        rollover_vacation_day,
        used_vacation_day: 0.0,
        used_sick_leave_day: 0.0,
        worked_on_holiday_day: 0.0,
        used_medical_expense_baht: 0.0,
    })
}

pub async fn get_annual_record(
    pool: &SqlitePool,
    user_id: i64,
    year: i32,
) -> Result<Option<AnnualRecord>> {
    let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
    fetch_annual_record(&mut conn, user_id, year).await
}

async fn fetch_annual_record(
    conn: &mut SqliteConnection,
    user_id: i64,
    year: i32,
) -> Result<Option<AnnualRecord>> {
    sqlx::query_as::<_, AnnualRecord>("SELECT * FROM annual_records WHERE user_id = ? AND year = ?")
        .bind(user_id)
        .bind(year)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("Failed to retrieve annual record of user {user_id} for {year}"))
}

/// Loads the record of `user_id` for `year` together with its plan.
async fn require_record_with_plan(
    conn: &mut SqliteConnection,
    user_id: i64,
    year: i32,
) -> Result<(AnnualRecord, QuotaPlan)> {
    let record = fetch_annual_record(conn, user_id, year)
        .await?
        .ok_or_else(|| {
            LedgerError::NotFound(format!("User {user_id} has no annual record for {year}."))
        })?;
    let plan = fetch_quota_plan(conn, record.quota_plan_id)
        .await?
        .ok_or_else(|| {
            anyhow!(
                "Quota plan {} referenced by annual record {} is missing",
                record.quota_plan_id,
                record.id
            )
        })?;
    Ok((record, plan))
}

/// Accrued and remaining allowances of a user on `as_of`.
pub async fn get_quota_summary(
    pool: &SqlitePool,
    user_id: i64,
    year: i32,
    as_of: NaiveDate,
) -> Result<QuotaSummary> {
    let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
    let (record, plan) = require_record_with_plan(&mut conn, user_id, year).await?;
    Ok(QuotaSummary::compute(&record, &plan, as_of))
}

async fn adjust_holiday_credit(
    conn: &mut SqliteConnection,
    user_id: i64,
    date: NaiveDate,
    delta: f64,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE annual_records SET worked_on_holiday_day = worked_on_holiday_day + ? WHERE user_id = ? AND year = ?",
    )
    .bind(delta)
    .bind(user_id)
    .bind(date.year())
    .execute(&mut *conn)
    .await
    .context("Failed to update holiday-work credit")?;

    if result.rows_affected() == 0 {
        warn!(
            "User {} has no annual record for {}; holiday-work credit of {} not recorded.",
            user_id,
            date.year(),
            delta
        );
    }
    Ok(())
}

async fn adjust_leave_usage(
    conn: &mut SqliteConnection,
    user_id: i64,
    date: NaiveDate,
    leave_type: LeaveType,
    delta: f64,
) -> Result<()> {
    let sql = match leave_type {
        LeaveType::Vacation => {
            "UPDATE annual_records SET used_vacation_day = used_vacation_day + ? WHERE user_id = ? AND year = ?"
        }
        LeaveType::Sick => {
            "UPDATE annual_records SET used_sick_leave_day = used_sick_leave_day + ? WHERE user_id = ? AND year = ?"
        }
    };

    let result = sqlx::query(sql)
        .bind(delta)
        .bind(user_id)
        .bind(date.year())
        .execute(&mut *conn)
        .await
        .context("Failed to update leave usage")?;

    if result.rows_affected() == 0 {
        warn!(
            "User {} has no annual record for {}; leave usage of {} not recorded.",
            user_id,
            date.year(),
            delta
        );
    }
    Ok(())
}

// --- Daily allocation ---

async fn allocation_entries_on(
    conn: &mut SqliteConnection,
    user_id: i64,
    date: NaiveDate,
) -> Result<Vec<AllocationEntry>> {
    let task_logs: Vec<TaskLog> = sqlx::query_as(
        "SELECT * FROM task_logs WHERE user_id = ? AND log_date = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .bind(date)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to retrieve task logs for allocation")?;

    let leave_logs: Vec<LeaveLog> = sqlx::query_as(
        "SELECT * FROM leave_logs WHERE user_id = ? AND leave_date = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .bind(date)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to retrieve leave logs for allocation")?;

    Ok(allocation::entries_from_logs(&task_logs, &leave_logs))
}

/// Rejects the write when `proposed` day units no longer fit on `date`.
async fn ensure_allocation(
    conn: &mut SqliteConnection,
    user_id: i64,
    date: NaiveDate,
    exclude: Option<LogRef>,
    proposed: f64,
) -> Result<()> {
    let entries = allocation_entries_on(conn, user_id, date).await?;
    let check = allocation::check_allocation(date, &entries, exclude, proposed);
    debug!(
        "Allocation check for user {} on {}: allocated={}, proposed={}, valid={}",
        user_id, date, check.allocated, proposed, check.is_valid
    );
    if !check.is_valid {
        return Err(LedgerError::Rejected(check.message()).into());
    }
    Ok(())
}

/// Day units already claimed by a user on `date`.
pub async fn get_daily_allocation(
    pool: &SqlitePool,
    user_id: i64,
    date: NaiveDate,
) -> Result<AllocationCheck> {
    let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
    let entries = allocation_entries_on(&mut conn, user_id, date).await?;
    Ok(allocation::check_allocation(date, &entries, None, 0.0))
}

// --- Task logs ---

pub async fn list_task_logs(pool: &SqlitePool, filter: &LogFilter) -> Result<Vec<TaskLog>> {
    sqlx::query_as::<_, TaskLog>(
        "SELECT * FROM task_logs WHERE deleted_at IS NULL AND (? IS NULL OR user_id = ?) AND (? IS NULL OR log_date >= ?) AND (? IS NULL OR log_date <= ?) ORDER BY log_date ASC, id ASC",
    )
    .bind(filter.user_id)
    .bind(filter.user_id)
    .bind(filter.from)
    .bind(filter.from)
    .bind(filter.to)
    .bind(filter.to)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve task logs from DB")
}

async fn fetch_live_task_log(conn: &mut SqliteConnection, log_id: i64) -> Result<Option<TaskLog>> {
    sqlx::query_as::<_, TaskLog>("SELECT * FROM task_logs WHERE id = ? AND deleted_at IS NULL")
        .bind(log_id)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("Failed to retrieve task log with ID: {log_id}"))
}

/// Inserts a task log once the day has room for it. Work on a weekend or
/// holiday is flagged and credited to the user's annual record; the holiday
/// cache is read under the write lock that holiday changes also take.
pub async fn create_task_log(
    pool: &SqlitePool,
    payload: CreateTaskLogPayload,
    holidays: &RwLock<HolidayCalendar>,
) -> Result<TaskLog> {
    let mut tx = begin_write(pool).await?;

    ensure_allocation(
        &mut tx,
        payload.user_id,
        payload.log_date,
        None,
        payload.worked_day,
    )
    .await?;

    let is_work_on_holiday = holidays.read().is_non_working(payload.log_date);
    let created_at = Utc::now();

    let id = sqlx::query(
        "INSERT INTO task_logs (user_id, log_date, description, worked_day, is_work_on_holiday, created_at, deleted_at) VALUES (?, ?, ?, ?, ?, ?, NULL)",
    )
    .bind(payload.user_id)
    .bind(payload.log_date)
    .bind(&payload.description)
    .bind(payload.worked_day)
    .bind(is_work_on_holiday)
    .bind(created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to insert task log into DB")?
    .last_insert_rowid();

    if is_work_on_holiday {
        adjust_holiday_credit(&mut tx, payload.user_id, payload.log_date, payload.worked_day)
            .await?;
    }

    tx.commit().await.context("Failed to commit task log")?;

    Ok(TaskLog {
        id,
        user_id: payload.user_id,
        log_date: payload.log_date,
        description: payload.description,
        worked_day: payload.worked_day,
        is_work_on_holiday,
        created_at,
        deleted_at: None,
    })
}

/// Edits a task log. The row's own previous amount is left out of the
/// allocation check.
pub async fn update_task_log(
    pool: &SqlitePool,
    log_id: i64,
    payload: UpdateTaskLogPayload,
    holidays: &RwLock<HolidayCalendar>,
) -> Result<TaskLog> {
    let mut tx = begin_write(pool).await?;

    let current = fetch_live_task_log(&mut tx, log_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Task log with ID {log_id} not found.")))?;

    let log_date = payload.log_date.unwrap_or(current.log_date);
    let worked_day = payload.worked_day.unwrap_or(current.worked_day);
    let description = payload
        .description
        .unwrap_or_else(|| current.description.clone());

    ensure_allocation(
        &mut tx,
        current.user_id,
        log_date,
        Some(LogRef::Task(log_id)),
        worked_day,
    )
    .await?;

    let is_work_on_holiday = holidays.read().is_non_working(log_date);
    if current.is_work_on_holiday {
        adjust_holiday_credit(&mut tx, current.user_id, current.log_date, -current.worked_day)
            .await?;
    }
    if is_work_on_holiday {
        adjust_holiday_credit(&mut tx, current.user_id, log_date, worked_day).await?;
    }

    sqlx::query(
        "UPDATE task_logs SET log_date = ?, description = ?, worked_day = ?, is_work_on_holiday = ? WHERE id = ?",
    )
    .bind(log_date)
    .bind(&description)
    .bind(worked_day)
    .bind(is_work_on_holiday)
    .bind(log_id)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("Failed to update task log with ID: {log_id}"))?;

    tx.commit().await.context("Failed to commit task log update")?;

    Ok(TaskLog {
        log_date,
        description,
        worked_day,
        is_work_on_holiday,
        ..current
    })
}

/// Soft deletes a task log and withdraws its holiday-work credit.
/// Returns false if no live task log has this ID.
pub async fn soft_delete_task_log(pool: &SqlitePool, log_id: i64) -> Result<bool> {
    debug!("Attempting to soft delete task log with ID: {}", log_id);
    let mut tx = begin_write(pool).await?;

    let Some(current) = fetch_live_task_log(&mut tx, log_id).await? else {
        return Ok(false);
    };

    sqlx::query("UPDATE task_logs SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(Utc::now())
        .bind(log_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to soft delete task log with ID: {log_id}"))?;

    if current.is_work_on_holiday {
        adjust_holiday_credit(&mut tx, current.user_id, current.log_date, -current.worked_day)
            .await?;
    }

    tx.commit().await.context("Failed to commit task log deletion")?;
    info!("Soft deleted task log {}.", log_id);
    Ok(true)
}

// --- Leave logs ---

pub async fn list_leave_logs(pool: &SqlitePool, filter: &LogFilter) -> Result<Vec<LeaveLog>> {
    sqlx::query_as::<_, LeaveLog>(
        "SELECT * FROM leave_logs WHERE deleted_at IS NULL AND (? IS NULL OR user_id = ?) AND (? IS NULL OR leave_date >= ?) AND (? IS NULL OR leave_date <= ?) ORDER BY leave_date ASC, id ASC",
    )
    .bind(filter.user_id)
    .bind(filter.user_id)
    .bind(filter.from)
    .bind(filter.from)
    .bind(filter.to)
    .bind(filter.to)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve leave logs from DB")
}

/// Inserts a leave log. Vacation must fit in the quota accrued by the leave
/// date; every kind of leave must fit in the day.
pub async fn create_leave_log(pool: &SqlitePool, payload: CreateLeaveLogPayload) -> Result<LeaveLog> {
    let mut tx = begin_write(pool).await?;

    let created_at = Utc::now();
    let leave = LeaveLog {
        id: 0,
        user_id: payload.user_id,
        leave_date: payload.leave_date,
        leave_type: payload.leave_type,
        worked_day: payload.worked_day,
        reason: payload.reason,
        created_at,
        deleted_at: None,
    };
    let day_units = leave.day_units();

    ensure_allocation(&mut tx, leave.user_id, leave.leave_date, None, day_units).await?;

    if leave.leave_type == LeaveType::Vacation {
        ensure_vacation_quota(&mut tx, leave.user_id, leave.leave_date, day_units, 0.0).await?;
    }

    let id = sqlx::query(
        "INSERT INTO leave_logs (user_id, leave_date, leave_type, worked_day, reason, created_at, deleted_at) VALUES (?, ?, ?, ?, ?, ?, NULL)",
    )
    .bind(leave.user_id)
    .bind(leave.leave_date)
    .bind(leave.leave_type)
    .bind(leave.worked_day)
    .bind(&leave.reason)
    .bind(created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to insert leave log into DB")?
    .last_insert_rowid();

    adjust_leave_usage(
        &mut tx,
        leave.user_id,
        leave.leave_date,
        leave.leave_type,
        day_units,
    )
    .await?;

    tx.commit().await.context("Failed to commit leave log")?;
    info!(
        "Recorded {:?} leave {} for user {} on {}.",
        leave.leave_type, id, leave.user_id, leave.leave_date
    );

    Ok(LeaveLog { id, ..leave })
}

async fn fetch_live_leave_log(conn: &mut SqliteConnection, log_id: i64) -> Result<Option<LeaveLog>> {
    sqlx::query_as::<_, LeaveLog>("SELECT * FROM leave_logs WHERE id = ? AND deleted_at IS NULL")
        .bind(log_id)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("Failed to retrieve leave log with ID: {log_id}"))
}

/// Rejects a vacation of `day_units` on `leave_date` that does not fit in the
/// quota accrued by that date. `released` days are handed back to the record
/// first, for a leave that replaces an earlier one.
async fn ensure_vacation_quota(
    conn: &mut SqliteConnection,
    user_id: i64,
    leave_date: NaiveDate,
    day_units: f64,
    released: f64,
) -> Result<()> {
    let (record, plan) = require_record_with_plan(conn, user_id, leave_date.year()).await?;
    let validation = quota::validate_leave_quota(
        plan.quota_vacation_day,
        record.rollover_vacation_day,
        record.worked_on_holiday_day,
        record.used_vacation_day - released,
        day_units,
        leave_date,
    );
    if !validation.is_valid {
        return Err(LedgerError::Rejected(validation.message).into());
    }
    Ok(())
}

/// Edits a leave log. Its previous amount is left out of both the daily
/// allocation and the vacation quota before the new values are checked.
pub async fn update_leave_log(
    pool: &SqlitePool,
    log_id: i64,
    payload: UpdateLeaveLogPayload,
) -> Result<LeaveLog> {
    let mut tx = begin_write(pool).await?;

    let current = fetch_live_leave_log(&mut tx, log_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("Leave log with ID {log_id} not found.")))?;

    let updated = LeaveLog {
        leave_date: payload.leave_date.unwrap_or(current.leave_date),
        leave_type: payload.leave_type.unwrap_or(current.leave_type),
        worked_day: payload.worked_day.or(current.worked_day),
        reason: payload.reason.or_else(|| current.reason.clone()),
        ..current.clone()
    };
    let day_units = updated.day_units();

    ensure_allocation(
        &mut tx,
        updated.user_id,
        updated.leave_date,
        Some(LogRef::Leave(log_id)),
        day_units,
    )
    .await?;

    if updated.leave_type == LeaveType::Vacation {
        let released = if current.leave_type == LeaveType::Vacation
            && current.leave_date.year() == updated.leave_date.year()
        {
            current.day_units()
        } else {
            0.0
        };
        ensure_vacation_quota(&mut tx, updated.user_id, updated.leave_date, day_units, released)
            .await?;
    }

    sqlx::query(
        "UPDATE leave_logs SET leave_date = ?, leave_type = ?, worked_day = ?, reason = ? WHERE id = ?",
    )
    .bind(updated.leave_date)
    .bind(updated.leave_type)
    .bind(updated.worked_day)
    .bind(&updated.reason)
    .bind(log_id)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("Failed to update leave log with ID: {log_id}"))?;

    adjust_leave_usage(
        &mut tx,
        current.user_id,
        current.leave_date,
        current.leave_type,
        -current.day_units(),
    )
    .await?;
    adjust_leave_usage(
        &mut tx,
        updated.user_id,
        updated.leave_date,
        updated.leave_type,
        day_units,
    )
    .await?;

    tx.commit().await.context("Failed to commit leave log update")?;
    info!("Updated leave log {} for user {}.", log_id, updated.user_id);

    Ok(updated)
}

/// Soft deletes a leave log and gives its days back to the annual record.
pub async fn soft_delete_leave_log(pool: &SqlitePool, log_id: i64) -> Result<bool> {
    debug!("Attempting to soft delete leave log with ID: {}", log_id);
    let mut tx = begin_write(pool).await?;

    let Some(current) = fetch_live_leave_log(&mut tx, log_id).await? else {
        return Ok(false);
    };

    sqlx::query("UPDATE leave_logs SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(Utc::now())
        .bind(log_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to soft delete leave log with ID: {log_id}"))?;

    adjust_leave_usage(
        &mut tx,
        current.user_id,
        current.leave_date,
        current.leave_type,
        -current.day_units(),
    )
    .await?;

    tx.commit().await.context("Failed to commit leave log deletion")?;
    info!("Soft deleted leave log {}.", log_id);
    Ok(true)
}

// --- Medical expenses ---

pub async fn list_medical_expenses(
    pool: &SqlitePool,
    user_id: i64,
    year: Option<i32>,
) -> Result<Vec<MedicalExpense>> {
    let (from, to) = match year {
        Some(year) => {
            let (first, last) = year_bounds(year)?;
            (Some(first), Some(last))
        }
        None => (None, None),
    };

    sqlx::query_as::<_, MedicalExpense>(
        "SELECT * FROM medical_expenses WHERE user_id = ? AND (? IS NULL OR expense_date BETWEEN ? AND ?) ORDER BY expense_date ASC, id ASC",
    )
    .bind(user_id)
    .bind(from)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve medical expenses from DB")
}

/// Records a medical expense if it fits in the budget accrued by its date.
pub async fn create_medical_expense(
    pool: &SqlitePool,
    payload: CreateMedicalExpensePayload,
) -> Result<MedicalExpense> {
    let mut tx = begin_write(pool).await?;

    let year = payload.expense_date.year();
    let (record, plan) = require_record_with_plan(&mut tx, payload.user_id, year).await?;
    let validation = quota::validate_medical_expense(
        plan.quota_medical_expense_baht,
        record.used_medical_expense_baht,
        payload.amount_baht,
        payload.expense_date,
    );
    if !validation.is_valid {
        return Err(LedgerError::Rejected(validation.message).into());
    }

    let created_at = Utc::now();
    let id = sqlx::query(
        "INSERT INTO medical_expenses (user_id, expense_date, amount_baht, description, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(payload.user_id)
    .bind(payload.expense_date)
    .bind(payload.amount_baht)
    .bind(&payload.description)
    .bind(created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to insert medical expense into DB")?
    .last_insert_rowid();

    sqlx::query(
        "UPDATE annual_records SET used_medical_expense_baht = used_medical_expense_baht + ? WHERE id = ?",
    )
    .bind(payload.amount_baht)
    .bind(record.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update medical expense usage")?;

    tx.commit().await.context("Failed to commit medical expense")?;

    Ok(MedicalExpense {
        id,
        user_id: payload.user_id,
        expense_date: payload.expense_date,
        amount_baht: payload.amount_baht,
        description: payload.description,
        created_at,
    })
}

// --- Year-end rollover ---

/// Whether some user has a record for `from_year` but none for the year after.
pub async fn has_pending_rollover(pool: &SqlitePool, from_year: i32) -> Result<bool> {
    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM annual_records r WHERE r.year = ? AND NOT EXISTS (SELECT 1 FROM annual_records n WHERE n.user_id = r.user_id AND n.year = ?)",
    )
    .bind(from_year)
    .bind(from_year + 1)
    .fetch_one(pool)
    .await
    .context("Failed to look for pending rollovers")?;

    Ok(pending > 0)
}

/// Opens next year's records from the records of `from_year`.
///
/// Each user carries their unused vacation, capped at `max_rollover_days`.
/// Users who already have a record for the next year are left alone.
/// Returns the number of records created.
pub async fn rollover_year(
    pool: &SqlitePool,
    from_year: i32,
    max_rollover_days: f64,
    quota_plan_id: Option<i64>,
) -> Result<usize> {
    let to_year = from_year + 1;
    debug!(
        "Attempting to roll over annual records from {} to {}",
        from_year, to_year
    );

    let mut tx = begin_write(pool).await?;

    if let Some(plan_id) = quota_plan_id {
        if fetch_quota_plan(&mut tx, plan_id).await?.is_none() {
            return Err(LedgerError::NotFound(format!("Quota plan with ID {plan_id} not found.")).into());
        }
    }

    let records: Vec<AnnualRecord> =
        sqlx::query_as("SELECT * FROM annual_records WHERE year = ? ORDER BY user_id ASC")
            .bind(from_year)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to retrieve annual records for rollover")?;

    let mut plans: HashMap<i64, QuotaPlan> = HashMap::new();
    let mut created = 0;

    for record in records {
        if fetch_annual_record(&mut tx, record.user_id, to_year)
            .await?
            .is_some()
        {
            debug!(
                "User {} already has a record for {}, skipping.",
                record.user_id, to_year
            );
            continue;
        }

        let plan = match plans.get(&record.quota_plan_id) {
            Some(plan) => plan.clone(),
            None => {
                let plan = fetch_quota_plan(&mut tx, record.quota_plan_id)
                    .await?
                    .ok_or_else(|| {
                        anyhow!(
                            "Quota plan {} referenced by annual record {} is missing",
                            record.quota_plan_id,
                            record.id
                        )
                    })?;
                plans.insert(plan.id, plan.clone());
                plan
            }
        };

        let carried = quota::year_end_vacation_balance(&record, &plan)
            .max(0.0)
            .min(max_rollover_days);

        insert_annual_record(
            &mut tx,
            record.user_id,
            to_year,
            quota_plan_id.unwrap_or(record.quota_plan_id),
            carried,
        )
        .await?;
        created += 1;
    }

    tx.commit().await.context("Failed to commit rollover")?;
    info!(
        "Rolled over {} annual records from {} to {}.",
        created, from_year, to_year
    );

    Ok(created)
}
