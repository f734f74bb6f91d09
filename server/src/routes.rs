// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use tower_http::trace::TraceLayer;

/// Creates and configures the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Administration: quota plans and holidays
        .route(
            "/api/quota-plans",
            get(handlers::list_quota_plans).post(handlers::create_quota_plan),
        )
        .route("/api/quota-plans/{id}", put(handlers::update_quota_plan))
        .route(
            "/api/holidays",
            get(handlers::list_holidays).post(handlers::create_holiday),
        )
        .route("/api/holidays/{id}", delete(handlers::delete_holiday))
        // Annual records, quota snapshots and year-end rollover
        .route("/api/annual-records", post(handlers::create_annual_record))
        .route(
            "/api/annual-records/rollover",
            post(handlers::rollover_annual_records),
        )
        .route(
            "/api/users/{user_id}/annual-records/{year}",
            get(handlers::get_annual_record),
        )
        .route(
            "/api/users/{user_id}/quota/{year}",
            get(handlers::get_quota_summary),
        )
        .route(
            "/api/users/{user_id}/allocation/{date}",
            get(handlers::get_daily_allocation),
        )
        .route(
            "/api/users/{user_id}/medical-expenses",
            get(handlers::list_medical_expenses),
        )
        // Stateless pre-checks for forms
        .route("/api/validate/leave", post(handlers::validate_leave))
        .route("/api/validate/medical", post(handlers::validate_medical))
        // Logs
        .route(
            "/api/task-logs",
            get(handlers::list_task_logs).post(handlers::create_task_log),
        )
        .route(
            "/api/task-logs/{id}",
            patch(handlers::update_task_log).delete(handlers::delete_task_log),
        )
        .route(
            "/api/leave-logs",
            get(handlers::list_leave_logs).post(handlers::create_leave_log),
        )
        .route(
            "/api/leave-logs/{id}",
            patch(handlers::update_leave_log).delete(handlers::delete_leave_log),
        )
        .route(
            "/api/medical-expenses",
            post(handlers::create_medical_expense),
        )
        .layer(TraceLayer::new_for_http())
        // Adds the shared state (pool, config, holiday cache) to the application
        .with_state(state)
}
