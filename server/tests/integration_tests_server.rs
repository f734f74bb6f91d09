use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use hr_common::{AnnualRecord, Holiday, QuotaPlan, TaskLog};
use hr_server::config::Config;
use hr_server::database;
use hr_server::routes::create_router;
use hr_server::state::AppState;
use http_body_util::BodyExt; // For `collect`
use serde_json::{Value, json};
use tower::ServiceExt; // For `oneshot`

/// Router over a fresh in-memory database.
async fn setup_app() -> Router {
    let pool = database::connect_in_memory()
        .await
        .expect("Failed to open in-memory SQLite");
    let state = AppState::new(pool, Config::default())
        .await
        .expect("Failed to build application state");
    create_router(state)
}

/// Sends one request and returns the status with the decoded JSON body
/// (`Value::Null` for empty bodies).
async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed_plan_and_record(app: &Router, user_id: i64, rollover: f64) -> (QuotaPlan, AnnualRecord) {
    let (status, body) = send(
        app,
        "POST",
        "/api/quota-plans",
        Some(json!({
            "name": "Standard",
            "year": 2024,
            "quota_vacation_day": 10.0,
            "quota_medical_expense_baht": 20000.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let plan: QuotaPlan = serde_json::from_value(body).unwrap();

    let (status, body) = send(
        app,
        "POST",
        "/api/annual-records",
        Some(json!({
            "user_id": user_id,
            "year": 2024,
            "quota_plan_id": plan.id,
            "rollover_vacation_day": rollover
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let record: AnnualRecord = serde_json::from_value(body).unwrap();

    (plan, record)
}

#[tokio::test]
async fn test_quota_summary_and_duplicate_record() {
    let app = setup_app().await;
    let (plan, record) = seed_plan_and_record(&app, 7, 2.0).await;
    assert_eq!(record.quota_plan_id, plan.id);

    let (status, body) = send(&app, "GET", "/api/users/7/quota/2024?as_of=2024-12-31", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accrued_vacation_day"], 10.0);
    assert_eq!(body["remaining_vacation_day"], 12.0);
    assert_eq!(body["remaining_medical_expense_baht"], 20000.0);

    let (status, body) = send(&app, "GET", "/api/users/7/annual-records/2024", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rollover_vacation_day"], 2.0);

    let (status, _) = send(&app, "GET", "/api/users/8/annual-records/2024", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "POST",
        "/api/annual-records",
        Some(json!({ "user_id": 7, "year": 2024, "quota_plan_id": plan.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already has"));
}

#[tokio::test]
async fn test_task_logs_respect_daily_cap() {
    let app = setup_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/task-logs",
        Some(json!({
            "user_id": 1,
            "log_date": "2024-05-06",
            "description": "Code review",
            "worked_day": 0.75
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let first: TaskLog = serde_json::from_value(body).unwrap();
    assert!(!first.is_work_on_holiday);

    let (status, body) = send(
        &app,
        "POST",
        "/api/task-logs",
        Some(json!({
            "user_id": 1,
            "log_date": "2024-05-06",
            "description": "Meetings",
            "worked_day": 0.5
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("Only 0.25"));

    let (status, body) = send(&app, "GET", "/api/users/1/allocation/2024-05-06", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["date"], "2024-05-06");
    assert_eq!(body["allocated"], 0.75);
    assert_eq!(body["remaining"], 0.25);
    assert_eq!(body["is_valid"], true);

    // Growing the existing log to a full day only counts it once.
    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/task-logs/{}", first.id),
        Some(json!({ "worked_day": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["worked_day"], 1.0);

    let (status, body) = send(&app, "GET", "/api/task-logs?user_id=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let uri = format!("/api/task-logs/{}", first.id);
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/api/task-logs?user_id=1", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_task_log_empty_description() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/task-logs",
        Some(json!({
            "user_id": 1,
            "log_date": "2024-05-06",
            "description": "",
            "worked_day": 0.5
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Description cannot be empty.");
}

#[tokio::test]
async fn test_holiday_flags_task_logs() {
    let app = setup_app().await;
    seed_plan_and_record(&app, 1, 0.0).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/holidays",
        Some(json!({ "holiday_date": "2024-04-15", "name": "Songkran" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let holiday: Holiday = serde_json::from_value(body).unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/api/holidays",
        Some(json!({ "holiday_date": "2024-04-15", "name": "Songkran again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        "/api/task-logs",
        Some(json!({
            "user_id": 1,
            "log_date": "2024-04-15",
            "description": "Release on-call",
            "worked_day": 1.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_work_on_holiday"], true);

    let (_, body) = send(&app, "GET", "/api/users/1/annual-records/2024", None).await;
    assert_eq!(body["worked_on_holiday_day"], 1.0);

    let (status, _) = send(&app, "DELETE", &format!("/api/holidays/{}", holiday.id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Once the holiday is gone the same weekday is a regular working day.
    let (_, body) = send(
        &app,
        "POST",
        "/api/task-logs",
        Some(json!({
            "user_id": 2,
            "log_date": "2024-04-15",
            "description": "Regular work",
            "worked_day": 1.0
        })),
    )
    .await;
    assert_eq!(body["is_work_on_holiday"], false);

    let (_, body) = send(&app, "GET", "/api/holidays?year=2024", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_leave_quota_is_enforced() {
    let app = setup_app().await;
    seed_plan_and_record(&app, 1, 0.0).await;

    // 10 * 10 / 366 days accrued on January 10th.
    let (status, body) = send(
        &app,
        "POST",
        "/api/leave-logs",
        Some(json!({
            "user_id": 1,
            "leave_date": "2024-01-10",
            "leave_type": "vacation"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("vacation quota"));

    // Sick leave is not quota-checked but still fills the day.
    let (status, body) = send(
        &app,
        "POST",
        "/api/leave-logs",
        Some(json!({
            "user_id": 1,
            "leave_date": "2024-01-10",
            "leave_type": "sick"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["worked_day"], Value::Null);

    let (status, _) = send(
        &app,
        "POST",
        "/api/task-logs",
        Some(json!({
            "user_id": 1,
            "log_date": "2024-01-10",
            "description": "Quick fix",
            "worked_day": 0.1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = send(&app, "GET", "/api/users/1/annual-records/2024", None).await;
    assert_eq!(body["used_sick_leave_day"], 1.0);
}

#[tokio::test]
async fn test_leave_log_can_be_edited() {
    let app = setup_app().await;
    seed_plan_and_record(&app, 1, 0.0).await;

    let (status, leave) = send(
        &app,
        "POST",
        "/api/leave-logs",
        Some(json!({
            "user_id": 1,
            "leave_date": "2024-07-01",
            "leave_type": "vacation",
            "worked_day": 0.5
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let leave_uri = format!("/api/leave-logs/{}", leave["id"]);

    let (status, _) = send(
        &app,
        "POST",
        "/api/task-logs",
        Some(json!({
            "user_id": 1,
            "log_date": "2024-07-01",
            "description": "Release",
            "worked_day": 0.5
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Saving the leave again on a full day is fine: it is not counted twice.
    let (status, body) = send(
        &app,
        "PATCH",
        &leave_uri,
        Some(json!({ "worked_day": 0.5, "reason": "Family visit" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], "Family visit");

    let (status, body) = send(&app, "PATCH", &leave_uri, Some(json!({ "worked_day": 1.0 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("Only 0.50"));

    let (status, _) = send(&app, "PATCH", &leave_uri, Some(json!({ "worked_day": 0.0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PATCH",
        &leave_uri,
        Some(json!({ "leave_date": "2024-07-02", "worked_day": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["leave_date"], "2024-07-02");

    let (_, record) = send(&app, "GET", "/api/users/1/annual-records/2024", None).await;
    assert_eq!(record["used_vacation_day"], 1.0);

    let (status, _) = send(&app, "PATCH", "/api/leave-logs/999", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_medical_pre_check_and_submission() {
    let app = setup_app().await;
    seed_plan_and_record(&app, 1, 0.0).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/validate/medical",
        Some(json!({
            "quota_baht": 20000.0,
            "used_baht": 0.0,
            "new_expense_baht": 100.0,
            "as_of": "2023-12-31"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isValid"], true);
    assert_eq!(body["remainingBefore"], 20000.0);
    assert_eq!(body["remainingAfter"], 19900.0);

    let (status, _) = send(
        &app,
        "POST",
        "/api/medical-expenses",
        Some(json!({
            "user_id": 1,
            "expense_date": "2024-12-31",
            "amount_baht": 15000.0,
            "description": "Surgery"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "POST",
        "/api/medical-expenses",
        Some(json!({
            "user_id": 1,
            "expense_date": "2024-12-31",
            "amount_baht": 6000.0,
            "description": "Follow-up"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("1000.00 baht"));

    let (_, body) = send(&app, "GET", "/api/users/1/medical-expenses?year=2024", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_year_end_rollover() {
    let app = setup_app().await;
    seed_plan_and_record(&app, 1, 2.0).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/annual-records/rollover",
        Some(json!({ "from_year": 2024, "max_rollover_days": 3.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records_created"], 1);
    assert_eq!(body["to_year"], 2025);

    let (status, body) = send(&app, "GET", "/api/users/1/annual-records/2025", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rollover_vacation_day"], 3.0);

    let (status, _) = send(
        &app,
        "POST",
        "/api/annual-records/rollover",
        Some(json!({ "from_year": 2024, "max_rollover_days": -1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
