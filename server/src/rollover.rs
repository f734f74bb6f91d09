// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio::time;

use crate::database;

/// Year whose records must be rolled over, if the calendar moved past
/// `last_seen_year`.
pub fn year_to_roll(last_seen_year: i32, today: NaiveDate) -> Option<i32> {
    if today.year() > last_seen_year {
        Some(today.year() - 1)
    } else {
        None
    }
}

/// Year the job should treat as already rolled over when it starts on `today`.
///
/// If last year still has records without a counterpart in the current year
/// (the server was down over January 1st), last year is reported so the first
/// check rolls it over.
pub async fn last_rolled_year(pool: &SqlitePool, today: NaiveDate) -> anyhow::Result<i32> {
    let previous = today.year() - 1;
    if database::has_pending_rollover(pool, previous).await? {
        tracing::info!("Annual records of {} have not been rolled over yet.", previous);
        Ok(previous)
    } else {
        Ok(today.year())
    }
}

/// Spawns the job that opens next year's annual records once January 1st
/// has passed.
///
/// A failed rollover is retried on the next tick; rolling a year twice is
/// harmless because users who already have a record are skipped.
pub fn spawn_year_end_rollover(
    pool: SqlitePool,
    check_interval: Duration,
    max_rollover_days: f64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let today = Utc::now().date_naive();
        let mut last_seen_year = match last_rolled_year(&pool, today).await {
            Ok(year) => year,
            Err(e) => {
                tracing::error!("Could not check for pending rollovers: {:?}", e);
                today.year() - 1
            }
        };
        // The first tick completes immediately, so a missed rollover is caught up at startup.
        let mut interval = time::interval(check_interval);

        loop {
            interval.tick().await;

            let today = Utc::now().date_naive();
            match year_to_roll(last_seen_year, today) {
                Some(from_year) => {
                    tracing::info!(
                        "New year detected: {}, rolling over annual records of {}.",
                        today.year(),
                        from_year
                    );
                    match database::rollover_year(&pool, from_year, max_rollover_days, None).await
                    {
                        Ok(count) => {
                            tracing::info!(
                                "Successfully rolled over {} annual records into {}.",
                                count,
                                today.year()
                            );
                            last_seen_year = today.year();
                        }
                        Err(e) => {
                            tracing::error!("Error during automatic year-end rollover: {:?}", e);
                        }
                    }
                }
                None => {
                    tracing::debug!(
                        "No new year yet. Today: {}. Last seen year: {}.",
                        today,
                        last_seen_year
                    );
                }
            }
        }
    })
}
