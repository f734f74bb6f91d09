// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::sync::Arc;

use anyhow::Result;
use hr_common::HolidayCalendar;
use parking_lot::RwLock;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::database;

/// Everything a handler needs, passed explicitly to the router.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    holidays: Arc<RwLock<HolidayCalendar>>,
}

impl AppState {
    /// Builds the state and warms the holiday cache from the database.
    pub async fn new(pool: SqlitePool, config: Config) -> Result<Self> {
        let holidays = database::list_holidays(&pool, None).await?;
        let calendar = HolidayCalendar::new(holidays.iter().map(|h| h.holiday_date));
        info!("Loaded {} holidays into the calendar cache.", calendar.len());

        Ok(Self {
            pool,
            config: Arc::new(config),
            holidays: Arc::new(RwLock::new(calendar)),
        })
    }

    /// Holiday cache shared by the holiday and task-log writes.
    pub fn holidays(&self) -> &RwLock<HolidayCalendar> {
        &self.holidays
    }
}
