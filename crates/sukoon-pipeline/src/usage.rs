//! Per-user daily usage counters.
//!
//! Stores are passed into the pipeline; nothing here is process-global, so
//! tests and tenants get isolated instances.

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use sukoon_policy::Route;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageCount {
    pub turns: u32,
    pub crisis: u32,
    pub abstain: u32,
    pub assist: u32,
}

impl UsageCount {
    fn record(&mut self, route: Route) {
        self.turns += 1;
        match route {
            Route::Crisis => self.crisis += 1,
            Route::Abstain => self.abstain += 1,
            Route::Assist => self.assist += 1,
        }
    }
}

pub trait UsageStore: Send + Sync {
    fn record(&self, user_id: &str, day: NaiveDate, route: Route);

    fn usage(&self, user_id: &str, day: NaiveDate) -> UsageCount;
}

/// `(user_id, day)` → counts.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    counts: Mutex<HashMap<(String, NaiveDate), UsageCount>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.lock().is_empty()
    }
}

impl UsageStore for InMemoryUsageStore {
    fn record(&self, user_id: &str, day: NaiveDate, route: Route) {
        self.counts
            .lock()
            .entry((user_id.to_string(), day))
            .or_default()
            .record(route);
    }

    fn usage(&self, user_id: &str, day: NaiveDate) -> UsageCount {
        self.counts
            .lock()
            .get(&(user_id.to_string(), day))
            .copied()
            .unwrap_or_default()
    }
}
