//! Mock activity source for testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use warden_api::Instance;
use warden_util::InstanceKey;

use crate::{ActivityError, ActivityResult, ActivitySource};

/// Mock activity source for unit/integration testing
#[derive(Clone)]
pub struct MockActivitySource {
    healthy: Arc<Mutex<bool>>,
    activities: Arc<Mutex<HashMap<InstanceKey, DateTime<Utc>>>>,

    /// Configure queries to fail
    fail_queries: Arc<Mutex<bool>>,
}

impl MockActivitySource {
    pub fn new() -> Self {
        Self {
            healthy: Arc::new(Mutex::new(true)),
            activities: Arc::new(Mutex::new(HashMap::new())),
            fail_queries: Arc::new(Mutex::new(false)),
        }
    }

    /// Set the backend health flag
    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap() = healthy;
    }

    /// Record an observed activity timestamp for an instance
    pub fn set_activity(&self, key: InstanceKey, at: DateTime<Utc>) {
        self.activities.lock().unwrap().insert(key, at);
    }

    /// Forget any observed activity for an instance
    pub fn clear_activity(&self, key: &InstanceKey) {
        self.activities.lock().unwrap().remove(key);
    }

    /// Make every query fail
    pub fn set_fail_queries(&self, fail: bool) {
        *self.fail_queries.lock().unwrap() = fail;
    }
}

impl Default for MockActivitySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivitySource for MockActivitySource {
    async fn is_healthy(&self) -> bool {
        *self.healthy.lock().unwrap()
    }

    async fn last_activity(
        &self,
        instance: &Instance,
    ) -> ActivityResult<Option<DateTime<Utc>>> {
        if *self.fail_queries.lock().unwrap() {
            return Err(ActivityError::AllChannelsFailed("mock failure".into()));
        }

        Ok(self.activities.lock().unwrap().get(&instance.key).copied())
    }
}
