//! In-memory remote store for tests and offline runs.
//!
//! [`MockRemote`] implements [`RemoteStore`] entirely in memory and supports
//! failure injection, so sync logic can be exercised without a network.
//!
//! # Features
//!
//! - **Failure injection**: fail every call, or only the next `n` calls
//! - **Latency simulation**: delay each call
//! - **Call counting**: assert how many requests were made

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use airmon_types::{UserProfile, UserSettings};

use crate::remote::{RemoteError, RemoteReading, RemoteResult, RemoteStore, file_path};

/// An in-memory remote store.
///
/// # Example
///
/// ```
/// use airmon_core::{MockRemote, RemoteStore};
/// use airmon_types::UserSettings;
///
/// #[tokio::main]
/// async fn main() {
///     let remote = MockRemote::new();
///     remote.save_settings("u1", &UserSettings::default()).await.unwrap();
///     assert!(remote.get_settings("u1").await.unwrap().is_some());
/// }
/// ```
pub struct MockRemote {
    readings: RwLock<HashMap<String, Vec<(String, RemoteReading)>>>,
    profiles: RwLock<HashMap<String, UserProfile>>,
    settings: RwLock<HashMap<String, UserSettings>>,
    files: RwLock<HashMap<String, Vec<u8>>>,
    call_count: AtomicU32,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    /// Calls left to fail before succeeding again.
    remaining_failures: AtomicU32,
}

impl std::fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRemote")
            .field("call_count", &self.call_count.load(Ordering::Relaxed))
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// Create an empty store that never fails.
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            settings: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
            call_count: AtomicU32::new(0),
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            latency_ms: AtomicU64::new(0),
            remaining_failures: AtomicU32::new(0),
        }
    }

    async fn check_should_fail(&self) -> RemoteResult<()> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(RemoteError::Network(self.fail_message.read().await.clone()));
        }

        if self.should_fail.load(Ordering::Relaxed) {
            Err(RemoteError::Network(self.fail_message.read().await.clone()))
        } else {
            Ok(())
        }
    }

    // --- Test control methods ---

    /// Make every subsequent call fail (or succeed again).
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Fail the next `count` calls, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Get the number of remaining transient failures.
    pub fn remaining_failures(&self) -> u32 {
        self.remaining_failures.load(Ordering::Relaxed)
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of calls made so far, failed ones included.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// All reading documents stored for `user_id`, in insertion order.
    pub async fn readings_for(&self, user_id: &str) -> Vec<RemoteReading> {
        self.readings
            .read()
            .await
            .get(user_id)
            .map(|docs| docs.iter().map(|(_, doc)| doc.clone()).collect())
            .unwrap_or_default()
    }

    /// Bytes stored at `users/{uid}/files/{name}`.
    pub async fn file(&self, user_id: &str, name: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .await
            .get(&file_path(user_id, name))
            .cloned()
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn save_reading(&self, user_id: &str, reading: &RemoteReading) -> RemoteResult<String> {
        self.check_should_fail().await?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut doc = reading.clone();
        doc.user_id = user_id.to_string();
        doc.timestamp = Some(OffsetDateTime::now_utc());
        self.readings
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push((id.clone(), doc));
        Ok(id)
    }

    async fn latest_readings(
        &self,
        user_id: &str,
        limit: usize,
    ) -> RemoteResult<Vec<RemoteReading>> {
        self.check_should_fail().await?;
        let mut docs = self.readings_for(user_id).await;
        // Ties go to the later insert.
        docs.reverse();
        docs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        docs.truncate(limit);
        Ok(docs)
    }

    async fn save_profile(&self, profile: &UserProfile) -> RemoteResult<()> {
        self.check_should_fail().await?;
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> RemoteResult<Option<UserProfile>> {
        self.check_should_fail().await?;
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn save_settings(&self, user_id: &str, settings: &UserSettings) -> RemoteResult<()> {
        self.check_should_fail().await?;
        let mut doc = settings.clone();
        doc.last_modified = Some(OffsetDateTime::now_utc());
        self.settings.write().await.insert(user_id.to_string(), doc);
        Ok(())
    }

    async fn get_settings(&self, user_id: &str) -> RemoteResult<Option<UserSettings>> {
        self.check_should_fail().await?;
        Ok(self.settings.read().await.get(user_id).cloned())
    }

    async fn upload_file(&self, user_id: &str, name: &str, data: &[u8]) -> RemoteResult<String> {
        self.check_should_fail().await?;
        let path = file_path(user_id, name);
        self.files.write().await.insert(path.clone(), data.to_vec());
        Ok(format!("mock://{path}"))
    }
}
