//! In-memory provisioning platform used by `provisio simulate`
//!
//! Behaves like a remote control plane with configurable faults: every call
//! can fail transiently a fixed number of times, one step's create call can
//! be rejected outright, and one step's resource can refuse to be deleted.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use provisio_core::retry::HttpStatusError;
use serde::Serialize;

/// Error returned by the simulated platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    status: u16,
    message: String,
}

impl PlatformError {
    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: 503,
            message: message.into(),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
        }
    }

    fn locked(message: impl Into<String>) -> Self {
        Self {
            status: 423,
            message: message.into(),
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

impl Error for PlatformError {}

impl HttpStatusError for PlatformError {
    fn status_code(&self) -> Option<u16> {
        Some(self.status)
    }
}

/// A resource living on the simulated platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoteResource {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub step: u32,
}

/// Fault injection settings
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Transient failures each distinct call returns before it succeeds
    pub transient_failures: u32,
    /// Step whose create call is rejected with HTTP 400
    pub fail_at: Option<u32>,
    /// Step whose resource answers every delete with HTTP 423
    pub stuck_cleanup: Option<u32>,
}

#[derive(Debug, Default)]
struct PlatformState {
    live: BTreeMap<String, RemoteResource>,
    calls_by_key: HashMap<String, u32>,
    next_id: u64,
    total_calls: u64,
}

impl PlatformState {
    /// Count a call and report whether it should fail transiently
    fn admit(&mut self, key: String, transient_failures: u32) -> bool {
        self.total_calls += 1;
        let calls = self.calls_by_key.entry(key).or_insert(0);
        *calls += 1;
        *calls <= transient_failures
    }
}

#[derive(Debug)]
pub struct SimulatedPlatform {
    faults: Faults,
    state: Mutex<PlatformState>,
}

impl SimulatedPlatform {
    pub fn new(faults: Faults) -> Self {
        Self {
            faults,
            state: Mutex::new(PlatformState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a resource on behalf of provisioning step `step`
    pub async fn create(
        &self,
        step: u32,
        kind: &str,
        name: &str,
    ) -> Result<RemoteResource, PlatformError> {
        tokio::task::yield_now().await;

        let mut state = self.state();
        if state.admit(format!("create:{}", step), self.faults.transient_failures) {
            return Err(PlatformError::unavailable(format!(
                "control plane busy, cannot create {} '{}'",
                kind, name
            )));
        }
        if self.faults.fail_at == Some(step) {
            return Err(PlatformError::rejected(format!(
                "invalid {} definition '{}'",
                kind, name
            )));
        }

        state.next_id += 1;
        let resource = RemoteResource {
            id: format!("{}-{:04}", kind, state.next_id),
            kind: kind.to_string(),
            name: name.to_string(),
            step,
        };
        state.live.insert(resource.id.clone(), resource.clone());
        tracing::debug!(resource_id = %resource.id, step, "platform created resource");
        Ok(resource)
    }

    /// Delete a resource; deleting an unknown id succeeds
    pub async fn delete(&self, id: &str) -> Result<(), PlatformError> {
        tokio::task::yield_now().await;

        let mut state = self.state();
        if state.admit(format!("delete:{}", id), self.faults.transient_failures) {
            return Err(PlatformError::unavailable(format!(
                "control plane busy, cannot delete {}",
                id
            )));
        }

        let stuck = state
            .live
            .get(id)
            .is_some_and(|resource| Some(resource.step) == self.faults.stuck_cleanup);
        if stuck {
            return Err(PlatformError::locked(format!("{} is locked by another process", id)));
        }

        if state.live.remove(id).is_some() {
            tracing::debug!(resource_id = %id, "platform deleted resource");
        }
        Ok(())
    }

    /// Cleanup action for a created resource, suitable for transaction registration
    pub fn cleanup_for(
        platform: &Arc<Self>,
        id: &str,
    ) -> impl Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static {
        let platform = Arc::clone(platform);
        let id = id.to_string();
        move || {
            let platform = Arc::clone(&platform);
            let id = id.clone();
            async move { platform.delete(&id).await.map_err(anyhow::Error::from) }.boxed()
        }
    }

    /// Resources currently present, ordered by id
    pub fn live_resources(&self) -> Vec<RemoteResource> {
        self.state().live.values().cloned().collect()
    }

    /// Total number of calls the platform has answered
    pub fn total_calls(&self) -> u64 {
        self.state().total_calls
    }
}
