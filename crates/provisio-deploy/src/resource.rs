//! Resources tracked by a deployment transaction

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

/// Boxed cleanup callback; must be idempotent since rollback retries it
pub type CleanupFn = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Identity of a tracked resource, without its cleanup callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceRef {
    pub resource_type: String,
    pub resource_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' ({})",
            self.resource_type, self.display_name, self.resource_id
        )
    }
}

/// A remote resource created inside a transaction
pub struct TrackedResource {
    info: ResourceRef,
    cleanup: CleanupFn,
    /// Overrides the transaction's rollback breaker for this cleanup
    cleanup_breaker: Option<String>,
}

impl TrackedResource {
    pub fn new<F, Fut>(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        display_name: impl Into<String>,
        cleanup: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            info: ResourceRef {
                resource_type: resource_type.into(),
                resource_id: resource_id.into(),
                display_name: display_name.into(),
                created_at: Utc::now(),
            },
            cleanup: Box::new(move || cleanup().boxed()),
            cleanup_breaker: None,
        }
    }

    /// Account this resource's cleanup under `breaker`
    pub fn with_cleanup_breaker(mut self, breaker: impl Into<String>) -> Self {
        self.cleanup_breaker = Some(breaker.into());
        self
    }

    pub fn cleanup_breaker(&self) -> Option<&str> {
        self.cleanup_breaker.as_deref()
    }

    pub fn resource_type(&self) -> &str {
        &self.info.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.info.resource_id
    }

    pub fn display_name(&self) -> &str {
        &self.info.display_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.info.created_at
    }

    pub fn info(&self) -> &ResourceRef {
        &self.info
    }

    pub(crate) fn cleanup(&self) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.cleanup)()
    }
}

impl fmt::Debug for TrackedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedResource")
            .field("resource_type", &self.info.resource_type)
            .field("resource_id", &self.info.resource_id)
            .field("display_name", &self.info.display_name)
            .field("created_at", &self.info.created_at)
            .finish_non_exhaustive()
    }
}
