//! Structured outcome of a rollback

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::resource::ResourceRef;
use crate::transaction::TransactionStatus;

/// A resource whose cleanup did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailedCleanup {
    #[serde(flatten)]
    pub resource: ResourceRef,
    pub error: String,
    /// Cleanup attempts made; zero when the cleanup breaker was open
    pub attempts: u32,
}

/// What a rollback did, resource by resource
///
/// `cleaned` and `failed` are both in rollback order (newest resource first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RollbackReport {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub cleaned: Vec<ResourceRef>,
    pub failed: Vec<FailedCleanup>,
    #[serde(rename = "duration-ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl RollbackReport {
    /// Resources left behind that an operator has to remove by hand
    pub fn requires_manual_intervention(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.cleaned.len() + self.failed.len()
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed.is_empty() {
            return write!(
                f,
                "rolled back {} resource(s) in transaction {}",
                self.cleaned.len(),
                self.transaction_id
            );
        }

        write!(
            f,
            "rollback of transaction {} left {} of {} resource(s) behind: ",
            self.transaction_id,
            self.failed.len(),
            self.total()
        )?;
        for (index, failure) in self.failed.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", failure.resource)?;
        }
        Ok(())
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}
