//! Audit metadata: who changed an aggregate, and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single audit stamp (timestamp + actor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub at: DateTime<Utc>,
    pub by: String,
}

/// Source of audit stamps for writes.
pub trait Auditor: Send + Sync {
    fn stamp(&self) -> AuditStamp;
}

/// Wall clock + a fixed actor name (e.g. the service account).
#[derive(Debug, Clone)]
pub struct SystemAuditor {
    actor: String,
}

impl SystemAuditor {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }
}

impl Default for SystemAuditor {
    fn default() -> Self {
        Self::new("system")
    }
}

impl Auditor for SystemAuditor {
    fn stamp(&self) -> AuditStamp {
        AuditStamp {
            at: Utc::now(),
            by: self.actor.clone(),
        }
    }
}

impl<A> Auditor for std::sync::Arc<A>
where
    A: Auditor + ?Sized,
{
    fn stamp(&self) -> AuditStamp {
        (**self).stamp()
    }
}
