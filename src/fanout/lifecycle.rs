use crate::connection::ConnectionId;
use crate::registry::{ConnectionRegistry, RegistryError};

/// A registry write caused by a connection opening or closing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleWrite {
    Upsert(ConnectionId),
    Remove(ConnectionId),
}

impl LifecycleWrite {
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            LifecycleWrite::Upsert(id) | LifecycleWrite::Remove(id) => id,
        }
    }

    pub fn event(&self) -> &'static str {
        match self {
            LifecycleWrite::Upsert(_) => "connect",
            LifecycleWrite::Remove(_) => "disconnect",
        }
    }

    pub async fn apply(&self, registry: &dyn ConnectionRegistry) -> Result<(), RegistryError> {
        match self {
            LifecycleWrite::Upsert(id) => registry.upsert(id).await,
            LifecycleWrite::Remove(id) => registry.remove(id).await,
        }
    }
}

/// What happened to a lifecycle event.
///
/// Informational only: the transport handshake or teardown completes
/// regardless of the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The registry write succeeded
    Applied,
    /// The write failed and was queued for out-of-band retry
    RetryScheduled,
    /// The write failed and will not be retried
    Dropped,
    /// The event carried no usable connection id
    Ignored,
}

impl LifecycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOutcome::Applied => "applied",
            LifecycleOutcome::RetryScheduled => "retry_scheduled",
            LifecycleOutcome::Dropped => "dropped",
            LifecycleOutcome::Ignored => "ignored",
        }
    }
}
