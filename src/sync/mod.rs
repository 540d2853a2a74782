pub mod merge;
mod orchestrator;
pub mod records;

pub use orchestrator::{PushReport, SyncEngine, SyncReport};

use thiserror::Error;

use crate::nostr::{SignerError, TransportError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("not authenticated: no public key available")]
    NotAuthenticated,

    #[error("failed to fetch remote snapshot: {0}")]
    Transport(#[from] TransportError),

    #[error("signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("local cache error: {0}")]
    Cache(String),

    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Connection/authentication state governing whether a sync cycle may run.
///
/// `Syncing` is re-entered from `Authenticated` for every cycle; overlapping
/// triggers are the caller's responsibility to suppress.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Unauthenticated,
    Connecting,
    Authenticated,
    Syncing,
    AuthFailed(String),
}

impl SyncState {
    pub fn can_sync(&self) -> bool {
        matches!(self, SyncState::Authenticated)
    }
}
