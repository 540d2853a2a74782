//! Signing capability.
//!
//! One capability, three backends: an in-memory key, a session-bus signer
//! daemon, and a remote-signer placeholder. The backend is chosen once at
//! connect time; everything downstream only sees `SignerBackend`.

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("no signing identity configured")]
    NotConfigured,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("signer is locked")]
    Locked,

    #[error("signing request declined: {0}")]
    Declined(String),

    #[error("signer unavailable: {0}")]
    Unavailable(String),

    #[error("remote signer support is not implemented")]
    Unimplemented,
}

#[async_trait]
pub trait SignerBackend: Send + Sync {
    /// Public key of the identity this backend signs for.
    fn public_key(&self) -> PublicKey;

    /// Sign an event. May block on user approval depending on the backend.
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError>;
}

/// Backend holding the secret key in memory.
pub struct LocalKeySigner {
    keys: Keys,
}

impl LocalKeySigner {
    /// Accepts an nsec or a raw hex secret key.
    pub fn from_secret(secret: &str) -> Result<Self, SignerError> {
        let keys = Keys::parse(secret).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { keys })
    }
}

#[async_trait]
impl SignerBackend for LocalKeySigner {
    fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError> {
        unsigned
            .sign_with_keys(&self.keys)
            .map_err(|e| SignerError::Unavailable(e.to_string()))
    }
}

/// NIP-46 remote signer. Setup reports `Unimplemented`; kept so the
/// configuration surface matches the other backends.
pub struct RemoteSigner;

impl RemoteSigner {
    pub fn connect(_bunker_url: &str) -> Result<Self, SignerError> {
        Err(SignerError::Unimplemented)
    }
}

#[async_trait]
impl SignerBackend for RemoteSigner {
    fn public_key(&self) -> PublicKey {
        unreachable!("remote signer cannot be constructed")
    }

    async fn sign_event(&self, _unsigned: UnsignedEvent) -> Result<Event, SignerError> {
        Err(SignerError::Unimplemented)
    }
}
