//! Session-bus signer backend.
//!
//! Delegates signing to a local signer daemon over a Unix socket. Each call
//! is one JSON request line and one JSON response line; the daemon may show
//! an approval prompt, so signing gets a generous timeout. Responses carry a
//! double-encoded `result` payload: the outer envelope reports success, the
//! inner string is JSON again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::signer::{SignerBackend, SignerError};

const SETUP_TIMEOUT: Duration = Duration::from_secs(10);
const SIGN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct BusRequest<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<serde_json::Value>,
    app: &'a str,
}

#[derive(Deserialize)]
struct BusEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ReadyResult {
    #[serde(default)]
    ready: bool,
}

#[derive(Deserialize)]
struct PublicKeyResult {
    #[serde(default)]
    hex: String,
}

#[derive(Deserialize)]
struct SignResult {
    #[serde(default)]
    event_json: String,
}

pub struct BusSigner {
    socket_path: PathBuf,
    app_id: String,
    public_key: PublicKey,
}

impl BusSigner {
    /// Connect to the signer daemon, verify it is unlocked, and cache the
    /// identity's public key.
    pub async fn connect(socket_path: &Path, app_id: &str) -> Result<Self, SignerError> {
        let ready = call(socket_path, "is_ready", None, app_id, SETUP_TIMEOUT).await?;
        let ready: ReadyResult = parse_inner(&ready)?;
        if !ready.ready {
            return Err(SignerError::Locked);
        }

        let result = call(socket_path, "get_public_key", None, app_id, SETUP_TIMEOUT).await?;
        let result: PublicKeyResult = parse_inner(&result)?;
        let public_key = PublicKey::parse(&result.hex)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            app_id: app_id.to_string(),
            public_key,
        })
    }
}

#[async_trait::async_trait]
impl SignerBackend for BusSigner {
    fn public_key(&self) -> PublicKey {
        self.public_key
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event, SignerError> {
        let event = serde_json::json!({
            "kind": unsigned.kind.as_u16(),
            "pubkey": unsigned.pubkey,
            "content": unsigned.content,
            "tags": unsigned.tags,
            "created_at": unsigned.created_at.as_u64(),
        });

        let result = call(
            &self.socket_path,
            "sign_event",
            Some(event),
            &self.app_id,
            SIGN_TIMEOUT,
        )
        .await?;
        let result: SignResult = parse_inner(&result)?;

        Event::from_json(&result.event_json)
            .map_err(|e| SignerError::Unavailable(format!("unparseable signed event: {e}")))
    }
}

/// One request/response round-trip over a fresh socket connection.
async fn call(
    socket_path: &Path,
    method: &str,
    event: Option<serde_json::Value>,
    app_id: &str,
    timeout: Duration,
) -> Result<String, SignerError> {
    let request = BusRequest {
        method,
        event,
        app: app_id,
    };
    let payload = serde_json::to_string(&request)
        .map_err(|e| SignerError::Unavailable(e.to_string()))?;

    let round_trip = async {
        let mut stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| SignerError::Unavailable(format!("cannot reach signer: {e}")))?;
        stream
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;
        stream
            .write_all(b"\n")
            .await
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;
        Ok::<String, SignerError>(line)
    };

    let line = tokio::time::timeout(timeout, round_trip)
        .await
        .map_err(|_| SignerError::Unavailable(format!("{method} timed out")))??;

    let envelope: BusEnvelope = serde_json::from_str(line.trim())
        .map_err(|e| SignerError::Unavailable(format!("malformed signer response: {e}")))?;
    if !envelope.success {
        let reason = envelope.error.unwrap_or_else(|| "unknown error".to_string());
        return Err(SignerError::Declined(reason));
    }
    Ok(envelope.result)
}

fn parse_inner<T: serde::de::DeserializeOwned>(result: &str) -> Result<T, SignerError> {
    serde_json::from_str(result)
        .map_err(|e| SignerError::Unavailable(format!("malformed signer result: {e}")))
}
