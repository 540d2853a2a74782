mod bus_signer;
mod relay;
mod signer;

pub use bus_signer::BusSigner;
pub use relay::{PublishReport, RelayPool, RelayTransport, TransportError};
pub use signer::{LocalKeySigner, RemoteSigner, SignerBackend, SignerError};
