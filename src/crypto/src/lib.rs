//! # ledgerbench Cryptography Module
//!
//! Submitter identity and hashing primitives used to sign proposals and
//! transaction envelopes.
//!
//! ## Module Structure
//!
//! ```text
//! crypto/
//! ├── identity/  - Signing identity (MSP id + certificate + Ed25519 key)
//! ├── keys/      - Key material loading from disk
//! └── hash/      - SHA3 digests (transaction ids, effects payloads)
//! ```

pub mod error;
pub mod hash;
pub mod identity;
pub mod keys;

pub use error::{CryptoError, Result};
pub use hash::Sha3Hash256;
pub use identity::{verify, Identity, SerializedIdentity, Signer};
