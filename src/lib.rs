//! # Field-Seal: Versioned Key Lifecycle and Field Encryption
//!
//! `field-seal` manages the symmetric keys used to protect sensitive record
//! fields: generation, concurrent-safe activation, per-purpose caching,
//! scheduled rotation, and backward-compatible decryption of values encrypted
//! under now-retired key versions. A separate, memory-only
//! [`SigningKeyManager`] rotates token-signing keys with a 48-hour
//! verification grace window.
//!
//! ## Core Concepts
//!
//! - **`KeyLifecycleManager`**: the primary entry point. Encrypts field
//!   values with the active key of a *purpose* and wraps the ciphertext in a
//!   versioned envelope; decrypts by resolving the exact key version the
//!   envelope names.
//! - **`KeyStore`**: a trait for persistence backends holding versioned
//!   [`KeyRecord`]s. An [`InMemoryKeyStore`] is provided.
//! - **Envelope**: ciphertext travels as `"{version}:{base64}"`. Text without
//!   a version prefix is treated as a legacy value and decrypted with the
//!   statically configured fallback key.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use field_seal::prelude::*;
//!
//! fn main() -> Result<(), field_seal::Error> {
//!     let store = Arc::new(InMemoryKeyStore::new());
//!     let manager = KeyLifecycleManager::managed(store, CipherConfig::default());
//!
//!     // 首次加密自动创建并激活版本 1
//!     let sealed = manager.encrypt("secret@example.com", "field-encryption")?;
//!     assert!(sealed.starts_with("1:"));
//!
//!     let plaintext = manager.decrypt(&sealed, "field-encryption")?;
//!     assert_eq!(plaintext, "secret@example.com");
//!     Ok(())
//! }
//! ```

pub mod cipher;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observer;
pub mod signing;
pub mod store;

pub use cipher::{Envelope, FieldCipher};
pub use config::{CipherConfig, FIELD_ENCRYPTION_PURPOSE};
pub use error::Error;
pub use lifecycle::{KeyLifecycleManager, KeySource};
pub use observer::{ObservationSink, OperationObserver};
pub use signing::SigningKeyManager;
pub use store::{InMemoryKeyStore, KeyRecord, KeyStore};

// --- Prelude ---
// A collection of the most commonly used traits, structs, and enums.
pub mod prelude {
    pub use crate::cipher::{Envelope, FieldCipher};
    pub use crate::config::{CipherConfig, FIELD_ENCRYPTION_PURPOSE};
    pub use crate::error::Error;
    pub use crate::lifecycle::{KeyLifecycleManager, KeySource};
    pub use crate::observer::{
        MemorySink, ObservationSink, OperationObserver, OperationOutcome, TracingSink,
    };
    pub use crate::signing::{SigningKeyEntry, SigningKeyManager};
    pub use crate::store::{InMemoryKeyStore, KeyRecord, KeyStore};
}

/// The version of the `field-seal` crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
