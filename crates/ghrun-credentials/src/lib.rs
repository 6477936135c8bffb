//! Per-user credential sealing and storage.
//!
//! `cipher` turns the deployment secret into an AES-256-GCM key and seals
//! individual tokens; `token_store` and `kv_store` persist the sealed blobs.

pub mod cipher;
pub mod kv_store;
pub mod token_store;

pub use cipher::{
    CipherError, CredentialCipher, DeploymentKey, EncryptedCredential, KeyMaterialSource,
};
pub use kv_store::{CloudflareKvConfig, CloudflareKvTokenStore, DEFAULT_CLOUDFLARE_API_BASE};
pub use token_store::{FileTokenStore, InMemoryTokenStore, StoreError, TokenStore};
