//! Deployment key derivation and authenticated encryption of stored tokens.
//!
//! Blobs are `base64(nonce || tag || ciphertext)` with a 12-byte nonce and a
//! 16-byte AES-256-GCM tag. No associated data is bound, which keeps blobs
//! written by earlier bot deployments readable.

use std::fmt;

use aes_gcm::{
    aead::{generic_array::GenericArray, rand_core::RngCore as _, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm,
};
use base64::{
    alphabet,
    engine::{
        general_purpose::STANDARD as BASE64_STANDARD, DecodePaddingMode, GeneralPurpose,
        GeneralPurposeConfig,
    },
    Engine as _,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEPLOYMENT_KEY_BYTES: usize = 32;
pub const CREDENTIAL_NONCE_BYTES: usize = 12;
pub const CREDENTIAL_TAG_BYTES: usize = 16;
const CREDENTIAL_NO_AAD: &[u8] = b"";
const KEY_FINGERPRINT_BYTES: usize = 8;

const LENIENT_SECRET_CONFIG: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

/// Decoders tried in order for the deployment secret. Padding is optional and
/// both the standard and URL-safe alphabets are accepted.
const SECRET_DECODERS: [GeneralPurpose; 2] = [
    GeneralPurpose::new(&alphabet::STANDARD, LENIENT_SECRET_CONFIG),
    GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_SECRET_CONFIG),
];

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
/// Failures raised while sealing or opening a credential blob.
pub enum CipherError {
    #[error("credential blob is malformed: {0}")]
    Format(&'static str),
    #[error("credential blob failed authentication")]
    Authentication,
    #[error("secure random source is unavailable")]
    Entropy,
    #[error("credential encryption failed")]
    Encryption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How the configured secret was turned into key bytes.
pub enum KeyMaterialSource {
    Base64,
    Raw,
    ZeroPadded,
    Truncated,
}

impl KeyMaterialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base64 => "base64",
            Self::Raw => "raw",
            Self::ZeroPadded => "zero_padded",
            Self::Truncated => "truncated",
        }
    }

    /// True when the key bytes are a verbatim 32-byte secret rather than a
    /// padded or cut-down passphrase.
    pub fn is_full_strength(self) -> bool {
        matches!(self, Self::Base64 | Self::Raw)
    }
}

/// The deployment-wide symmetric key. Debug output never shows key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct DeploymentKey {
    bytes: [u8; DEPLOYMENT_KEY_BYTES],
    source: KeyMaterialSource,
}

impl DeploymentKey {
    /// Derives the key from the configured secret.
    ///
    /// A secret that base64-decodes to exactly 32 bytes is used as decoded,
    /// with or without padding and in either the standard or URL-safe alphabet.
    /// Otherwise the raw UTF-8 bytes are used when they are exactly 32 long,
    /// and any other length is zero-padded or truncated to 32 bytes. The
    /// pad/truncate path is not a KDF; it is kept so existing token files stay
    /// decryptable.
    pub fn derive(secret: &str) -> Self {
        let decoded = SECRET_DECODERS.iter().find_map(|engine| {
            let decoded = engine.decode(secret).ok()?;
            <[u8; DEPLOYMENT_KEY_BYTES]>::try_from(decoded.as_slice()).ok()
        });
        if let Some(bytes) = decoded {
            return Self {
                bytes,
                source: KeyMaterialSource::Base64,
            };
        }

        let raw = secret.as_bytes();
        let source = match raw.len() {
            DEPLOYMENT_KEY_BYTES => KeyMaterialSource::Raw,
            len if len < DEPLOYMENT_KEY_BYTES => KeyMaterialSource::ZeroPadded,
            _ => KeyMaterialSource::Truncated,
        };
        let mut bytes = [0u8; DEPLOYMENT_KEY_BYTES];
        let copy_len = raw.len().min(DEPLOYMENT_KEY_BYTES);
        bytes[..copy_len].copy_from_slice(&raw[..copy_len]);
        Self { bytes, source }
    }

    pub fn as_bytes(&self) -> &[u8; DEPLOYMENT_KEY_BYTES] {
        &self.bytes
    }

    pub fn source(&self) -> KeyMaterialSource {
        self.source
    }

    /// Short hex digest of the key, safe to log for cross-deployment checks.
    pub fn fingerprint(&self) -> String {
        Sha256::digest(self.bytes)
            .iter()
            .take(KEY_FINGERPRINT_BYTES)
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }
}

impl fmt::Debug for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentKey")
            .field("bytes", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// Base64 blob holding one sealed token, exactly as persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedCredential(String);

impl EncryptedCredential {
    /// Wraps a blob read back from storage. No validation happens until decrypt.
    pub fn from_stored(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for EncryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedCredential({} chars)", self.0.len())
    }
}

#[derive(Clone)]
pub struct CredentialCipher {
    key: DeploymentKey,
    aead: Aes256Gcm,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn new(key: DeploymentKey) -> Self {
        let aead = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { key, aead }
    }

    pub fn from_secret(secret: &str) -> Self {
        Self::new(DeploymentKey::derive(secret))
    }

    pub fn key(&self) -> &DeploymentKey {
        &self.key
    }

    /// Seals `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedCredential, CipherError> {
        let mut nonce = [0u8; CREDENTIAL_NONCE_BYTES];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| CipherError::Entropy)?;

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .aead
            .encrypt_in_place_detached(
                GenericArray::from_slice(&nonce),
                CREDENTIAL_NO_AAD,
                &mut buffer,
            )
            .map_err(|_| CipherError::Encryption)?;

        let mut payload =
            Vec::with_capacity(CREDENTIAL_NONCE_BYTES + CREDENTIAL_TAG_BYTES + buffer.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(tag.as_slice());
        payload.extend_from_slice(&buffer);
        Ok(EncryptedCredential(BASE64_STANDARD.encode(payload)))
    }

    /// Opens a blob produced by [`CredentialCipher::encrypt`]. Fails closed.
    pub fn decrypt(&self, credential: &EncryptedCredential) -> Result<String, CipherError> {
        let raw = BASE64_STANDARD
            .decode(credential.as_str().trim())
            .map_err(|_| CipherError::Format("payload is not valid base64"))?;
        if raw.len() < CREDENTIAL_NONCE_BYTES + CREDENTIAL_TAG_BYTES {
            return Err(CipherError::Format("payload is shorter than nonce and tag"));
        }

        let (nonce, rest) = raw.split_at(CREDENTIAL_NONCE_BYTES);
        let (tag, ciphertext) = rest.split_at(CREDENTIAL_TAG_BYTES);
        let mut buffer = ciphertext.to_vec();
        self.aead
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                CREDENTIAL_NO_AAD,
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| CipherError::Authentication)?;
        String::from_utf8(buffer).map_err(|_| CipherError::Format("plaintext is not valid UTF-8"))
    }
}
