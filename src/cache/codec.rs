//! Payload Codec Pipeline
//!
//! Stateless transforms applied to payloads on their way into and out of the
//! tiers: compress → encrypt on write, decrypt → decompress on read.
//!
//! # Example
//!
//! ```
//! use tiercache::cache::codec::{Cipher, CodecPipeline};
//!
//! let pipeline = CodecPipeline::new(true, 16, Some(Cipher::generate()));
//!
//! let data = b"Hello, this is test data. Hello, this is test data. Hello!";
//! let encoded = pipeline.encode(data);
//! assert!(encoded.encrypted);
//!
//! let decoded = pipeline
//!     .decode(&encoded.payload, encoded.compressed, encoded.encrypted)
//!     .unwrap();
//! assert_eq!(decoded.as_ref(), data);
//! ```

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// AES-GCM nonce length in bytes (96 bits)
pub const NONCE_LEN: usize = 12;

/// LZ4 cannot expand data by more than this factor; larger size prefixes are corrupt
const LZ4_MAX_RATIO: usize = 255;

// =============================================================================
// Content Hash
// =============================================================================

/// SHA-256 of the key as 64 lowercase hex characters.
///
/// Only used to derive filesystem-safe names; not a security boundary.
pub fn content_hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

// =============================================================================
// LZ4 Compressor
// =============================================================================

/// LZ4 block compressor, size-prefixed
#[derive(Debug, Clone, Copy)]
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    /// Create new LZ4 compressor with default settings
    pub fn new() -> Self {
        Self { level: 4 }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        // Reject size prefixes no LZ4 block could produce before allocating
        let declared = data
            .get(..4)
            .map(|p| u32::from_le_bytes([p[0], p[1], p[2], p[3]]) as usize)
            .ok_or_else(|| Error::DecompressionFailed {
                algorithm: "LZ4".into(),
                reason: "missing size prefix".into(),
            })?;
        if declared > data.len().saturating_mul(LZ4_MAX_RATIO) + 16 {
            return Err(Error::DecompressionFailed {
                algorithm: "LZ4".into(),
                reason: format!("implausible decompressed size {}", declared),
            });
        }

        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Cipher
// =============================================================================

/// AES-256-GCM with a random nonce prepended to every ciphertext
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256Gcm,
}

impl Cipher {
    /// Fresh random key, never persisted
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            aead: Aes256Gcm::new(&key),
        }
    }

    /// Cipher from known key material
    pub fn from_key(key: [u8; 32]) -> Self {
        Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Returns `nonce || ciphertext || tag`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(Error::DecryptionFailed("payload shorter than nonce".into()));
        }
        let (nonce, sealed) = data.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| Error::DecryptionFailed("authentication tag mismatch".into()))
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher(AES-256-GCM, <redacted>)")
    }
}

// =============================================================================
// Codec Pipeline
// =============================================================================

/// Output of [`CodecPipeline::encode`]
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    pub payload: Bytes,
    pub compressed: bool,
    pub encrypted: bool,
}

/// Compression + encryption applied in a fixed order
#[derive(Debug, Clone)]
pub struct CodecPipeline {
    compression: bool,
    threshold: usize,
    lz4: Lz4Compressor,
    cipher: Option<Cipher>,
}

impl CodecPipeline {
    /// `cipher: None` disables encryption
    pub fn new(compression: bool, threshold: usize, cipher: Option<Cipher>) -> Self {
        Self {
            compression,
            threshold,
            lz4: Lz4Compressor::default(),
            cipher,
        }
    }

    pub fn encryption_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encode a raw payload. Never fails: a failing stage is skipped and its
    /// flag left unset.
    pub fn encode(&self, raw: &[u8]) -> EncodedPayload {
        let (mut payload, compressed) = self.compress(raw);

        let mut encrypted = false;
        if let Some(cipher) = &self.cipher {
            match cipher.encrypt(&payload) {
                Ok(sealed) => {
                    payload = Bytes::from(sealed);
                    encrypted = true;
                }
                Err(e) => {
                    tracing::warn!("Encryption failed, storing plaintext: {}", e);
                }
            }
        }

        EncodedPayload {
            payload,
            compressed,
            encrypted,
        }
    }

    fn compress(&self, raw: &[u8]) -> (Bytes, bool) {
        if !self.compression || raw.len() < self.threshold {
            return (Bytes::copy_from_slice(raw), false);
        }

        match self.lz4.compress(raw) {
            // Only keep the compressed form if it is actually smaller
            Ok(compressed) if compressed.len() < raw.len() => (Bytes::from(compressed), true),
            Ok(_) => (Bytes::copy_from_slice(raw), false),
            Err(e) => {
                tracing::warn!("Compression failed, using uncompressed: {}", e);
                (Bytes::copy_from_slice(raw), false)
            }
        }
    }

    /// Invert [`encode`](Self::encode). Any error here means the stored bytes
    /// are corrupt.
    pub fn decode(&self, payload: &Bytes, compressed: bool, encrypted: bool) -> Result<Bytes> {
        let plain = if encrypted {
            let cipher = self.cipher.as_ref().ok_or_else(|| {
                Error::DecryptionFailed("entry is encrypted but no key is loaded".into())
            })?;
            Bytes::from(cipher.decrypt(payload)?)
        } else {
            payload.clone()
        };

        if compressed {
            Ok(Bytes::from(self.lz4.decompress(&plain)?))
        } else {
            Ok(plain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    const TEST_DATA: &[u8] = b"Hello, this is test data that should compress well. \
        It has some repetition: Hello, this is test data that should compress well.";

    #[test]
    fn test_content_hash_is_stable_hex() {
        let hash = content_hash("GET https://example.com/users?page=1");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hash, content_hash("GET https://example.com/users?page=1"));
        assert_ne!(hash, content_hash("GET https://example.com/users?page=2"));
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_lz4_roundtrip() {
        let compressor = Lz4Compressor::new();

        let compressed = compressor.compress(TEST_DATA).unwrap();
        assert!(compressed.len() < TEST_DATA.len());

        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(decompressed, TEST_DATA);
    }

    #[test]
    fn test_lz4_rejects_garbage() {
        let compressor = Lz4Compressor::new();
        assert_matches!(
            compressor.decompress(&[0xff, 0xff, 0xff, 0x7f, 1, 2, 3]),
            Err(Error::DecompressionFailed { .. })
        );
        assert_matches!(
            compressor.decompress(&[1, 2]),
            Err(Error::DecompressionFailed { .. })
        );
    }

    #[test]
    fn test_cipher_roundtrip_and_nonce_prefix() {
        let cipher = Cipher::generate();
        let sealed = cipher.encrypt(TEST_DATA).unwrap();

        // nonce + ciphertext + 16-byte tag
        assert_eq!(sealed.len(), NONCE_LEN + TEST_DATA.len() + 16);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), TEST_DATA);

        // Same plaintext never yields the same ciphertext
        assert_ne!(sealed, cipher.encrypt(TEST_DATA).unwrap());
    }

    #[test]
    fn test_cipher_detects_tampering() {
        let cipher = Cipher::from_key([7u8; 32]);
        let mut sealed = cipher.encrypt(b"secret payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert_matches!(cipher.decrypt(&sealed), Err(Error::DecryptionFailed(_)));
        assert_matches!(cipher.decrypt(&[0u8; 4]), Err(Error::DecryptionFailed(_)));
    }

    #[test]
    fn test_cipher_key_is_per_instance() {
        let sealed = Cipher::generate().encrypt(b"payload").unwrap();
        assert!(Cipher::generate().decrypt(&sealed).is_err());
    }

    #[test]
    fn test_pipeline_skips_small_payloads() {
        let pipeline = CodecPipeline::new(true, 1024, None);

        let encoded = pipeline.encode(b"tiny");
        assert!(!encoded.compressed);
        assert!(!encoded.encrypted);
        assert_eq!(encoded.payload.as_ref(), b"tiny");
    }

    #[test]
    fn test_pipeline_compresses_above_threshold() {
        let pipeline = CodecPipeline::new(true, 16, None);
        let data = vec![b'a'; 4096];

        let encoded = pipeline.encode(&data);
        assert!(encoded.compressed);
        assert!(encoded.payload.len() < data.len());

        let decoded = pipeline.decode(&encoded.payload, true, false).unwrap();
        assert_eq!(decoded.as_ref(), data.as_slice());
    }

    #[test]
    fn test_pipeline_keeps_incompressible_data_raw() {
        let pipeline = CodecPipeline::new(true, 16, None);
        // Unique bytes leave LZ4 nothing to match
        let data: Vec<u8> = (0..=255u8).collect();

        let encoded = pipeline.encode(&data);
        assert!(!encoded.compressed);
        assert_eq!(encoded.payload.as_ref(), data.as_slice());
    }

    #[test]
    fn test_pipeline_disabled_compression() {
        let pipeline = CodecPipeline::new(false, 0, None);
        let data = vec![b'a'; 4096];

        let encoded = pipeline.encode(&data);
        assert!(!encoded.compressed);
        assert_eq!(encoded.payload.len(), data.len());
    }

    #[test]
    fn test_pipeline_encrypted_decode_without_key_is_corruption() {
        let writer = CodecPipeline::new(false, 0, Some(Cipher::generate()));
        let reader = CodecPipeline::new(false, 0, None);

        let encoded = writer.encode(b"payload");
        let err = reader
            .decode(&encoded.payload, encoded.compressed, encoded.encrypted)
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_pipeline_compress_then_encrypt_order() {
        let cipher = Cipher::from_key([3u8; 32]);
        let pipeline = CodecPipeline::new(true, 16, Some(cipher.clone()));
        let data = vec![b'z'; 2048];

        let encoded = pipeline.encode(&data);
        assert!(encoded.compressed && encoded.encrypted);

        // Decrypting alone yields the LZ4 block, not the raw data
        let inner = cipher.decrypt(&encoded.payload).unwrap();
        assert!(inner.len() < data.len());
        assert_eq!(Lz4Compressor::new().decompress(&inner).unwrap(), data);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_pipeline_roundtrip(
            data in prop::collection::vec(any::<u8>(), 0..8192),
            compression in any::<bool>(),
            encryption in any::<bool>(),
        ) {
            let cipher = encryption.then(Cipher::generate);
            let pipeline = CodecPipeline::new(compression, 64, cipher);

            let encoded = pipeline.encode(&data);
            prop_assert_eq!(encoded.encrypted, encryption);

            let decoded = pipeline
                .decode(&encoded.payload, encoded.compressed, encoded.encrypted)
                .unwrap();
            prop_assert_eq!(decoded.as_ref(), data.as_slice());
        }
    }
}
