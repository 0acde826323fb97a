//! Cryptogragic logics.
//!
//! Durable credentials are sealed with AES-256-GCM before reaching the
//! database. Output layout is `nonce (12 bytes) || ciphertext || tag`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

const NONCE_SIZE: usize = 12;
const KEY_LENGTH: usize = 32;

type Result<T> = std::result::Result<T, CryptoError>;

/// Errors raised by the encryption utility.
///
/// Every variant is a `DecryptionError` in the operational sense: either the
/// key is unusable (fatal at startup) or a blob failed to verify.
#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("encryption key is not valid base64")]
    KeyEncoding(#[from] base64::DecodeError),
    #[error("key length is {value} while {excepted} is excepted")]
    KeyLength { value: usize, excepted: usize },
    #[error("ciphertext length is {value} while at least {excepted} is excepted")]
    TooShort { value: usize, excepted: usize },
    #[error("authentication tag does not verify")]
    Tag,
    #[error("encryption failed")]
    Seal,

    #[error("hex is not valid")]
    Hex(#[from] hex::FromHexError),
    #[error("encrypted data is not utf8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// SymmetricKey holds a fixed-size key protected by Zeroizing.
#[derive(Clone)]
pub struct SymmetricKey(Zeroizing<[u8; KEY_LENGTH]>);

impl SymmetricKey {
    /// Create from raw bytes (must be 32 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::KeyLength {
                value: bytes.len(),
                excepted: KEY_LENGTH,
            })?;

        Ok(Self(Zeroizing::new(key)))
    }

    /// Decode a base64 (standard alphabet) key, as stored in `TOKEN_ENC_KEY`.
    pub fn from_base64(encoded: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = Zeroizing::new(STANDARD.decode(encoded.as_ref().trim_ascii())?);
        Self::from_bytes(&bytes)
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(**redacted**)")
    }
}

/// SymmetricCipher provides seal/open operations with AES-256-GCM.
#[derive(Debug)]
pub struct SymmetricCipher {
    key: SymmetricKey,
}

impl SymmetricCipher {
    /// Create a new [`SymmetricCipher`].
    pub fn new(key: SymmetricKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }

    /// Encrypts data returning `nonce || ciphertext || tag`.
    pub fn seal(&self, plaintext: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        // Generate random 96-bit nonce.
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher_text = self
            .cipher()
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| CryptoError::Seal)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + cipher_text.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&cipher_text);
        Ok(out)
    }

    /// Decrypt a blob produced by [`SymmetricCipher::seal`].
    pub fn open(&self, data: impl AsRef<[u8]>) -> Result<Zeroizing<Vec<u8>>> {
        let data = data.as_ref();
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::TooShort {
                value: data.len(),
                excepted: NONCE_SIZE,
            });
        }

        let (nonce_bytes, cipher_text) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plain = self
            .cipher()
            .decrypt(nonce, cipher_text)
            .map_err(|_| CryptoError::Tag)?;

        Ok(Zeroizing::new(plain))
    }

    /// Seal and encode as hex, the storage format of the credentials table.
    pub fn seal_to_hex(&self, plaintext: impl AsRef<[u8]>) -> Result<String> {
        Ok(hex::encode(self.seal(plaintext)?))
    }

    /// Decode hex then open into a UTF-8 string.
    pub fn open_from_hex(&self, data: impl AsRef<[u8]>) -> Result<Zeroizing<String>> {
        let data = hex::decode(data)?;
        let plain = self.open(data)?;
        Ok(Zeroizing::new(String::from_utf8(plain.to_vec())?))
    }
}
