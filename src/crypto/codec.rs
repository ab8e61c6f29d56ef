//! AES-256-GCM codec for provider tokens stored at rest.

// crates.io
use aes_gcm::{
	Aes256Gcm, Nonce,
	aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, CryptoError},
};

/// Key size in bytes (256 bits).
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SCRUB_BODY_LEN: usize = 48;

/// Seals and opens token strings and raw bytes.
///
/// Every call to [`encrypt_bytes`](Self::encrypt_bytes) draws a fresh 96-bit nonce and emits
/// `base64(nonce ‖ ciphertext ‖ tag)` with the standard alphabet.
#[derive(Clone)]
pub struct SecretCodec {
	cipher: Aes256Gcm,
}
impl SecretCodec {
	/// Builds a codec from raw key bytes, which must be exactly [`KEY_LEN`] long.
	pub fn new(key: &[u8]) -> Result<Self, ConfigError> {
		if key.len() != KEY_LEN {
			return Err(ConfigError::invalid(
				"encryption_key",
				format!("expected {KEY_LEN} bytes, got {}", key.len()),
			));
		}

		let cipher = Aes256Gcm::new_from_slice(key)
			.map_err(|e| ConfigError::invalid("encryption_key", e.to_string()))?;

		Ok(Self { cipher })
	}

	/// Builds a codec from a base64-encoded key.
	pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
		let key = STANDARD
			.decode(encoded.trim())
			.map_err(|e| ConfigError::invalid("encryption_key", format!("not base64 ({e})")))?;

		Self::new(&key)
	}

	/// Seals a token string. Empty input is valid.
	pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
		self.encrypt_bytes(plaintext.as_bytes())
	}

	/// Seals arbitrary bytes.
	pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
		let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
		let sealed = self.cipher.encrypt(&nonce, plaintext).map_err(|_| CryptoError::Encrypt)?;
		let mut buf = Vec::with_capacity(NONCE_LEN + sealed.len());

		buf.extend_from_slice(&nonce);
		buf.extend_from_slice(&sealed);

		Ok(STANDARD.encode(buf))
	}

	/// Opens a value produced by [`encrypt`](Self::encrypt).
	///
	/// Tampered data, a different key, and scrubbed values all fail with
	/// [`CryptoError::Decrypt`]; plaintext that is not UTF-8 fails with [`CryptoError::Utf8`].
	pub fn decrypt(&self, ciphertext: &str) -> Result<TokenSecret, CryptoError> {
		let plain = self.decrypt_bytes(ciphertext)?;

		String::from_utf8(plain).map(TokenSecret::from).map_err(|_| CryptoError::Utf8)
	}

	/// Opens a value produced by [`encrypt_bytes`](Self::encrypt_bytes) or
	/// [`encrypt`](Self::encrypt).
	pub fn decrypt_bytes(&self, ciphertext: &str) -> Result<Vec<u8>, CryptoError> {
		let bytes = STANDARD.decode(ciphertext).map_err(|_| CryptoError::Encoding)?;

		if bytes.len() < NONCE_LEN + TAG_LEN {
			return Err(CryptoError::Truncated);
		}

		let (nonce, sealed) = bytes.split_at(NONCE_LEN);

		self.cipher.decrypt(Nonce::from_slice(nonce), sealed).map_err(|_| CryptoError::Decrypt)
	}

	/// Produces random bytes shaped like a ciphertext, used to overwrite revoked secrets.
	///
	/// The output never opens under any key.
	pub fn scrub() -> String {
		let mut buf = [0_u8; NONCE_LEN + SCRUB_BODY_LEN + TAG_LEN];

		rand::rng().fill_bytes(&mut buf);

		STANDARD.encode(buf)
	}
}
impl Debug for SecretCodec {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SecretCodec(<redacted>)")
	}
}
