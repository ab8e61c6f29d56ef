//! HMAC-signed OAuth `state` values.
//!
//! A state is `base64url(json(payload)) "." base64url(hmac_sha256(secret, encoded_payload))`.
//! Verification fails closed and returns `None` for anything malformed or mismatched.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, UserId},
	error::{ConfigError, CryptoError},
};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;

/// Allowed clock skew for states issued "in the future".
pub const STATE_CLOCK_SKEW: Duration = Duration::seconds(60);

/// Payload carried through the provider redirect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedState {
	/// Organization that started the connect flow.
	pub org_id: OrganizationId,
	/// User that started the connect flow.
	pub user_id: UserId,
	/// Signing instant, carried as a Unix timestamp in nanoseconds.
	#[serde(with = "time::serde::timestamp::nanoseconds")]
	pub issued_at: OffsetDateTime,
}
impl SignedState {
	/// Creates a payload stamped with `issued_at`.
	pub fn new(org_id: OrganizationId, user_id: UserId, issued_at: OffsetDateTime) -> Self {
		Self { org_id, user_id, issued_at }
	}
}

/// Signs and verifies [`SignedState`] values with a shared HMAC secret.
#[derive(Clone)]
pub struct StateSigner {
	secret: Arc<[u8]>,
}
impl StateSigner {
	/// Creates a signer. The secret must not be empty.
	pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
		let secret = secret.as_ref();

		if secret.is_empty() {
			return Err(ConfigError::invalid("state_secret", "secret cannot be empty"));
		}

		Ok(Self { secret: Arc::from(secret) })
	}

	/// Encodes and signs `payload`.
	pub fn sign(&self, payload: &SignedState) -> Result<String, CryptoError> {
		let json = serde_json::to_vec(payload).map_err(|_| CryptoError::Payload)?;
		let encoded = URL_SAFE_NO_PAD.encode(json);
		let signature = URL_SAFE_NO_PAD.encode(self.mac(encoded.as_bytes())?);

		Ok(format!("{encoded}.{signature}"))
	}

	/// Returns the payload if `state` carries a valid signature.
	pub fn verify(&self, state: &str) -> Option<SignedState> {
		let (encoded, signature) = state.split_once('.')?;
		let provided = URL_SAFE_NO_PAD.decode(signature).ok()?;

		if provided.len() != SIGNATURE_LEN {
			return None;
		}

		let expected = self.mac(encoded.as_bytes()).ok()?;

		if !bool::from(expected.ct_eq(&provided)) {
			return None;
		}

		let json = URL_SAFE_NO_PAD.decode(encoded).ok()?;

		serde_json::from_slice(&json).ok()
	}

	/// Like [`verify`](Self::verify), but also rejects states older than `max_age` or issued
	/// further in the future than [`STATE_CLOCK_SKEW`].
	pub fn verify_fresh(
		&self,
		state: &str,
		max_age: Duration,
		now: OffsetDateTime,
	) -> Option<SignedState> {
		let payload = self.verify(state)?;
		let age = now - payload.issued_at;

		if age > max_age || -age > STATE_CLOCK_SKEW {
			return None;
		}

		Some(payload)
	}

	fn mac(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
		let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| CryptoError::Payload)?;

		mac.update(data);

		Ok(mac.finalize().into_bytes().to_vec())
	}
}
impl Debug for StateSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("StateSigner(<redacted>)")
	}
}
