//! Provider webhook intake.
//!
//! The provider signs every delivery with `base64(hmac_sha256(webhook_key, raw_body))` in the
//! [`SIGNATURE_HEADER`] header. Verified events are turned into [`SyncJob`]s for every active
//! binding of the tenant they name. An empty event list is the provider's intent-to-receive
//! probe and only needs a valid signature.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	auth::ExternalTenantId,
	error::{ConfigError, WebhookError},
	flows::Integrations,
	sync::{SyncJob, SyncQueue},
};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-xero-signature";

/// Verifies webhook signatures with the shared webhook key.
#[derive(Clone)]
pub struct WebhookVerifier {
	key: Arc<[u8]>,
}
impl WebhookVerifier {
	/// Creates a verifier. The key must not be empty.
	pub fn new(key: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
		let key = key.as_ref();

		if key.is_empty() {
			return Err(ConfigError::invalid("webhook_key", "must not be empty"));
		}

		Ok(Self { key: Arc::from(key) })
	}

	/// Computes the signature the provider would send for `body`.
	pub fn sign(&self, body: &[u8]) -> Result<String, WebhookError> {
		Ok(STANDARD.encode(self.mac(body)?))
	}

	/// Checks `signature` against `body` in constant time.
	pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
		let provided = signature
			.and_then(|value| STANDARD.decode(value.trim()).ok())
			.ok_or(WebhookError::InvalidSignature)?;

		if bool::from(self.mac(body)?.ct_eq(&provided)) {
			Ok(())
		} else {
			Err(WebhookError::InvalidSignature)
		}
	}

	/// Verifies the signature, then parses the payload.
	pub fn open(
		&self,
		body: &[u8],
		signature: Option<&str>,
	) -> Result<WebhookPayload, WebhookError> {
		self.verify(body, signature)?;

		serde_json::from_slice(body)
			.map_err(|e| WebhookError::InvalidPayload { reason: e.to_string() })
	}

	fn mac(&self, body: &[u8]) -> Result<Vec<u8>, WebhookError> {
		let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
			.map_err(|_| WebhookError::InvalidSignature)?;

		mac.update(body);

		Ok(mac.finalize().into_bytes().to_vec())
	}
}
impl Debug for WebhookVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("WebhookVerifier(<redacted>)")
	}
}

/// Webhook delivery body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
	/// Delivered events; empty for the intent-to-receive probe.
	#[serde(default)]
	pub events: Vec<WebhookEvent>,
	/// Sequence number of the first event.
	#[serde(default)]
	pub first_event_sequence: Option<u64>,
	/// Sequence number of the last event.
	#[serde(default)]
	pub last_event_sequence: Option<u64>,
}

/// One change notification.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
	/// Changed resource.
	pub resource_id: String,
	/// Resource kind, such as `INVOICE` or `CONTACT`.
	pub event_category: String,
	/// Change kind, such as `CREATE` or `UPDATE`.
	pub event_type: String,
	/// Tenant the resource lives in.
	pub tenant_id: ExternalTenantId,
	/// Event timestamp as sent by the provider.
	#[serde(default)]
	pub event_date_utc: Option<String>,
}

impl Integrations {
	/// Enqueues one sync job per event and active binding of the event's tenant.
	///
	/// Events for tenants nobody is bound to are skipped. Returns the number of enqueued jobs.
	pub async fn enqueue_webhook_events(
		&self,
		queue: &dyn SyncQueue,
		payload: &WebhookPayload,
	) -> Result<usize> {
		let mut enqueued = 0;

		for event in &payload.events {
			let bindings = self
				.store()
				.find_bindings_by_external_tenant(self.provider().provider_id(), &event.tenant_id)
				.await?;

			if bindings.is_empty() {
				tracing::debug!(tenant = %event.tenant_id, "Webhook event for an unbound tenant.");
			}

			for binding in bindings {
				let event_id = event
					.event_date_utc
					.as_ref()
					.map(|date| format!("{}:{}:{date}", event.event_category, event.resource_id));
				let job = SyncJob::new(binding.id).with_resource(
					event_id,
					&event.event_category,
					&event.resource_id,
				);

				queue.enqueue(job).await?;

				enqueued += 1;
			}
		}

		Ok(enqueued)
	}
}
