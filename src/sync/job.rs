//! Queued sync work.

// self
use crate::{_prelude::*, auth::TenantBindingId, error::SyncError};

/// Unit of sync work for one tenant binding.
///
/// Jobs travel through the queue as JSON; `attempts` counts failed runs so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
	/// Binding whose data should be synced.
	pub tenant_binding_id: TenantBindingId,
	/// Provider event that triggered the job.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub event_id: Option<String>,
	/// Resource kind named by the event (for example `INVOICE`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_type: Option<String>,
	/// Provider-side resource identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_id: Option<String>,
	/// Failed attempts so far.
	#[serde(default)]
	pub attempts: u32,
	/// When the job was first enqueued.
	#[serde(with = "time::serde::rfc3339")]
	pub enqueued_at: OffsetDateTime,
}
impl SyncJob {
	/// Creates a full-sync job for a binding.
	pub fn new(tenant_binding_id: TenantBindingId) -> Self {
		Self {
			tenant_binding_id,
			event_id: None,
			resource_type: None,
			resource_id: None,
			attempts: 0,
			enqueued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Narrows the job to one provider resource.
	pub fn with_resource(
		mut self,
		event_id: Option<String>,
		resource_type: impl Into<String>,
		resource_id: impl Into<String>,
	) -> Self {
		self.event_id = event_id;
		self.resource_type = Some(resource_type.into());
		self.resource_id = Some(resource_id.into());

		self
	}

	/// Returns the job as it is requeued after one more failure.
	pub fn next_attempt(mut self) -> Self {
		self.attempts = self.attempts.saturating_add(1);

		self
	}

	pub(crate) fn encode(&self) -> Result<String, SyncError> {
		serde_json::to_string(self).map_err(|e| SyncError::InvalidJob { message: e.to_string() })
	}

	pub(crate) fn decode(raw: &str) -> Result<Self, SyncError> {
		serde_json::from_str(raw).map_err(|e| SyncError::InvalidJob { message: e.to_string() })
	}
}

/// Job that exhausted its attempts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
	/// Failed job, with its final attempt count.
	pub job: SyncJob,
	/// Safe message of the last failure.
	pub reason: String,
	/// When the job was dead-lettered.
	#[serde(with = "time::serde::rfc3339")]
	pub dead_lettered_at: OffsetDateTime,
}
