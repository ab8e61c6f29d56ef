//! Read-only view of an organization's bindings and grants.

// self
use crate::{
	_prelude::*,
	auth::{
		Caller, ExternalTenantId, Grant, GrantId, GrantStatus, ProviderId, TenantBinding,
		TenantBindingId, UserId,
	},
	flows::Integrations,
};

/// Grant metadata safe to show to the organization. Token fields are never included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantSummary {
	/// Grant identifier.
	pub id: GrantId,
	/// Provider that issued the grant.
	pub provider: ProviderId,
	/// User who completed the consent.
	pub authorized_by_user_id: UserId,
	/// Lifecycle status.
	pub status: GrantStatus,
	/// Access token expiry.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
	/// Last time a client was handed out.
	#[serde(with = "time::serde::rfc3339::option")]
	pub last_used_at: Option<OffsetDateTime>,
	/// When the current refresh token was issued.
	#[serde(with = "time::serde::rfc3339")]
	pub refresh_token_issued_at: OffsetDateTime,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Last mutation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl From<&Grant> for GrantSummary {
	fn from(grant: &Grant) -> Self {
		Self {
			id: grant.id.clone(),
			provider: grant.provider.clone(),
			authorized_by_user_id: grant.authorized_by_user_id.clone(),
			status: grant.status,
			expires_at: grant.expires_at,
			last_used_at: grant.last_used_at,
			refresh_token_issued_at: grant.refresh_token_issued_at,
			created_at: grant.created_at,
			updated_at: grant.updated_at,
		}
	}
}

/// Active binding joined with its grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSummary {
	/// Binding identifier.
	pub id: TenantBindingId,
	/// Provider hosting the tenant.
	pub provider: ProviderId,
	/// Provider-side tenant identifier.
	pub tenant_id: ExternalTenantId,
	/// Tenant display name.
	pub tenant_name: String,
	/// When the binding was created.
	#[serde(with = "time::serde::rfc3339")]
	pub connected_at: OffsetDateTime,
	/// Grant serving the binding, if it still exists.
	pub grant: Option<GrantSummary>,
}

/// Integration status of an organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
	/// Whether at least one binding is active.
	pub connected: bool,
	/// Active bindings.
	pub bindings: Vec<BindingSummary>,
	/// Every grant of the organization, revoked ones included.
	pub grants: Vec<GrantSummary>,
}

impl Integrations {
	/// Returns the caller's organization bindings and grants. Any member may read it.
	pub async fn status(&self, caller: &Caller) -> Result<IntegrationStatus> {
		let org = &caller.organization_id;
		let grants = self.store.list_grants(org).await?;
		let bindings = self
			.store
			.list_active_bindings(org)
			.await?
			.into_iter()
			.map(|binding| summarize(binding, &grants))
			.collect::<Vec<_>>();

		Ok(IntegrationStatus {
			connected: !bindings.is_empty(),
			bindings,
			grants: grants.iter().map(GrantSummary::from).collect(),
		})
	}
}

fn summarize(binding: TenantBinding, grants: &[Grant]) -> BindingSummary {
	let grant = grants.iter().find(|grant| grant.id == binding.active_grant_id);

	BindingSummary {
		id: binding.id,
		provider: binding.provider,
		tenant_id: binding.external_tenant_id,
		tenant_name: binding.external_tenant_name,
		connected_at: binding.created_at,
		grant: grant.map(GrantSummary::from),
	}
}
