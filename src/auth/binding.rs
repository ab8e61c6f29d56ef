//! Tenant bindings that attach an external provider tenant to an organization grant.

// self
use crate::{
	_prelude::*,
	auth::{ExternalTenantId, GrantId, OrganizationId, ProviderId, TenantBindingId},
};

/// Lifecycle status for a tenant binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
	/// Binding is in use.
	Active,
	/// Binding was disconnected.
	Revoked,
}
impl BindingStatus {
	/// Returns a stable label for storage and responses.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Active => "active",
			Self::Revoked => "revoked",
		}
	}
}

/// Link between an organization and one external tenant, served by one grant.
///
/// The binding's grant must belong to the same organization, and an active binding must point
/// at an active grant. Store operations keep both rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantBinding {
	/// Binding identifier.
	pub id: TenantBindingId,
	/// Owning organization.
	pub organization_id: OrganizationId,
	/// Provider hosting the tenant.
	pub provider: ProviderId,
	/// Tenant identifier on the provider side.
	pub external_tenant_id: ExternalTenantId,
	/// Display name reported by the provider.
	pub external_tenant_name: String,
	/// Grant used to call the provider for this tenant.
	pub active_grant_id: GrantId,
	/// Lifecycle status.
	pub status: BindingStatus,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Last mutation instant.
	pub updated_at: OffsetDateTime,
}
impl TenantBinding {
	/// Creates an active binding with a generated identifier.
	pub fn new(
		organization_id: OrganizationId,
		provider: ProviderId,
		external_tenant_id: ExternalTenantId,
		external_tenant_name: impl Into<String>,
		active_grant_id: GrantId,
		now: OffsetDateTime,
	) -> Self {
		Self {
			id: TenantBindingId::generate(),
			organization_id,
			provider,
			external_tenant_id,
			external_tenant_name: external_tenant_name.into(),
			active_grant_id,
			status: BindingStatus::Active,
			created_at: now,
			updated_at: now,
		}
	}

	/// Returns `true` while the binding is usable.
	pub fn is_active(&self) -> bool {
		matches!(self.status, BindingStatus::Active)
	}

	/// Returns `true` when both bindings address the same external tenant.
	pub fn same_tenant(&self, other: &TenantBinding) -> bool {
		self.organization_id == other.organization_id
			&& self.provider == other.provider
			&& self.external_tenant_id == other.external_tenant_id
	}
}
