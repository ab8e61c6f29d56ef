//! Authenticated caller triple handed over by the identity layer.

// self
use crate::{
	_prelude::*,
	auth::{OrganizationId, UserId},
	error::AuthError,
};

/// Role a user holds inside an organization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
	/// Organization owner.
	Owner,
	/// Organization administrator.
	Admin,
	/// Regular member.
	Member,
}
impl OrgRole {
	/// Owners and admins may manage integrations.
	pub fn can_manage_integrations(self) -> bool {
		matches!(self, Self::Owner | Self::Admin)
	}
}

/// Identity of the user performing a request, scoped to one organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
	/// Organization the request acts for.
	pub organization_id: OrganizationId,
	/// User behind the request.
	pub user_id: UserId,
	/// Role of the user inside the organization.
	pub role: OrgRole,
}
impl Caller {
	/// Creates a caller triple.
	pub fn new(organization_id: OrganizationId, user_id: UserId, role: OrgRole) -> Self {
		Self { organization_id, user_id, role }
	}

	/// Fails with [`AuthError::Forbidden`] unless the caller is an owner or admin.
	pub fn require_admin(&self) -> Result<(), AuthError> {
		if self.role.can_manage_integrations() {
			Ok(())
		} else {
			Err(AuthError::Forbidden { required: "owners or admins" })
		}
	}
}
