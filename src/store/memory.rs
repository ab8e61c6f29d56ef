//! Thread-safe in-memory [`GrantStore`] implementation for local development and tests.
//!
//! All tables sit behind one [`RwLock`]; every mutating operation, the whole disconnect
//! transaction included, runs under a single write guard.

// self
use crate::{
	_prelude::*,
	auth::{
		BindingStatus, ExternalTenantId, Grant, GrantId, GrantTokenUpdate, OrganizationId,
		ProviderId, TenantBinding, TenantBindingId,
	},
	store::{
		BindingUpsert, DisconnectOutcome, GrantStore, PendingRevocation, ScrubFn, StoreError,
		StoreFuture,
	},
};

/// Grant, binding, and outbox tables shared by the in-process backends.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct StoreTables {
	grants: BTreeMap<GrantId, Grant>,
	bindings: BTreeMap<TenantBindingId, TenantBinding>,
	pending_revocations: BTreeMap<GrantId, PendingRevocation>,
}
impl StoreTables {
	pub(crate) fn insert_grant(&mut self, grant: Grant) -> Result<(), StoreError> {
		if self.grants.contains_key(&grant.id) {
			return Err(StoreError::constraint(format!("grant `{}` already exists", grant.id)));
		}

		self.grants.insert(grant.id.clone(), grant);

		Ok(())
	}

	pub(crate) fn grant(&self, id: &GrantId) -> Option<Grant> {
		self.grants.get(id).cloned()
	}

	pub(crate) fn grants_for(&self, org: &OrganizationId) -> Vec<Grant> {
		let mut grants = self
			.grants
			.values()
			.filter(|grant| &grant.organization_id == org)
			.cloned()
			.collect::<Vec<_>>();

		grants.sort_by_key(|grant| grant.created_at);

		grants
	}

	pub(crate) fn expiring_grants(&self, before: OffsetDateTime) -> Vec<Grant> {
		self.grants
			.values()
			.filter(|grant| grant.is_active() && grant.expires_at < before)
			.cloned()
			.collect()
	}

	pub(crate) fn update_grant_tokens(&mut self, id: &GrantId, update: GrantTokenUpdate) -> bool {
		match self.grants.get_mut(id) {
			Some(grant) if grant.is_active() => {
				grant.apply(update);

				true
			},
			_ => false,
		}
	}

	pub(crate) fn revoke_grant(&mut self, id: &GrantId, instant: OffsetDateTime) -> Option<Grant> {
		let grant = self.grants.get_mut(id)?;

		grant.revoke(instant);

		Some(grant.clone())
	}

	pub(crate) fn touch_grant(&mut self, id: &GrantId, instant: OffsetDateTime) -> bool {
		match self.grants.get_mut(id) {
			Some(grant) => {
				grant.last_used_at = Some(instant);

				true
			},
			None => false,
		}
	}

	pub(crate) fn upsert_binding(
		&mut self,
		mut binding: TenantBinding,
	) -> Result<BindingUpsert, StoreError> {
		match self.grants.get(&binding.active_grant_id) {
			Some(grant) if grant.organization_id != binding.organization_id =>
				return Err(StoreError::constraint(
					"binding and grant belong to different organizations",
				)),
			Some(grant) if !grant.is_active() =>
				return Err(StoreError::constraint("binding must reference an active grant")),
			Some(_) => {},
			None =>
				return Err(StoreError::constraint(format!(
					"grant `{}` does not exist",
					binding.active_grant_id
				))),
		}

		let existing = self.bindings.values_mut().find(|row| row.same_tenant(&binding));
		let upsert = match existing {
			Some(row) => {
				let previous = (row.active_grant_id != binding.active_grant_id)
					.then(|| row.active_grant_id.clone());

				row.active_grant_id = binding.active_grant_id;
				row.external_tenant_name = binding.external_tenant_name;
				row.status = BindingStatus::Active;
				row.updated_at = binding.updated_at;

				BindingUpsert { binding: row.clone(), previous_grant_id: previous }
			},
			None => {
				binding.status = BindingStatus::Active;

				self.bindings.insert(binding.id.clone(), binding.clone());

				BindingUpsert { binding, previous_grant_id: None }
			},
		};

		Ok(upsert)
	}

	pub(crate) fn binding(&self, id: &TenantBindingId) -> Option<TenantBinding> {
		self.bindings.get(id).cloned()
	}

	pub(crate) fn active_binding(
		&self,
		org: &OrganizationId,
		provider: &ProviderId,
	) -> Option<TenantBinding> {
		self.bindings
			.values()
			.filter(|row| {
				row.is_active() && &row.organization_id == org && &row.provider == provider
			})
			.max_by_key(|row| row.updated_at)
			.cloned()
	}

	pub(crate) fn active_bindings(&self, org: &OrganizationId) -> Vec<TenantBinding> {
		self.bindings
			.values()
			.filter(|row| row.is_active() && &row.organization_id == org)
			.cloned()
			.collect()
	}

	pub(crate) fn bindings_for_tenant(
		&self,
		provider: &ProviderId,
		tenant: &ExternalTenantId,
	) -> Vec<TenantBinding> {
		self.bindings
			.values()
			.filter(|row| {
				row.is_active() && &row.provider == provider && &row.external_tenant_id == tenant
			})
			.cloned()
			.collect()
	}

	pub(crate) fn disconnect_binding(
		&mut self,
		binding_id: &TenantBindingId,
		org: &OrganizationId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> Option<DisconnectOutcome> {
		let binding = self.bindings.get_mut(binding_id).filter(|row| &row.organization_id == org)?;

		if !binding.is_active() {
			return Some(DisconnectOutcome {
				binding: binding.clone(),
				grant_revoked: false,
				revocation: None,
			});
		}

		binding.status = BindingStatus::Revoked;
		binding.updated_at = instant;

		let binding = binding.clone();
		let revocation = self.revoke_orphan(&binding.active_grant_id, scrub, instant);

		Some(DisconnectOutcome { binding, grant_revoked: revocation.is_some(), revocation })
	}

	/// Revokes the grant when it is active and no active binding references it.
	pub(crate) fn revoke_orphan(
		&mut self,
		grant_id: &GrantId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> Option<PendingRevocation> {
		let still_referenced =
			self.bindings.values().any(|row| row.is_active() && &row.active_grant_id == grant_id);

		if still_referenced {
			return None;
		}

		let grant = self.grants.get_mut(grant_id).filter(|grant| grant.is_active())?;
		let pending = PendingRevocation {
			grant_id: grant_id.clone(),
			encrypted_refresh_token: std::mem::replace(&mut grant.encrypted_refresh_token, scrub()),
			queued_at: instant,
		};

		grant.encrypted_access_token = scrub();
		grant.revoke(instant);

		self.pending_revocations.insert(grant_id.clone(), pending.clone());

		Some(pending)
	}

	pub(crate) fn pending_revocations(&self) -> Vec<PendingRevocation> {
		let mut pending = self.pending_revocations.values().cloned().collect::<Vec<_>>();

		pending.sort_by_key(|entry| entry.queued_at);

		pending
	}

	pub(crate) fn clear_pending_revocation(&mut self, grant_id: &GrantId) -> bool {
		self.pending_revocations.remove(grant_id).is_some()
	}
}

type Tables = Arc<RwLock<StoreTables>>;

/// Thread-safe storage backend that keeps records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Tables);
impl MemoryStore {
	fn read<T>(&self, f: impl FnOnce(&StoreTables) -> T) -> T {
		f(&self.0.read())
	}

	fn write<T>(&self, f: impl FnOnce(&mut StoreTables) -> T) -> T {
		f(&mut self.0.write())
	}
}
impl GrantStore for MemoryStore {
	fn insert_grant(&self, grant: Grant) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.write(|tables| tables.insert_grant(grant)) })
	}

	fn fetch_grant<'a>(&'a self, id: &'a GrantId) -> StoreFuture<'a, Option<Grant>> {
		Box::pin(async move { Ok(self.read(|tables| tables.grant(id))) })
	}

	fn list_grants<'a>(&'a self, org: &'a OrganizationId) -> StoreFuture<'a, Vec<Grant>> {
		Box::pin(async move { Ok(self.read(|tables| tables.grants_for(org))) })
	}

	fn list_expiring_grants(&self, before: OffsetDateTime) -> StoreFuture<'_, Vec<Grant>> {
		Box::pin(async move { Ok(self.read(|tables| tables.expiring_grants(before))) })
	}

	fn update_grant_tokens<'a>(
		&'a self,
		id: &'a GrantId,
		update: GrantTokenUpdate,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.write(|tables| tables.update_grant_tokens(id, update))) })
	}

	fn revoke_grant<'a>(
		&'a self,
		id: &'a GrantId,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<Grant>> {
		Box::pin(async move { Ok(self.write(|tables| tables.revoke_grant(id, instant))) })
	}

	fn touch_grant<'a>(&'a self, id: &'a GrantId, instant: OffsetDateTime) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.write(|tables| tables.touch_grant(id, instant));

			Ok(())
		})
	}

	fn upsert_binding(&self, binding: TenantBinding) -> StoreFuture<'_, BindingUpsert> {
		Box::pin(async move { self.write(|tables| tables.upsert_binding(binding)) })
	}

	fn fetch_binding<'a>(
		&'a self,
		id: &'a TenantBindingId,
	) -> StoreFuture<'a, Option<TenantBinding>> {
		Box::pin(async move { Ok(self.read(|tables| tables.binding(id))) })
	}

	fn find_active_binding<'a>(
		&'a self,
		org: &'a OrganizationId,
		provider: &'a ProviderId,
	) -> StoreFuture<'a, Option<TenantBinding>> {
		Box::pin(async move { Ok(self.read(|tables| tables.active_binding(org, provider))) })
	}

	fn list_active_bindings<'a>(
		&'a self,
		org: &'a OrganizationId,
	) -> StoreFuture<'a, Vec<TenantBinding>> {
		Box::pin(async move { Ok(self.read(|tables| tables.active_bindings(org))) })
	}

	fn find_bindings_by_external_tenant<'a>(
		&'a self,
		provider: &'a ProviderId,
		tenant: &'a ExternalTenantId,
	) -> StoreFuture<'a, Vec<TenantBinding>> {
		Box::pin(
			async move { Ok(self.read(|tables| tables.bindings_for_tenant(provider, tenant))) },
		)
	}

	fn disconnect_binding<'a>(
		&'a self,
		binding_id: &'a TenantBindingId,
		org: &'a OrganizationId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<DisconnectOutcome>> {
		Box::pin(async move {
			Ok(self.write(|tables| tables.disconnect_binding(binding_id, org, scrub, instant)))
		})
	}

	fn revoke_orphaned_grant<'a>(
		&'a self,
		grant_id: &'a GrantId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<PendingRevocation>> {
		Box::pin(
			async move { Ok(self.write(|tables| tables.revoke_orphan(grant_id, scrub, instant))) },
		)
	}

	fn list_pending_revocations(&self) -> StoreFuture<'_, Vec<PendingRevocation>> {
		Box::pin(async move { Ok(self.read(StoreTables::pending_revocations)) })
	}

	fn clear_pending_revocation<'a>(&'a self, grant_id: &'a GrantId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.write(|tables| tables.clear_pending_revocation(grant_id));

			Ok(())
		})
	}
}
