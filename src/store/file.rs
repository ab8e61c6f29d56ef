//! Simple file-backed [`GrantStore`] for lightweight single-instance deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{
		ExternalTenantId, Grant, GrantId, GrantTokenUpdate, OrganizationId, ProviderId,
		TenantBinding, TenantBindingId,
	},
	store::{
		BindingUpsert, DisconnectOutcome, GrantStore, PendingRevocation, ScrubFn, StoreError,
		StoreFuture, memory::StoreTables,
	},
};

/// Persists the grant and binding tables to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<StoreTables>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<StoreTables, StoreError> {
		if !path.exists() {
			return Ok(StoreTables::default());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(StoreTables::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &StoreTables) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn read<T>(&self, f: impl FnOnce(&StoreTables) -> T) -> T {
		f(&self.inner.read())
	}

	/// Runs `f` under the write guard and persists the snapshot when `changed` says so.
	fn mutate<T>(
		&self,
		f: impl FnOnce(&mut StoreTables) -> Result<T, StoreError>,
		changed: impl FnOnce(&T) -> bool,
	) -> Result<T, StoreError> {
		let mut guard = self.inner.write();
		let value = f(&mut guard)?;

		if changed(&value) {
			self.persist_locked(&guard)?;
		}

		Ok(value)
	}
}
impl GrantStore for FileStore {
	fn insert_grant(&self, grant: Grant) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(|tables| tables.insert_grant(grant), |_| true) })
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
		Box::pin(async move {
			self.mutate(|tables| Ok(tables.update_grant_tokens(id, update)), |applied| *applied)
		})
	}

	fn revoke_grant<'a>(
		&'a self,
		id: &'a GrantId,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<Grant>> {
		Box::pin(async move {
			self.mutate(|tables| Ok(tables.revoke_grant(id, instant)), Option::is_some)
		})
	}

	fn touch_grant<'a>(&'a self, id: &'a GrantId, instant: OffsetDateTime) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|tables| Ok(tables.touch_grant(id, instant)), |touched| *touched)?;

			Ok(())
		})
	}

	fn upsert_binding(&self, binding: TenantBinding) -> StoreFuture<'_, BindingUpsert> {
		Box::pin(async move { self.mutate(|tables| tables.upsert_binding(binding), |_| true) })
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
			self.mutate(
				|tables| Ok(tables.disconnect_binding(binding_id, org, scrub, instant)),
				Option::is_some,
			)
		})
	}

	fn revoke_orphaned_grant<'a>(
		&'a self,
		grant_id: &'a GrantId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<PendingRevocation>> {
		Box::pin(async move {
			self.mutate(
				|tables| Ok(tables.revoke_orphan(grant_id, scrub, instant)),
				Option::is_some,
			)
		})
	}

	fn list_pending_revocations(&self) -> StoreFuture<'_, Vec<PendingRevocation>> {
		Box::pin(async move { Ok(self.read(StoreTables::pending_revocations)) })
	}

	fn clear_pending_revocation<'a>(&'a self, grant_id: &'a GrantId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(
				|tables| Ok(tables.clear_pending_revocation(grant_id)),
				|cleared| *cleared,
			)?;

			Ok(())
		})
	}
}
