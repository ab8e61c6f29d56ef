//! PostgreSQL-backed [`GrantStore`] for multi-instance deployments.
//!
//! The disconnect transaction locks the binding and then the grant row (`SELECT … FOR UPDATE`)
//! before checking for other active bindings, so two concurrent disconnects of bindings that share
//! a grant serialize on the grant row and only one of them revokes it.

// crates.io
use sqlx::{FromRow, PgPool, Postgres, Transaction, postgres::PgPoolOptions};
// self
use crate::{
	_prelude::*,
	auth::{
		BindingStatus, ExternalTenantId, Grant, GrantId, GrantStatus, GrantTokenUpdate,
		OrganizationId, ProviderId, TenantBinding, TenantBindingId, UserId,
	},
	store::{
		BindingUpsert, DisconnectOutcome, GrantStore, PendingRevocation, ScrubFn, StoreError,
		StoreFuture,
	},
};

macro_rules! grant_columns {
	() => {
		"id, organization_id, authorized_by_user_id, provider, encrypted_access_token, \
		 encrypted_refresh_token, status, expires_at, last_used_at, refresh_token_issued_at, \
		 created_at, updated_at"
	};
}

macro_rules! binding_columns {
	() => {
		"id, organization_id, provider, external_tenant_id, external_tenant_name, active_grant_id, \
		 status, created_at, updated_at"
	};
}

/// Grant and binding tables stored in PostgreSQL.
#[derive(Clone, Debug)]
pub struct PostgresStore {
	pool: PgPool,
}
impl PostgresStore {
	/// Wraps an existing pool.
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Connects a new pool.
	pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
		let pool = PgPoolOptions::new()
			.max_connections(max_connections)
			.connect(url)
			.await
			.map_err(backend)?;

		Ok(Self::new(pool))
	}

	/// Applies the bundled schema migrations.
	pub async fn migrate(&self) -> Result<(), StoreError> {
		sqlx::migrate!("./migrations").run(&self.pool).await.map_err(backend)
	}

	async fn revoke_orphan_in(
		tx: &mut Transaction<'_, Postgres>,
		grant_id: &GrantId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> Result<Option<PendingRevocation>, StoreError> {
		let locked: Option<(String, String)> = sqlx::query_as(
			"SELECT status, encrypted_refresh_token FROM integration_grants WHERE id = $1 FOR UPDATE",
		)
		.bind(grant_id.as_ref())
		.fetch_optional(&mut **tx)
		.await
		.map_err(backend)?;
		let Some((status, encrypted_refresh_token)) = locked else {
			return Ok(None);
		};

		if parse_grant_status(&status)? != GrantStatus::Active {
			return Ok(None);
		}

		let still_referenced: bool = sqlx::query_scalar(
			"SELECT EXISTS (SELECT 1 FROM tenant_bindings \
			 WHERE active_grant_id = $1 AND status = 'active')",
		)
		.bind(grant_id.as_ref())
		.fetch_one(&mut **tx)
		.await
		.map_err(backend)?;

		if still_referenced {
			return Ok(None);
		}

		sqlx::query(
			"UPDATE integration_grants SET status = 'revoked', encrypted_access_token = $2, \
			 encrypted_refresh_token = $3, updated_at = $4 WHERE id = $1",
		)
		.bind(grant_id.as_ref())
		.bind(scrub())
		.bind(scrub())
		.bind(instant)
		.execute(&mut **tx)
		.await
		.map_err(backend)?;
		sqlx::query(
			"INSERT INTO pending_revocations (grant_id, encrypted_refresh_token, queued_at) \
			 VALUES ($1, $2, $3) ON CONFLICT (grant_id) DO UPDATE SET \
			 encrypted_refresh_token = EXCLUDED.encrypted_refresh_token, queued_at = EXCLUDED.queued_at",
		)
		.bind(grant_id.as_ref())
		.bind(&encrypted_refresh_token)
		.bind(instant)
		.execute(&mut **tx)
		.await
		.map_err(backend)?;

		Ok(Some(PendingRevocation {
			grant_id: grant_id.clone(),
			encrypted_refresh_token,
			queued_at: instant,
		}))
	}

	async fn disconnect_now(
		&self,
		binding_id: &TenantBindingId,
		org: &OrganizationId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> Result<Option<DisconnectOutcome>, StoreError> {
		let mut tx = self.pool.begin().await.map_err(backend)?;
		let row: Option<BindingRow> = sqlx::query_as(concat!(
			"SELECT ",
			binding_columns!(),
			" FROM tenant_bindings WHERE id = $1 AND organization_id = $2 FOR UPDATE"
		))
		.bind(binding_id.as_ref())
		.bind(org.as_ref())
		.fetch_optional(&mut *tx)
		.await
		.map_err(backend)?;
		let Some(row) = row else {
			tx.rollback().await.map_err(backend)?;

			return Ok(None);
		};
		let mut binding = TenantBinding::try_from(row)?;

		if !binding.is_active() {
			tx.commit().await.map_err(backend)?;

			return Ok(Some(DisconnectOutcome { binding, grant_revoked: false, revocation: None }));
		}

		sqlx::query("UPDATE tenant_bindings SET status = 'revoked', updated_at = $2 WHERE id = $1")
			.bind(binding_id.as_ref())
			.bind(instant)
			.execute(&mut *tx)
			.await
			.map_err(backend)?;

		binding.status = BindingStatus::Revoked;
		binding.updated_at = instant;

		let revocation =
			Self::revoke_orphan_in(&mut tx, &binding.active_grant_id, scrub, instant).await?;

		tx.commit().await.map_err(backend)?;

		Ok(Some(DisconnectOutcome { binding, grant_revoked: revocation.is_some(), revocation }))
	}

	async fn upsert_now(&self, binding: TenantBinding) -> Result<BindingUpsert, StoreError> {
		let mut tx = self.pool.begin().await.map_err(backend)?;
		let grant: Option<(String, String)> = sqlx::query_as(
			"SELECT organization_id, status FROM integration_grants WHERE id = $1 FOR SHARE",
		)
		.bind(binding.active_grant_id.as_ref())
		.fetch_optional(&mut *tx)
		.await
		.map_err(backend)?;

		match grant {
			Some((org, _)) if org != binding.organization_id.as_ref() =>
				return Err(StoreError::constraint(
					"binding and grant belong to different organizations",
				)),
			Some((_, status)) if parse_grant_status(&status)? != GrantStatus::Active =>
				return Err(StoreError::constraint("binding must reference an active grant")),
			Some(_) => {},
			None =>
				return Err(StoreError::constraint(format!(
					"grant `{}` does not exist",
					binding.active_grant_id
				))),
		}

		let previous: Option<String> = sqlx::query_scalar(
			"SELECT active_grant_id FROM tenant_bindings \
			 WHERE organization_id = $1 AND provider = $2 AND external_tenant_id = $3 FOR UPDATE",
		)
		.bind(binding.organization_id.as_ref())
		.bind(binding.provider.as_ref())
		.bind(binding.external_tenant_id.as_ref())
		.fetch_optional(&mut *tx)
		.await
		.map_err(backend)?;
		let row: BindingRow = sqlx::query_as(concat!(
			"INSERT INTO tenant_bindings (",
			binding_columns!(),
			") VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $8) \
			 ON CONFLICT (organization_id, provider, external_tenant_id) DO UPDATE SET \
			 active_grant_id = EXCLUDED.active_grant_id, \
			 external_tenant_name = EXCLUDED.external_tenant_name, \
			 status = 'active', updated_at = EXCLUDED.updated_at RETURNING ",
			binding_columns!()
		))
		.bind(binding.id.as_ref())
		.bind(binding.organization_id.as_ref())
		.bind(binding.provider.as_ref())
		.bind(binding.external_tenant_id.as_ref())
		.bind(&binding.external_tenant_name)
		.bind(binding.active_grant_id.as_ref())
		.bind(binding.created_at)
		.bind(binding.updated_at)
		.fetch_one(&mut *tx)
		.await
		.map_err(backend)?;

		tx.commit().await.map_err(backend)?;

		let previous_grant_id = previous
			.filter(|id| id != binding.active_grant_id.as_ref())
			.map(|id| GrantId::new(id).map_err(serialization))
			.transpose()?;

		Ok(BindingUpsert { binding: row.try_into()?, previous_grant_id })
	}

	async fn revoke_orphan_now(
		&self,
		grant_id: &GrantId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> Result<Option<PendingRevocation>, StoreError> {
		let mut tx = self.pool.begin().await.map_err(backend)?;
		let revocation = Self::revoke_orphan_in(&mut tx, grant_id, scrub, instant).await?;

		tx.commit().await.map_err(backend)?;

		Ok(revocation)
	}

	async fn grants_where(
		&self,
		clause: &'static str,
		bind: GrantFilter<'_>,
	) -> Result<Vec<Grant>, StoreError> {
		let sql = format!("SELECT {} FROM integration_grants WHERE {clause}", grant_columns!());
		let query = sqlx::query_as::<_, GrantRow>(&sql);
		let query = match bind {
			GrantFilter::Organization(org) => query.bind(org.as_ref()),
			GrantFilter::ExpiringBefore(before) => query.bind(before),
		};
		let rows = query.fetch_all(&self.pool).await.map_err(backend)?;

		rows.into_iter().map(Grant::try_from).collect()
	}

	async fn bindings_where(
		&self,
		clause: &'static str,
		first: &str,
		second: Option<&str>,
	) -> Result<Vec<TenantBinding>, StoreError> {
		let sql = format!("SELECT {} FROM tenant_bindings WHERE {clause}", binding_columns!());
		let mut query = sqlx::query_as::<_, BindingRow>(&sql).bind(first);

		if let Some(second) = second {
			query = query.bind(second);
		}

		let rows = query.fetch_all(&self.pool).await.map_err(backend)?;

		rows.into_iter().map(TenantBinding::try_from).collect()
	}
}
impl GrantStore for PostgresStore {
	fn insert_grant(&self, grant: Grant) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			sqlx::query(concat!(
				"INSERT INTO integration_grants (",
				grant_columns!(),
				") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
			))
			.bind(grant.id.as_ref())
			.bind(grant.organization_id.as_ref())
			.bind(grant.authorized_by_user_id.as_ref())
			.bind(grant.provider.as_ref())
			.bind(&grant.encrypted_access_token)
			.bind(&grant.encrypted_refresh_token)
			.bind(grant.status.as_str())
			.bind(grant.expires_at)
			.bind(grant.last_used_at)
			.bind(grant.refresh_token_issued_at)
			.bind(grant.created_at)
			.bind(grant.updated_at)
			.execute(&self.pool)
			.await
			.map_err(|e| match e {
				sqlx::Error::Database(ref db) if db.is_unique_violation() =>
					StoreError::constraint(format!("grant `{}` already exists", grant.id)),
				_ => backend(e),
			})?;

			Ok(())
		})
	}

	fn fetch_grant<'a>(&'a self, id: &'a GrantId) -> StoreFuture<'a, Option<Grant>> {
		Box::pin(async move {
			let row: Option<GrantRow> = sqlx::query_as(concat!(
				"SELECT ",
				grant_columns!(),
				" FROM integration_grants WHERE id = $1"
			))
			.bind(id.as_ref())
			.fetch_optional(&self.pool)
			.await
			.map_err(backend)?;

			row.map(Grant::try_from).transpose()
		})
	}

	fn list_grants<'a>(&'a self, org: &'a OrganizationId) -> StoreFuture<'a, Vec<Grant>> {
		Box::pin(async move {
			self.grants_where(
				"organization_id = $1 ORDER BY created_at",
				GrantFilter::Organization(org),
			)
			.await
		})
	}

	fn list_expiring_grants(&self, before: OffsetDateTime) -> StoreFuture<'_, Vec<Grant>> {
		Box::pin(async move {
			self.grants_where(
				"status = 'active' AND expires_at < $1 ORDER BY expires_at",
				GrantFilter::ExpiringBefore(before),
			)
			.await
		})
	}

	fn update_grant_tokens<'a>(
		&'a self,
		id: &'a GrantId,
		update: GrantTokenUpdate,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let result = sqlx::query(
				"UPDATE integration_grants SET encrypted_access_token = $2, \
				 encrypted_refresh_token = COALESCE($3, encrypted_refresh_token), \
				 refresh_token_issued_at = \
				 CASE WHEN $3 IS NULL THEN refresh_token_issued_at ELSE $5 END, \
				 expires_at = $4, updated_at = $5 WHERE id = $1 AND status = 'active'",
			)
			.bind(id.as_ref())
			.bind(&update.encrypted_access_token)
			.bind(update.encrypted_refresh_token.as_deref())
			.bind(update.expires_at)
			.bind(update.updated_at)
			.execute(&self.pool)
			.await
			.map_err(backend)?;

			Ok(result.rows_affected() == 1)
		})
	}

	fn revoke_grant<'a>(
		&'a self,
		id: &'a GrantId,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<Grant>> {
		Box::pin(async move {
			let row: Option<GrantRow> = sqlx::query_as(concat!(
				"UPDATE integration_grants SET status = 'revoked', updated_at = $2 \
				 WHERE id = $1 RETURNING ",
				grant_columns!()
			))
			.bind(id.as_ref())
			.bind(instant)
			.fetch_optional(&self.pool)
			.await
			.map_err(backend)?;

			row.map(Grant::try_from).transpose()
		})
	}

	fn touch_grant<'a>(&'a self, id: &'a GrantId, instant: OffsetDateTime) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			sqlx::query("UPDATE integration_grants SET last_used_at = $2 WHERE id = $1")
				.bind(id.as_ref())
				.bind(instant)
				.execute(&self.pool)
				.await
				.map_err(backend)?;

			Ok(())
		})
	}

	fn upsert_binding(&self, binding: TenantBinding) -> StoreFuture<'_, BindingUpsert> {
		Box::pin(self.upsert_now(binding))
	}

	fn fetch_binding<'a>(
		&'a self,
		id: &'a TenantBindingId,
	) -> StoreFuture<'a, Option<TenantBinding>> {
		Box::pin(async move {
			let mut rows = self.bindings_where("id = $1", id.as_ref(), None).await?;

			Ok(rows.pop())
		})
	}

	fn find_active_binding<'a>(
		&'a self,
		org: &'a OrganizationId,
		provider: &'a ProviderId,
	) -> StoreFuture<'a, Option<TenantBinding>> {
		Box::pin(async move {
			let mut rows = self
				.bindings_where(
					"organization_id = $1 AND provider = $2 AND status = 'active' \
					 ORDER BY updated_at DESC LIMIT 1",
					org.as_ref(),
					Some(provider.as_ref()),
				)
				.await?;

			Ok(rows.pop())
		})
	}

	fn list_active_bindings<'a>(
		&'a self,
		org: &'a OrganizationId,
	) -> StoreFuture<'a, Vec<TenantBinding>> {
		Box::pin(async move {
			self.bindings_where(
				"organization_id = $1 AND status = 'active' ORDER BY created_at",
				org.as_ref(),
				None,
			)
			.await
		})
	}

	fn find_bindings_by_external_tenant<'a>(
		&'a self,
		provider: &'a ProviderId,
		tenant: &'a ExternalTenantId,
	) -> StoreFuture<'a, Vec<TenantBinding>> {
		Box::pin(async move {
			self.bindings_where(
				"provider = $1 AND external_tenant_id = $2 AND status = 'active'",
				provider.as_ref(),
				Some(tenant.as_ref()),
			)
			.await
		})
	}

	fn disconnect_binding<'a>(
		&'a self,
		binding_id: &'a TenantBindingId,
		org: &'a OrganizationId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<DisconnectOutcome>> {
		Box::pin(self.disconnect_now(binding_id, org, scrub, instant))
	}

	fn revoke_orphaned_grant<'a>(
		&'a self,
		grant_id: &'a GrantId,
		scrub: ScrubFn,
		instant: OffsetDateTime,
	) -> StoreFuture<'a, Option<PendingRevocation>> {
		Box::pin(self.revoke_orphan_now(grant_id, scrub, instant))
	}

	fn list_pending_revocations(&self) -> StoreFuture<'_, Vec<PendingRevocation>> {
		Box::pin(async move {
			let rows: Vec<(String, String, OffsetDateTime)> = sqlx::query_as(
				"SELECT grant_id, encrypted_refresh_token, queued_at FROM pending_revocations \
				 ORDER BY queued_at",
			)
			.fetch_all(&self.pool)
			.await
			.map_err(backend)?;

			rows.into_iter()
				.map(|(grant_id, encrypted_refresh_token, queued_at)| {
					Ok(PendingRevocation {
						grant_id: GrantId::new(grant_id).map_err(serialization)?,
						encrypted_refresh_token,
						queued_at,
					})
				})
				.collect()
		})
	}

	fn clear_pending_revocation<'a>(&'a self, grant_id: &'a GrantId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			sqlx::query("DELETE FROM pending_revocations WHERE grant_id = $1")
				.bind(grant_id.as_ref())
				.execute(&self.pool)
				.await
				.map_err(backend)?;

			Ok(())
		})
	}
}

enum GrantFilter<'a> {
	Organization(&'a OrganizationId),
	ExpiringBefore(OffsetDateTime),
}

#[derive(FromRow)]
struct GrantRow {
	id: String,
	organization_id: String,
	authorized_by_user_id: String,
	provider: String,
	encrypted_access_token: String,
	encrypted_refresh_token: String,
	status: String,
	expires_at: OffsetDateTime,
	last_used_at: Option<OffsetDateTime>,
	refresh_token_issued_at: OffsetDateTime,
	created_at: OffsetDateTime,
	updated_at: OffsetDateTime,
}
impl TryFrom<GrantRow> for Grant {
	type Error = StoreError;

	fn try_from(row: GrantRow) -> Result<Self, Self::Error> {
		Ok(Self {
			id: GrantId::new(row.id).map_err(serialization)?,
			organization_id: OrganizationId::new(row.organization_id).map_err(serialization)?,
			authorized_by_user_id: UserId::new(row.authorized_by_user_id).map_err(serialization)?,
			provider: ProviderId::new(row.provider).map_err(serialization)?,
			encrypted_access_token: row.encrypted_access_token,
			encrypted_refresh_token: row.encrypted_refresh_token,
			status: parse_grant_status(&row.status)?,
			expires_at: row.expires_at,
			last_used_at: row.last_used_at,
			refresh_token_issued_at: row.refresh_token_issued_at,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(FromRow)]
struct BindingRow {
	id: String,
	organization_id: String,
	provider: String,
	external_tenant_id: String,
	external_tenant_name: String,
	active_grant_id: String,
	status: String,
	created_at: OffsetDateTime,
	updated_at: OffsetDateTime,
}
impl TryFrom<BindingRow> for TenantBinding {
	type Error = StoreError;

	fn try_from(row: BindingRow) -> Result<Self, Self::Error> {
		let status = match row.status.as_str() {
			"active" => BindingStatus::Active,
			"revoked" => BindingStatus::Revoked,
			other => return Err(serialization(format!("unknown binding status `{other}`"))),
		};

		Ok(Self {
			id: TenantBindingId::new(row.id).map_err(serialization)?,
			organization_id: OrganizationId::new(row.organization_id).map_err(serialization)?,
			provider: ProviderId::new(row.provider).map_err(serialization)?,
			external_tenant_id: ExternalTenantId::new(row.external_tenant_id)
				.map_err(serialization)?,
			external_tenant_name: row.external_tenant_name,
			active_grant_id: GrantId::new(row.active_grant_id).map_err(serialization)?,
			status,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

fn parse_grant_status(value: &str) -> Result<GrantStatus, StoreError> {
	match value {
		"active" => Ok(GrantStatus::Active),
		"revoked" => Ok(GrantStatus::Revoked),
		other => Err(serialization(format!("unknown grant status `{other}`"))),
	}
}

fn backend(e: impl Display) -> StoreError {
	StoreError::Backend { message: e.to_string() }
}

fn serialization(e: impl Display) -> StoreError {
	StoreError::Serialization { message: e.to_string() }
}
