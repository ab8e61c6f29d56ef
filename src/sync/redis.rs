//! Redis-backed queue and lock store shared by every worker instance.
//!
//! Jobs live in a list (`RPUSH`/`LPOP`), locks are `SET NX PX` keys holding the owner token,
//! and releases go through a compare-and-delete script so a lease taken over after its TTL is
//! never released by the previous holder.

// crates.io
use redis::{Client, RedisError, Script, aio::ConnectionManager};
// self
use crate::{
	_prelude::*,
	error::SyncError,
	sync::{DeadLetter, LockLease, LockStore, SyncFuture, SyncJob, SyncQueue},
};

const DEFAULT_PREFIX: &str = "oauth2-keeper";
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
	return redis.call("DEL", KEYS[1])
else
	return 0
end
"#;

/// [`SyncQueue`] and [`LockStore`] on top of a Redis connection manager.
#[derive(Clone)]
pub struct RedisQueue {
	manager: ConnectionManager,
	prefix: String,
}
impl RedisQueue {
	/// Connects to `url` using the default key prefix.
	pub async fn connect(url: &str) -> Result<Self, SyncError> {
		let client = Client::open(url).map_err(queue_error)?;
		let manager = ConnectionManager::new(client).await.map_err(queue_error)?;

		Ok(Self::with_manager(manager))
	}

	/// Wraps an existing connection manager.
	pub fn with_manager(manager: ConnectionManager) -> Self {
		Self { manager, prefix: DEFAULT_PREFIX.into() }
	}

	/// Overrides the key prefix, for sharing one Redis between deployments.
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = prefix.into();

		self
	}

	fn jobs_key(&self) -> String {
		format!("{}:sync-queue", self.prefix)
	}

	fn dead_letters_key(&self) -> String {
		format!("{}:sync-queue:dead", self.prefix)
	}

	fn lock_key(&self, name: &str) -> String {
		format!("{}:lock:{name}", self.prefix)
	}
}
impl Debug for RedisQueue {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisQueue").field("prefix", &self.prefix).finish()
	}
}
impl SyncQueue for RedisQueue {
	fn enqueue(&self, job: SyncJob) -> SyncFuture<'_, ()> {
		Box::pin(async move {
			let mut conn = self.manager.clone();

			redis::cmd("RPUSH")
				.arg(self.jobs_key())
				.arg(job.encode()?)
				.query_async(&mut conn)
				.await
				.map_err(queue_error)
		})
	}

	fn dequeue(&self) -> SyncFuture<'_, Option<SyncJob>> {
		Box::pin(async move {
			let mut conn = self.manager.clone();
			let raw: Option<String> = redis::cmd("LPOP")
				.arg(self.jobs_key())
				.query_async(&mut conn)
				.await
				.map_err(queue_error)?;

			raw.as_deref().map(SyncJob::decode).transpose()
		})
	}

	fn len(&self) -> SyncFuture<'_, usize> {
		Box::pin(async move {
			let mut conn = self.manager.clone();

			redis::cmd("LLEN")
				.arg(self.jobs_key())
				.query_async(&mut conn)
				.await
				.map_err(queue_error)
		})
	}

	fn dead_letter(&self, job: SyncJob, reason: String) -> SyncFuture<'_, ()> {
		Box::pin(async move {
			let mut conn = self.manager.clone();
			let letter = DeadLetter { job, reason, dead_lettered_at: OffsetDateTime::now_utc() };
			let raw = serde_json::to_string(&letter)
				.map_err(|e| SyncError::InvalidJob { message: e.to_string() })?;

			redis::cmd("RPUSH")
				.arg(self.dead_letters_key())
				.arg(raw)
				.query_async(&mut conn)
				.await
				.map_err(queue_error)
		})
	}

	fn dead_letters(&self) -> SyncFuture<'_, Vec<DeadLetter>> {
		Box::pin(async move {
			let mut conn = self.manager.clone();
			let raw: Vec<String> = redis::cmd("LRANGE")
				.arg(self.dead_letters_key())
				.arg(0)
				.arg(-1)
				.query_async(&mut conn)
				.await
				.map_err(queue_error)?;

			raw.iter()
				.map(|entry| {
					serde_json::from_str(entry)
						.map_err(|e| SyncError::InvalidJob { message: e.to_string() })
				})
				.collect()
		})
	}
}
impl LockStore for RedisQueue {
	fn try_acquire<'a>(
		&'a self,
		name: &'a str,
		ttl: Duration,
	) -> SyncFuture<'a, Option<LockLease>> {
		Box::pin(async move {
			let mut conn = self.manager.clone();
			let lease = LockLease::new(name, ttl, OffsetDateTime::now_utc());
			let ttl_ms = i64::try_from(ttl.whole_milliseconds()).unwrap_or(i64::MAX).max(1);
			let reply: Option<String> = redis::cmd("SET")
				.arg(self.lock_key(name))
				.arg(&lease.token)
				.arg("NX")
				.arg("PX")
				.arg(ttl_ms)
				.query_async(&mut conn)
				.await
				.map_err(lock_error)?;

			Ok(reply.map(|_| lease))
		})
	}

	fn release<'a>(&'a self, lease: &'a LockLease) -> SyncFuture<'a, bool> {
		Box::pin(async move {
			let mut conn = self.manager.clone();
			let removed: i64 = Script::new(RELEASE_SCRIPT)
				.key(self.lock_key(&lease.name))
				.arg(&lease.token)
				.invoke_async(&mut conn)
				.await
				.map_err(lock_error)?;

			Ok(removed == 1)
		})
	}
}

fn queue_error(e: RedisError) -> SyncError {
	SyncError::Queue { message: e.to_string() }
}

fn lock_error(e: RedisError) -> SyncError {
	SyncError::Lock { message: e.to_string() }
}
