//! In-process queue and lock backend for tests and single-instance deployments.

// self
use crate::{
	_prelude::*,
	sync::{DeadLetter, LockLease, LockStore, SyncFuture, SyncJob, SyncQueue},
};

#[derive(Debug, Default)]
struct QueueState {
	jobs: VecDeque<String>,
	dead_letters: Vec<DeadLetter>,
	locks: HashMap<String, LockLease>,
}

/// Thread-safe [`SyncQueue`] and [`LockStore`] kept in memory.
///
/// Jobs are stored JSON-encoded, exactly as a shared backend would hold them.
#[derive(Clone, Debug, Default)]
pub struct MemoryQueue(Arc<Mutex<QueueState>>);
impl SyncQueue for MemoryQueue {
	fn enqueue(&self, job: SyncJob) -> SyncFuture<'_, ()> {
		Box::pin(async move {
			let raw = job.encode()?;

			self.0.lock().jobs.push_back(raw);

			Ok(())
		})
	}

	fn dequeue(&self) -> SyncFuture<'_, Option<SyncJob>> {
		Box::pin(async move {
			let raw = self.0.lock().jobs.pop_front();

			raw.as_deref().map(SyncJob::decode).transpose()
		})
	}

	fn len(&self) -> SyncFuture<'_, usize> {
		Box::pin(async move { Ok(self.0.lock().jobs.len()) })
	}

	fn dead_letter(&self, job: SyncJob, reason: String) -> SyncFuture<'_, ()> {
		Box::pin(async move {
			let letter = DeadLetter { job, reason, dead_lettered_at: OffsetDateTime::now_utc() };

			self.0.lock().dead_letters.push(letter);

			Ok(())
		})
	}

	fn dead_letters(&self) -> SyncFuture<'_, Vec<DeadLetter>> {
		Box::pin(async move { Ok(self.0.lock().dead_letters.clone()) })
	}
}
impl LockStore for MemoryQueue {
	fn try_acquire<'a>(
		&'a self,
		name: &'a str,
		ttl: Duration,
	) -> SyncFuture<'a, Option<LockLease>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut state = self.0.lock();

			if state.locks.get(name).is_some_and(|held| !held.is_expired(now)) {
				return Ok(None);
			}

			let lease = LockLease::new(name, ttl, now);

			state.locks.insert(name.to_owned(), lease.clone());

			Ok(Some(lease))
		})
	}

	fn release<'a>(&'a self, lease: &'a LockLease) -> SyncFuture<'a, bool> {
		Box::pin(async move {
			let mut state = self.0.lock();

			if state.locks.get(&lease.name).is_some_and(|held| held.token == lease.token) {
				state.locks.remove(&lease.name);

				return Ok(true);
			}

			Ok(false)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::TenantBindingId;

	fn job(id: &str) -> SyncJob {
		SyncJob::new(TenantBindingId::new(id).expect("Binding fixture should be valid."))
	}

	#[tokio::test]
	async fn queue_is_fifo_and_empty_dequeue_returns_none() {
		let queue = MemoryQueue::default();

		assert!(queue.is_empty().await.expect("Length should be readable."));
		assert_eq!(queue.dequeue().await.expect("Dequeue should succeed."), None);

		for id in ["b-1", "b-2", "b-3"] {
			queue.enqueue(job(id)).await.expect("Enqueue should succeed.");
		}

		assert_eq!(queue.len().await.expect("Length should be readable."), 3);

		for id in ["b-1", "b-2", "b-3"] {
			let next =
				queue.dequeue().await.expect("Dequeue should succeed.").expect("Job expected.");

			assert_eq!(&*next.tenant_binding_id, id);
		}

		assert_eq!(queue.dequeue().await.expect("Dequeue should succeed."), None);
	}

	#[tokio::test]
	async fn locks_are_exclusive_until_released_or_expired() {
		let queue = MemoryQueue::default();
		let lease = queue
			.try_acquire("sync-queue:worker", Duration::seconds(50))
			.await
			.expect("Acquire should succeed.")
			.expect("Free lock should be granted.");

		assert!(
			queue
				.try_acquire("sync-queue:worker", Duration::seconds(50))
				.await
				.expect("Acquire should succeed.")
				.is_none()
		);

		let stranger = LockLease::new("sync-queue:worker", Duration::seconds(50), lease.expires_at);

		assert!(!queue.release(&stranger).await.expect("Release should succeed."));
		assert!(queue.release(&lease).await.expect("Release should succeed."));

		let expired = queue
			.try_acquire("refresh:grant-1", Duration::ZERO)
			.await
			.expect("Acquire should succeed.");

		assert!(expired.is_some());
		assert!(
			queue
				.try_acquire("refresh:grant-1", Duration::seconds(30))
				.await
				.expect("Acquire should succeed.")
				.is_some()
		);
	}
}
