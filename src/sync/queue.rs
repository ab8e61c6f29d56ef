//! FIFO queue contract for sync jobs.

// self
use crate::sync::{DeadLetter, SyncFuture, SyncJob};

/// Ordered job list with a dead-letter side list.
pub trait SyncQueue
where
	Self: Send + Sync,
{
	/// Appends a job at the tail.
	fn enqueue(&self, job: SyncJob) -> SyncFuture<'_, ()>;

	/// Pops the oldest job, or `None` when the queue is empty.
	fn dequeue(&self) -> SyncFuture<'_, Option<SyncJob>>;

	/// Number of queued jobs.
	fn len(&self) -> SyncFuture<'_, usize>;

	/// Returns `true` when no job is queued.
	fn is_empty(&self) -> SyncFuture<'_, bool> {
		Box::pin(async move { Ok(self.len().await? == 0) })
	}

	/// Parks a job that exhausted its attempts.
	fn dead_letter(&self, job: SyncJob, reason: String) -> SyncFuture<'_, ()>;

	/// Lists parked jobs, oldest first.
	fn dead_letters(&self) -> SyncFuture<'_, Vec<DeadLetter>>;
}
