//! Locked, bounded batch processor for the sync queue.
//!
//! A run takes the `sync-queue:worker` lock, drains up to `batch_size` jobs, and hands each one
//! an [`AuthorizedClient`] through the token service. Failed jobs are requeued after the batch
//! with one more attempt recorded, so a run never picks them up twice; jobs that ran out of
//! attempts, or that can never succeed, are dead-lettered.

// self
use crate::{
	_prelude::*,
	config::WorkerOptions,
	error::TokenError,
	flows::{AuthorizedClient, Integrations},
	obs::{self, FlowKind, JobOutcome},
	sync::{LockStore, SyncJob, SyncQueue},
};

/// Name of the lock serializing worker runs.
pub const WORKER_LOCK: &str = "sync-queue:worker";

/// Boxed future returned by [`SyncJobHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Application logic syncing one job's data with an authorized client.
pub trait SyncJobHandler
where
	Self: Send + Sync,
{
	/// Processes `job`.
	fn handle<'a>(&'a self, job: &'a SyncJob, client: &'a AuthorizedClient) -> HandlerFuture<'a>;
}

/// Outcome of [`SyncWorker::run_once`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerRun {
	/// Another run holds the worker lock; nothing was dequeued.
	AlreadyRunning,
	/// The batch was processed.
	Completed(WorkerReport),
}

/// Counters for one worker run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
	/// Jobs dequeued.
	pub processed: usize,
	/// Jobs the handler completed.
	pub succeeded: usize,
	/// Jobs that failed.
	pub failed: usize,
	/// Failed jobs put back for a later run.
	pub requeued: usize,
	/// Failed jobs parked in the dead-letter list.
	pub dead_lettered: usize,
}

/// Drains the sync queue under the worker lock.
#[derive(Clone)]
pub struct SyncWorker {
	integrations: Integrations,
	queue: Arc<dyn SyncQueue>,
	locks: Arc<dyn LockStore>,
	handler: Arc<dyn SyncJobHandler>,
	options: WorkerOptions,
}
impl SyncWorker {
	/// Creates a worker with default [`WorkerOptions`].
	pub fn new(
		integrations: Integrations,
		queue: Arc<dyn SyncQueue>,
		locks: Arc<dyn LockStore>,
		handler: Arc<dyn SyncJobHandler>,
	) -> Self {
		Self { integrations, queue, locks, handler, options: WorkerOptions::default() }
	}

	/// Replaces the worker tunables.
	pub fn with_options(mut self, options: WorkerOptions) -> Self {
		self.options = options;

		self
	}

	/// Queue the worker drains.
	pub fn queue(&self) -> &Arc<dyn SyncQueue> {
		&self.queue
	}

	/// Runs one batch unless another run holds the lock.
	///
	/// The lock is released after the batch on every path, errors included; a crashed run leaves
	/// it to expire by TTL.
	pub async fn run_once(&self) -> Result<WorkerRun> {
		obs::observe(FlowKind::Sync, "run_once", async {
			let Some(lease) = self.locks.try_acquire(WORKER_LOCK, self.options.lock_ttl).await?
			else {
				tracing::debug!("Sync worker lock is held elsewhere.");

				return Ok(WorkerRun::AlreadyRunning);
			};
			let mut report = WorkerReport::default();
			let mut retries = Vec::new();
			let drained = self.drain(&mut report, &mut retries).await;
			let requeued = self.requeue(retries, &mut report).await;

			if let Err(e) = self.locks.release(&lease).await {
				tracing::warn!(error = %e, "Sync worker lock release failed.");
			}

			drained.and(requeued)?;

			tracing::info!(
				processed = report.processed,
				succeeded = report.succeeded,
				failed = report.failed,
				"Sync worker run completed."
			);

			Ok(WorkerRun::Completed(report))
		})
		.await
	}

	async fn drain(&self, report: &mut WorkerReport, retries: &mut Vec<SyncJob>) -> Result<()> {
		while report.processed < self.options.batch_size {
			let Some(job) = self.queue.dequeue().await? else {
				break;
			};

			report.processed += 1;

			let Err(e) = self.process(&job).await else {
				report.succeeded += 1;

				obs::record_job_outcome(JobOutcome::Succeeded);

				continue;
			};

			report.failed += 1;

			let job = job.next_attempt();

			tracing::warn!(
				binding_id = %job.tenant_binding_id,
				attempts = job.attempts,
				error = %e,
				"Sync job failed."
			);

			if job.attempts >= self.options.max_attempts || !is_retryable(&e) {
				self.queue.dead_letter(job, e.safe_message()).await?;

				report.dead_lettered += 1;

				obs::record_job_outcome(JobOutcome::DeadLettered);
			} else {
				retries.push(job);
			}
		}

		Ok(())
	}

	async fn requeue(&self, retries: Vec<SyncJob>, report: &mut WorkerReport) -> Result<()> {
		for job in retries {
			self.queue.enqueue(job).await?;

			report.requeued += 1;

			obs::record_job_outcome(JobOutcome::Requeued);
		}

		Ok(())
	}

	async fn process(&self, job: &SyncJob) -> Result<()> {
		let binding = self
			.integrations
			.store()
			.fetch_binding(&job.tenant_binding_id)
			.await?
			.ok_or_else(|| Error::not_found("tenant binding", &job.tenant_binding_id))?;
		let client = self
			.integrations
			.client_for_tenant_binding(&binding.id, &binding.organization_id, false)
			.await?;

		self.handler.handle(job, &client).await
	}
}
impl Debug for SyncWorker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SyncWorker").field("options", &self.options).finish()
	}
}

// Missing records, rejected input, and revoked grants fail the same way on every attempt.
fn is_retryable(e: &Error) -> bool {
	!matches!(e, Error::NotFound { .. } | Error::Validation { .. } | Error::Auth(_))
		&& !e.as_token_error().is_some_and(TokenError::is_revoked)
}
