//! Background sync pipeline: the job queue, the lock primitive, the worker, and webhook intake.
//!
//! Every queue backend also implements [`LockStore`], so one backend provides both the FIFO job
//! list and the worker's mutual exclusion.

pub mod job;
pub mod lock;
pub mod memory;
pub mod queue;
#[cfg(feature = "redis")] pub mod redis;
pub mod webhook;
pub mod worker;

pub use job::*;
pub use lock::*;
pub use memory::MemoryQueue;
pub use queue::*;
#[cfg(feature = "redis")] pub use redis::RedisQueue;
pub use webhook::*;
pub use worker::*;

// self
use crate::{_prelude::*, error::SyncError};

/// Boxed future returned by [`SyncQueue`] and [`LockStore`] methods.
pub type SyncFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SyncError>> + 'a + Send>>;
