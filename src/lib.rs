//! OAuth integration grants, tenant bindings, and token upkeep for multi-tenant products.
//!
//! The crate keeps per-organization OAuth credentials for a third-party accounting provider
//! usable: grants are sealed at rest, refreshed through a single-flight path, bound to external
//! tenants, revoked when the last binding disconnects, and kept warm by a keep-alive sweep. A
//! locked, bounded worker drains the sync queue with those credentials.

#![deny(clippy::all)]
#![warn(missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod store;
pub mod sync;

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, tower as _};
