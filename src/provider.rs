//! Provider-facing descriptors (data), strategies (classification), and the API seam.
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering HTTPS-only
//! endpoints (authorize, token, revocation, tenant listing, API base), requested scopes, client
//! authentication preferences, and provider quirks. `strategy` defines [`ProviderStrategy`],
//! an HTTP-client-agnostic hook that maps failed responses into [`ProviderErrorKind`]s.
//! `api` defines [`ProviderApi`], the boundary flows call to reach the provider.

pub mod api;
pub mod descriptor;
pub mod strategy;

pub use api::*;
pub use descriptor::*;
pub use strategy::*;
