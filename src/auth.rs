//! Integration-domain identifiers, callers, grants, and tenant bindings.

pub mod binding;
pub mod caller;
pub mod grant;
pub mod id;
pub mod secret;

pub use binding::*;
pub use caller::*;
pub use grant::*;
pub use id::*;
pub use secret::*;
