//! Validated identifiers for organizations, users, grants, bindings, and provider tenants.
//!
//! Every identifier is a non-empty string of at most [`IDENTIFIER_MAX_LEN`] bytes without
//! whitespace. Validation runs on construction and on deserialization, so a value read back from
//! storage or a request body is as trustworthy as one built in code.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use uuid::Uuid;
// self
use crate::_prelude::*;

/// Longest identifier accepted, in bytes.
pub const IDENTIFIER_MAX_LEN: usize = 128;

macro_rules! def_id {
	(@generate) => {
		/// Creates a random (UUIDv4) identifier.
		pub fn generate() -> Self {
			Self(Uuid::new_v4().to_string())
		}
	};
	($(#[$meta:meta])* $name:ident($kind:literal) $(, $generate:ident)?) => {
		$(#[$meta])*
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates `value` and wraps it.
			pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
				let value = value.into();

				check($kind, &value)?;

				Ok(Self(value))
			}

			$(def_id!(@$generate);)?
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, IdentifierError> {
				Self::new(value)
			}
		}
		impl From<$name> for String {
			fn from(id: $name) -> Self {
				id.0
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, IdentifierError> {
				Self::new(s)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({})", $kind, self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

def_id! {
	/// Organization that owns grants and bindings.
	OrganizationId("Organization")
}
def_id! {
	/// User inside an organization.
	UserId("User")
}
def_id! {
	/// Persisted OAuth grant.
	GrantId("Grant"), generate
}
def_id! {
	/// Link between an organization and one provider tenant.
	TenantBindingId("TenantBinding"), generate
}
def_id! {
	/// Provider descriptor key, such as `xero`.
	ProviderId("Provider")
}
def_id! {
	/// Tenant identifier assigned by the provider.
	ExternalTenantId("ExternalTenant")
}

/// Why an identifier was refused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// Nothing was supplied.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier kind.
		kind: &'static str,
	},
	/// Whitespace anywhere in the value, Unicode spaces included.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Identifier kind.
		kind: &'static str,
	},
	/// Longer than [`IDENTIFIER_MAX_LEN`].
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Identifier kind.
		kind: &'static str,
		/// Limit that was exceeded.
		max: usize,
	},
}
impl From<IdentifierError> for Error {
	fn from(e: IdentifierError) -> Self {
		Error::validation(e.to_string())
	}
}

fn check(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
	match value {
		"" => Err(IdentifierError::Empty { kind }),
		v if v.len() > IDENTIFIER_MAX_LEN =>
			Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN }),
		v if v.chars().any(char::is_whitespace) =>
			Err(IdentifierError::ContainsWhitespace { kind }),
		_ => Ok(()),
	}
}
