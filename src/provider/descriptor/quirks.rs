// self
use crate::_prelude::*;

/// Default header carrying the external tenant on API calls.
pub const DEFAULT_TENANT_HEADER: &str = "xero-tenant-id";

/// Provider-specific quirks that influence how requests are shaped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Header name used to address a tenant on API calls.
	pub tenant_header: String,
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { tenant_header: DEFAULT_TENANT_HEADER.into(), scope_delimiter: ' ' }
	}
}
