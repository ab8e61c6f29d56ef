//! Secret sealing and OAuth state signing.
//!
//! [`SecretCodec`] seals provider tokens at rest with AES-256-GCM, and [`StateSigner`] turns the
//! caller's identity into an HMAC-signed `state` parameter that survives the provider redirect.
//! Both hold process-wide key material loaded once from configuration.

pub mod codec;
pub mod state;

pub use codec::*;
pub use state::*;
