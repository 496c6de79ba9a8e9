//! Caller identity.
//!
//! This module provides:
//! - `Claims`, the normalized identity attached to each call
//! - Tolerant projection of authorizer payloads and token claim maps
//! - The `Authenticator` seam for bearer tokens verified elsewhere

pub mod authenticator;
pub mod claims;

pub use authenticator::{bearer_token, Authenticator};
pub use claims::Claims;
