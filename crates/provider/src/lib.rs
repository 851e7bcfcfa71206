//! Provider boundary for the sieve analysis engine.
//!
//! This crate provides:
//! - Core exchange types (`Capability`, `IncidentContext`, `Dependency`)
//! - The `ServiceClient` trait every backend provider implements
//! - `ProviderRegistry`: name → client table with capability lookups
//! - A cooperative `CancelToken` shared between engine and providers
//! - The builtin filesystem provider (`file`, `filecontent`, `xml`, `json`)

pub mod builtin;
pub mod cancel;
pub mod client;
pub mod error;
pub mod registry;
pub mod types;

pub use cancel::CancelToken;
pub use client::*;
pub use error::*;
pub use registry::*;
pub use types::*;
