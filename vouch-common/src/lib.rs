//! Shared types for the Vouch enrichment services
//!
//! Error types, configuration file resolution and the event bus used by
//! every Vouch crate.

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
