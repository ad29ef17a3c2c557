//! Shared Utilities
//!
//! Common utilities used across all layers.

pub mod crypto;
pub mod error;
pub mod validation;
