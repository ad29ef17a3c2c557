//! Infrastructure Layer
//!
//! Implementations for external services:
//! - Database pool and repositories (PostgreSQL)
//! - Media host client
//! - Prometheus metrics

pub mod database;
pub mod media;
pub mod metrics;
pub mod repositories;
