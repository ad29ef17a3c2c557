//! # Messenger Server Library
//!
//! Realtime messenger backend with:
//! - RESTful HTTP API for accounts, chats and messages
//! - WebSocket gateway with per-user multi-connection fan-out
//! - Rotating refresh sessions with reuse detection
//! - PostgreSQL for persistent storage
//!
//! ## Architecture
//!
//! - **Domain Layer**: Entities, realtime events and store traits
//! - **Application Layer**: Business services and DTOs
//! - **Infrastructure Layer**: PostgreSQL stores, media host client, metrics
//! - **Presentation Layer**: HTTP handlers, middleware and the WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! messenger_server/
//! +-- config/         Configuration management
//! +-- domain/         Entities, events and store traits
//! +-- application/    Services and DTOs
//! +-- infrastructure/ Database, media host and metrics
//! +-- presentation/   HTTP routes, middleware and WebSocket gateway
//! +-- shared/         Errors, validation and hashing helpers
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
