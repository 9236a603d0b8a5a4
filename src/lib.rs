#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, RabbitMQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resilience Core
//!
//! Resilient clients for the external dependencies of a backend service: a
//! relational store, a cache and a message broker.
//!
//! ## Overview
//!
//! Every dependency goes through the same two mechanisms:
//!
//! - **Bootstrap with backoff**: at startup the client is dialed and verified
//!   with a cheap liveness check, retrying on failure with a configurable
//!   backoff until it answers, the attempt budget runs out, or the caller
//!   cancels.
//! - **Circuit breaking**: at runtime every call passes through a per-dependency
//!   circuit breaker, so a dependency that keeps failing is short-circuited
//!   instead of being hammered, and is probed again after a cooldown.
//!
//! ## Module Organization
//!
//! - [`resilience`] - Backoff, circuit breaker, bootstrapper and executor
//! - [`adapters`] - Store (PostgreSQL), cache (Redis) and broker (AMQP) clients
//! - [`dependencies`] - Startup wiring for all configured dependencies
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilience_core::config::ServiceConfig;
//! use resilience_core::resilience::TracingObserver;
//! use resilience_core::Dependencies;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! resilience_core::logging::init_structured_logging();
//!
//! let config = ServiceConfig::load(None::<&str>)?;
//! let cancel = CancellationToken::new();
//! let mut deps = Dependencies::connect(&config, &cancel, Arc::new(TracingObserver)).await?;
//!
//! if let Some(store) = &deps.store {
//!     store.ping().await?;
//! }
//!
//! deps.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib                         # Unit tests
//! cargo test                               # Unit and integration tests
//! cargo test --features test-services      # Also against live Postgres, Redis, RabbitMQ
//! ```

pub mod adapters;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod logging;
pub mod resilience;

pub use config::{ConfigurationError, DependencyConfig, ServiceConfig};
pub use dependencies::{Dependencies, DependencySet};
pub use error::{BoxError, ErrorClass, ResilienceError, Result};
pub use resilience::{
    BackoffPolicy, CircuitBreaker, CircuitBreakerConfig, CircuitState, ConnectionBootstrapper,
    ExecuteError, ResilientExecutor,
};
