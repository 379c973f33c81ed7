#![allow(clippy::doc_markdown)] // Allow technical terms like RabbitMQ, PostgreSQL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tracking Core
//!
//! Reliability layer of a package-tracking service.
//!
//! ## Overview
//!
//! Two cooperating subsystems:
//!
//! - an asynchronous event pipeline that moves a tracking update from ingress
//!   to durable storage through RabbitMQ, escalating failures through a
//!   bounded-retry dead-letter path with broker-native TTL backoff
//! - a database-routing layer that sends reads to a replica, fails over to the
//!   primary on error and recovers automatically once the replica is healthy
//!
//! ## Pipeline
//!
//! ```text
//! publisher -> exchange -> main queue -> primary consumer -> store
//!                                           | failure
//!                                           v
//!                                          DLQ -> dead-letter consumer -> store
//!                                           ^            | failure (attempts < max)
//!                                           |            v
//!                                           +---- DLQ retry queue (TTL)
//! ```
//!
//! The broker's `x-death` history is the only retry counter. Once it reaches
//! the configured maximum the envelope goes to the terminal sink.
//!
//! ## Module Organization
//!
//! - [`messaging`] - broker abstraction, publisher, consumers and retry policy
//! - [`database`] - data sources, router, failover interceptor, health monitor
//! - [`services`] - tracking-event processing and stores
//! - [`web`] - HTTP status surface for database routing
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging setup
//! - [`error`] - crate-level error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use tracking_core::messaging::{
//!     BrokerProvider, BrokerTopology, InMemoryBroker, TrackingEventPublisher, TrackingEventRequest,
//! };
//!
//! # async fn example() -> tracking_core::Result<()> {
//! let topology = BrokerTopology::default();
//! let broker = Arc::new(BrokerProvider::from(InMemoryBroker::new()));
//! broker.declare_topology(&topology).await?;
//!
//! let publisher = TrackingEventPublisher::new(broker, &topology);
//! publisher
//!     .publish(&TrackingEventRequest::new("PKG-001", "Sao Paulo Hub", "Arrived", Utc::now()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod services;
pub mod web;

pub use config::{ConfigManager, TrackingConfig};
pub use error::{Result, TrackingError};
