//! # navlink-client
//!
//! Client side of the external display link.
//!
//! This crate provides:
//! - Connection lifecycle management against a mutable endpoint configuration
//! - A cooperative scheduler interleaving keepalive, clock sync and
//!   routing-info pushes over one persistent socket
//! - The [`DisplayLinkClient`] façade the navigation producer talks to

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod scheduler;

pub use client::DisplayLinkClient;
pub use config::{ConfigProvider, Endpoint, LinkConfig, SharedConfig};
pub use connection::Connection;
pub use error::ClientError;
pub use scheduler::{DueFlags, RoutingSnapshot, Scheduler};
