//! simulated iot sensor module, ingest node, query backend and polling
//! dashboard client for a temperature / humidity / pressure feed.
//!
//! ```text
//!     simulator ──▶ sink ──▶ ingest ──▶ store ◀── api ◀── dashboard
//! ```
//!
//! see main.rs for how the roles are wired into processes.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod simulator;
pub mod sink;
pub mod store;
