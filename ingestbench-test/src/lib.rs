//! Test utilities for ingestbench.
//!
//! This crate provides an in-process mock of the log-ingestion service and a tracing setup for
//! tests. See the modules for all available utilities.

pub mod server;
pub mod tracing;
