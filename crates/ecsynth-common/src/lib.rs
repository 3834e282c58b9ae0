//! # ecsynth-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire ecsynth workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the typed values (CIDR blocks, ports,
//! instance types, durations) that the template builder is assembled from.

pub mod config;
pub mod constants;
pub mod duration;
pub mod error;
pub mod types;
