//! # Rockpool Testkit
//!
//! Shared fixtures and proptest generators for the workspace test suites:
//! peer identities with in-memory caches, unique shared bucket URLs, and
//! strategies over head parameters.

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_peer, peer, sample_head, tick, unique_bucket, Peer};
pub use generators::{head_from_params, HeadParams};
