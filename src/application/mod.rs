//! Application layer (use-cases, policies).
//!
//! Orchestrates one pipeline run on top of the domain types and the
//! collaborator traits from `infra`; nothing here talks to the network,
//! git or the filesystem directly.

pub mod executor;
pub mod extract;
pub mod feedback;
pub mod initializer;
pub mod mention;
