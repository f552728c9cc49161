//! Infrastructure layer (adapters/implementations).
//!
//! This module contains IO-heavy integrations (GitLab REST, git, the agent
//! subprocess, filesystem).

pub mod agent;
pub mod env;
pub mod git;
pub mod gitlab;
pub mod mcp;
pub mod shell;
