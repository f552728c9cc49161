//! Domain types for junie-gitlab.
//! Execution context, extracted tasks and the feedback they produce.

pub mod context;
pub mod error;
pub mod feedback;
pub mod task;

pub use context::*;
pub use error::*;
pub use feedback::*;
pub use task::*;
