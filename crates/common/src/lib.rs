//! Shared utilities for the registry workspace.
//! - Logging initialization used by binaries and tests.
//! - Runtime environment checks run at startup.

pub mod env;
pub mod utils;
