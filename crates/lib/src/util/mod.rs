//! Shared utilities.
//!
//! Content fingerprints, bounded names and shell quoting.

pub mod hash;
pub mod name;
pub mod shell;
