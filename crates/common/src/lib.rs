//! Shared error-context plumbing and string helpers used across all skua
//! crates.

pub mod error;
pub mod text;

pub use error::FromMessage;
