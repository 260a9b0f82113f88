//! Command implementations for the Kinodata CLI.

pub mod evaluate;
pub mod merge;
pub mod types;
