//! CLI command implementations.

pub mod align;
pub mod descriptor;
pub mod import;
