//! Metapackage re-exporting the workspace crates

pub use account_service;
pub use common;
