//! Two-way bridge between the store and the annotation engine.

mod adapter;
mod diagnostics;

pub use adapter::ExternalSyncAdapter;
pub use diagnostics::{SyncDiagnostic, SyncStats};
