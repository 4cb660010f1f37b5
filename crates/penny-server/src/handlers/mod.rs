//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod advisor;
pub mod health;
pub mod receipts;
pub mod transactions;

// Re-export all handlers for use in router
pub use advisor::*;
pub use health::*;
pub use receipts::*;
pub use transactions::*;
