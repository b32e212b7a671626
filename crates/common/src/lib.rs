//! Identifiers and correlation references shared across the workspace.

mod reference;
mod types;

pub use reference::Reference;
pub use types::{AggregateId, LocationId, ProductId, SupplierId};
