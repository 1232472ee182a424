//! Document store capability for framelab.
//!
//! Datasets persist their samples as documents in named collections and transform
//! them with declarative aggregation pipelines. This crate defines the capability
//! boundary (the [`DocumentStore`] trait plus the typed [`Value`]/[`Document`] and
//! pipeline models) and ships [`MemoryStore`], an in-process engine implementing it.
//!
//! The engine executes a pipeline to completion before returning: a pipeline that
//! fails writes nothing, and no partial results are ever visible.

pub mod error;
pub mod memory;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod value;

// Re-export common types
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use pipeline::{Expr, Filter, ProjectSpec, Projection, Stage, UpdateOp};
pub use store::DocumentStore;
pub use value::{compare_values, Document, FromValue, ToValue, Value};
