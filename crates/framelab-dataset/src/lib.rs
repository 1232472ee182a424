//! Video dataset management over a document store.
//!
//! This crate provides:
//! - Named, registry-backed datasets with typed sample and frame schemas
//! - Video samples with per-frame documents in a companion collection
//! - Immutable views with filtering, field selection, sorting, and slicing
//! - Positional bulk reads/writes (`values` / `set_values`) for samples and frames
//! - Label writes keyed by label id, for source synchronization
//! - Environment-driven configuration

pub mod config;
pub mod dataset;
pub mod error;
pub mod labels_ops;
pub mod registry;
pub mod schema;
pub mod validation;
pub mod view;

pub use config::DatasetConfig;
pub use dataset::{Dataset, StoreHandle, FRAMES_PREFIX};
pub use error::{DatasetError, DatasetResult};
pub use registry::{DatasetMeta, REGISTRY_COLLECTION};
pub use schema::{FieldKind, FieldSpec};
pub use view::{DatasetView, ViewStage};
