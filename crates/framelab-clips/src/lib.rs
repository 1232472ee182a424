//! Clip extraction for framelab video datasets.
//!
//! This crate turns a video collection into a clips dataset: one sample per
//! contiguous range of frames, cut by temporal detections, frame-support
//! fields, object trajectories, per-frame predicates, or literal intervals.
//!
//! This crate provides:
//! - `ClipsStage` / `classify`: extraction requests and their strategy
//! - `make_clips_dataset` / `to_clips`: materialization into a clips dataset
//! - `ClipsView` / `ClipView`: reading and editing clips, with edits to
//!   temporal-detection clips synchronized back to the source collection
//! - `to_rle`: run-length encoding of per-frame booleans into intervals
//! - `get_trajectories`: tracked-object extraction from frame labels

pub mod error;
pub mod factory;
pub mod rle;
pub mod strategy;
pub mod sync;
pub mod trajectories;
pub mod view;

mod writers;

// Re-export the public surface
pub use error::{ClipsError, ClipsResult};
pub use factory::{make_clips_dataset, to_clips};
pub use rle::to_rle;
pub use strategy::{
    classify, ClipsBy, ClipsStage, ClipsStrategy, FrameExpr, OtherFields,
    TEMPORAL_DETECTION_KINDS, TRAJECTORY_KINDS,
};
pub use sync::SourceSync;
pub use trajectories::{get_trajectories, Trajectory};
pub use view::{ClipView, ClipsView};
