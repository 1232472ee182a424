//! Shared data models for framelab.
//!
//! This crate provides Serde-serializable types for:
//! - Sample and label identifiers
//! - Media types and video metadata
//! - Frame support intervals (the `[first, last]` range a clip covers)
//! - Label types (classifications, temporal detections, frame-level object labels)

pub mod id;
pub mod labels;
pub mod media;
pub mod metadata;
pub mod support;

// Re-export common types
pub use id::{LabelId, SampleId};
pub use labels::{
    Classification, Detection, Detections, Keypoint, Keypoints, LabelDoc, LabelKind, Polyline,
    Polylines, TemporalDetection, TemporalDetections, TrajectoryLabel,
};
pub use media::MediaType;
pub use metadata::VideoMetadata;
pub use support::{FrameSupport, SupportError};
