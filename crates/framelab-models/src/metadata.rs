//! Media metadata attached to samples.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Technical metadata for a video sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    /// File size in bytes
    #[serde(default)]
    pub size_bytes: u64,

    /// MIME type, e.g. `video/mp4`
    #[serde(default)]
    pub mime_type: String,

    /// Frame width in pixels
    #[serde(default)]
    pub frame_width: u32,

    /// Frame height in pixels
    #[serde(default)]
    pub frame_height: u32,

    /// Frames per second
    #[serde(default)]
    pub frame_rate: f64,

    /// Total number of frames
    #[serde(default)]
    pub total_frame_count: u32,

    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
}

impl VideoMetadata {
    /// Create metadata for a video with known frame geometry.
    pub fn new(frame_width: u32, frame_height: u32, frame_rate: f64, total_frame_count: u32) -> Self {
        let duration = if frame_rate > 0.0 {
            total_frame_count as f64 / frame_rate
        } else {
            0.0
        };

        Self {
            size_bytes: 0,
            mime_type: "video/mp4".to_string(),
            frame_width,
            frame_height,
            frame_rate,
            total_frame_count,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_frames() {
        let meta = VideoMetadata::new(1920, 1080, 30.0, 900);
        assert!((meta.duration - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_rate_has_zero_duration() {
        let meta = VideoMetadata::new(1920, 1080, 0.0, 900);
        assert_eq!(meta.duration, 0.0);
    }
}
