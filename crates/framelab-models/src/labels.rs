//! Label types attached to samples and frames.
//!
//! Labels serialize to store documents with a `_cls` discriminator and an
//! `_id`, so they can round-trip through collections and pipelines without a
//! schema lookup. [`LabelDoc`] is that bridge; [`LabelKind`] names each type
//! for schema declarations and strategy checks.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use framelab_store::{Document, StoreResult, Value};

use crate::id::LabelId;
use crate::support::FrameSupport;

/// Discriminator key stored in every label document.
pub const CLS_KEY: &str = "_cls";

// =============================================================================
// LabelKind
// =============================================================================

/// Every label type the schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Classification,
    TemporalDetection,
    TemporalDetections,
    Detection,
    Detections,
    Polyline,
    Polylines,
    Keypoint,
    Keypoints,
    TrajectoryLabel,
}

impl LabelKind {
    /// The `_cls` name written into documents of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Classification => "Classification",
            LabelKind::TemporalDetection => "TemporalDetection",
            LabelKind::TemporalDetections => "TemporalDetections",
            LabelKind::Detection => "Detection",
            LabelKind::Detections => "Detections",
            LabelKind::Polyline => "Polyline",
            LabelKind::Polylines => "Polylines",
            LabelKind::Keypoint => "Keypoint",
            LabelKind::Keypoints => "Keypoints",
            LabelKind::TrajectoryLabel => "TrajectoryLabel",
        }
    }

    /// Parse from a `_cls` name, if recognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Classification" => Some(LabelKind::Classification),
            "TemporalDetection" => Some(LabelKind::TemporalDetection),
            "TemporalDetections" => Some(LabelKind::TemporalDetections),
            "Detection" => Some(LabelKind::Detection),
            "Detections" => Some(LabelKind::Detections),
            "Polyline" => Some(LabelKind::Polyline),
            "Polylines" => Some(LabelKind::Polylines),
            "Keypoint" => Some(LabelKind::Keypoint),
            "Keypoints" => Some(LabelKind::Keypoints),
            "TrajectoryLabel" => Some(LabelKind::TrajectoryLabel),
            _ => None,
        }
    }

    /// Kinds that hold a list of element labels.
    pub fn list_kinds() -> [LabelKind; 4] {
        [
            LabelKind::TemporalDetections,
            LabelKind::Detections,
            LabelKind::Polylines,
            LabelKind::Keypoints,
        ]
    }

    pub fn is_list(&self) -> bool {
        Self::list_kinds().contains(self)
    }

    /// The element kind of a list kind.
    pub fn element_kind(&self) -> Option<LabelKind> {
        match self {
            LabelKind::TemporalDetections => Some(LabelKind::TemporalDetection),
            LabelKind::Detections => Some(LabelKind::Detection),
            LabelKind::Polylines => Some(LabelKind::Polyline),
            LabelKind::Keypoints => Some(LabelKind::Keypoint),
            _ => None,
        }
    }

    /// The document field a list kind stores its elements under.
    pub fn list_field_name(&self) -> Option<&'static str> {
        match self {
            LabelKind::TemporalDetections => Some("detections"),
            LabelKind::Detections => Some("detections"),
            LabelKind::Polylines => Some("polylines"),
            LabelKind::Keypoints => Some("keypoints"),
            _ => None,
        }
    }

    /// Whether this kind carries a frame support interval.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            LabelKind::TemporalDetection | LabelKind::TemporalDetections
        )
    }

    /// Whether frame labels of this kind can be grouped into trajectories
    /// by their `index` attribute.
    pub fn supports_trajectories(&self) -> bool {
        matches!(
            self,
            LabelKind::Detection
                | LabelKind::Detections
                | LabelKind::Polyline
                | LabelKind::Polylines
                | LabelKind::Keypoint
                | LabelKind::Keypoints
        )
    }
}

impl std::fmt::Display for LabelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Document bridge
// =============================================================================

/// Serialize a label to a store document (and back) with its `_cls` tag.
pub trait LabelDoc: Serialize + DeserializeOwned {
    /// The `_cls` discriminator for this type.
    const CLS: &'static str;

    fn label_id(&self) -> &LabelId;

    /// Encode to a document carrying `_cls`.
    fn to_doc(&self) -> StoreResult<Document> {
        let mut doc = Document::from_serialize(self)?;
        doc.set(CLS_KEY, Self::CLS);
        Ok(doc)
    }

    /// Decode from a document. Returns `None` when the `_cls` tag is absent
    /// or names a different type, or when required fields are malformed.
    fn from_doc(doc: &Document) -> Option<Self> {
        match doc.get(CLS_KEY).and_then(Value::as_str) {
            Some(cls) if cls == Self::CLS => doc.deserialize_into().ok(),
            _ => None,
        }
    }
}

// =============================================================================
// Sample-level labels
// =============================================================================

/// A single categorical label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Classification {
    #[serde(rename = "_id", default)]
    pub id: LabelId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Classification {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: LabelId::new(),
            label: Some(label.into()),
            confidence: None,
            tags: Vec::new(),
        }
    }
}

impl LabelDoc for Classification {
    const CLS: &'static str = "Classification";

    fn label_id(&self) -> &LabelId {
        &self.id
    }
}

/// An event spanning a frame range of a video sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemporalDetection {
    #[serde(rename = "_id", default)]
    pub id: LabelId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// The `[first, last]` frame range this event covers.
    pub support: FrameSupport,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl TemporalDetection {
    pub fn new(label: impl Into<String>, support: FrameSupport) -> Self {
        Self {
            id: LabelId::new(),
            label: Some(label.into()),
            support,
            confidence: None,
            tags: Vec::new(),
        }
    }
}

impl LabelDoc for TemporalDetection {
    const CLS: &'static str = "TemporalDetection";

    fn label_id(&self) -> &LabelId {
        &self.id
    }
}

/// A list of temporal detections on one sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TemporalDetections {
    #[serde(default)]
    pub detections: Vec<TemporalDetection>,
}

impl TemporalDetections {
    pub fn new(detections: Vec<TemporalDetection>) -> Self {
        Self { detections }
    }

    /// Encode to a document carrying `_cls`. List wrappers have no id of
    /// their own, so they sit outside [`LabelDoc`].
    pub fn to_doc(&self) -> StoreResult<Document> {
        list_doc(self, LabelKind::TemporalDetections)
    }
}

/// The sample-level label a trajectory clip carries: the object's class and
/// its track index in the source frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrajectoryLabel {
    #[serde(rename = "_id", default)]
    pub id: LabelId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
}

impl LabelDoc for TrajectoryLabel {
    const CLS: &'static str = "TrajectoryLabel";

    fn label_id(&self) -> &LabelId {
        &self.id
    }
}

// =============================================================================
// Frame-level labels
// =============================================================================

/// An object detection in one frame. `bounding_box` is `[x, y, w, h]` in
/// relative coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    #[serde(rename = "_id", default)]
    pub id: LabelId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<[f64; 4]>,

    /// Track index linking this detection across frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Detection {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: LabelId::new(),
            label: Some(label.into()),
            bounding_box: None,
            index: None,
            confidence: None,
            tags: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }
}

impl LabelDoc for Detection {
    const CLS: &'static str = "Detection";

    fn label_id(&self) -> &LabelId {
        &self.id
    }
}

/// A list of detections in one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Detections {
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl Detections {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn to_doc(&self) -> StoreResult<Document> {
        list_doc(self, LabelKind::Detections)
    }
}

/// A polyline or polygon in one frame. `points` is a list of shapes, each a
/// list of `[x, y]` relative coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Polyline {
    #[serde(rename = "_id", default)]
    pub id: LabelId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub points: Vec<Vec<[f64; 2]>>,

    #[serde(default)]
    pub closed: bool,

    #[serde(default)]
    pub filled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl LabelDoc for Polyline {
    const CLS: &'static str = "Polyline";

    fn label_id(&self) -> &LabelId {
        &self.id
    }
}

/// A list of polylines in one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Polylines {
    #[serde(default)]
    pub polylines: Vec<Polyline>,
}

impl Polylines {
    pub fn to_doc(&self) -> StoreResult<Document> {
        list_doc(self, LabelKind::Polylines)
    }
}

/// A group of semantically related points in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Keypoint {
    #[serde(rename = "_id", default)]
    pub id: LabelId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub points: Vec<[f64; 2]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl LabelDoc for Keypoint {
    const CLS: &'static str = "Keypoint";

    fn label_id(&self) -> &LabelId {
        &self.id
    }
}

/// A list of keypoint groups in one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Keypoints {
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
}

impl Keypoints {
    pub fn to_doc(&self) -> StoreResult<Document> {
        list_doc(self, LabelKind::Keypoints)
    }
}

fn list_doc<T: Serialize>(value: &T, kind: LabelKind) -> StoreResult<Document> {
    let mut doc = Document::from_serialize(value)?;
    doc.set(CLS_KEY, kind.as_str());
    Ok(doc)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_kind_names_round_trip() {
        for kind in [
            LabelKind::Classification,
            LabelKind::TemporalDetections,
            LabelKind::Detections,
            LabelKind::TrajectoryLabel,
        ] {
            assert_eq!(LabelKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(LabelKind::parse("Segmentation"), None);
    }

    #[test]
    fn test_label_kind_list_structure() {
        assert!(LabelKind::TemporalDetections.is_list());
        assert!(!LabelKind::TemporalDetection.is_list());
        assert_eq!(
            LabelKind::Detections.element_kind(),
            Some(LabelKind::Detection)
        );
        assert_eq!(LabelKind::Polylines.list_field_name(), Some("polylines"));
        assert_eq!(LabelKind::Classification.list_field_name(), None);
    }

    #[test]
    fn test_trajectory_capable_kinds() {
        assert!(LabelKind::Detections.supports_trajectories());
        assert!(LabelKind::Keypoint.supports_trajectories());
        assert!(!LabelKind::TemporalDetections.supports_trajectories());
        assert!(!LabelKind::Classification.supports_trajectories());
    }

    #[test]
    fn test_temporal_detection_doc_round_trip() {
        let support = FrameSupport::new(10, 20).unwrap();
        let det = TemporalDetection::new("meeting", support);

        let doc = det.to_doc().unwrap();
        assert_eq!(
            doc.get(CLS_KEY).and_then(Value::as_str),
            Some("TemporalDetection")
        );
        assert_eq!(doc.id(), Some(det.id.as_str()));

        let back = TemporalDetection::from_doc(&doc).unwrap();
        assert_eq!(back, det);
    }

    #[test]
    fn test_from_doc_rejects_other_cls() {
        let cls = Classification::new("cat");
        let doc = cls.to_doc().unwrap();
        assert!(TemporalDetection::from_doc(&doc).is_none());
        assert!(Classification::from_doc(&doc).is_some());
    }

    #[test]
    fn test_from_doc_tolerates_missing_optionals() {
        let mut doc = Document::new();
        doc.set(CLS_KEY, Classification::CLS);
        doc.set("_id", "abc");
        let cls = Classification::from_doc(&doc).unwrap();
        assert_eq!(cls.id.as_str(), "abc");
        assert!(cls.label.is_none());
        assert!(cls.tags.is_empty());
    }
}
