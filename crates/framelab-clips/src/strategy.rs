//! Clip extraction requests and strategy classification.
//!
//! A [`ClipsStage`] describes what to cut a video collection into; [`classify`]
//! resolves it to one of five [`ClipsStrategy`] values against the source
//! sample schema. Classification is pure so callers can inspect the outcome
//! before any dataset is created.

use std::fmt;
use std::sync::Arc;

use framelab_dataset::{schema, FieldSpec, FRAMES_PREFIX};
use framelab_models::{FrameSupport, LabelKind};
use framelab_store::{Document, Value};

/// Label kinds a temporal-detection clips field may hold.
pub const TEMPORAL_DETECTION_KINDS: [LabelKind; 2] =
    [LabelKind::TemporalDetection, LabelKind::TemporalDetections];

/// Frame-label kinds that trajectories can be extracted from.
pub const TRAJECTORY_KINDS: [LabelKind; 3] = [
    LabelKind::Detections,
    LabelKind::Polylines,
    LabelKind::Keypoints,
];

// =============================================================================
// Frame expressions
// =============================================================================

/// A per-frame boolean predicate over stored frame documents.
///
/// Frames where the predicate holds are "on"; contiguous on-ranges become
/// clips after tolerance and minimum-length filtering.
#[derive(Clone)]
pub struct FrameExpr {
    description: String,
    predicate: Arc<dyn Fn(&Document) -> bool + Send + Sync>,
}

impl FrameExpr {
    pub fn from_fn(
        description: impl Into<String>,
        predicate: impl Fn(&Document) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// True when the stored path holds a truthy value: a true boolean, a
    /// non-empty array, or any other non-null value.
    pub fn field_truthy(path: impl Into<String>) -> Self {
        let path = path.into();
        let description = format!("truthy({})", path);
        Self::from_fn(description, move |frame| {
            match frame.get_path(&path) {
                None | Some(Value::Null) => false,
                Some(Value::Bool(b)) => *b,
                Some(Value::Array(items)) => !items.is_empty(),
                Some(_) => true,
            }
        })
    }

    pub fn evaluate(&self, frame: &Document) -> bool {
        (self.predicate)(frame)
    }
}

impl fmt::Debug for FrameExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameExpr({})", self.description)
    }
}

// =============================================================================
// Stages
// =============================================================================

/// What drives clip extraction.
#[derive(Debug, Clone)]
pub enum ClipsBy {
    /// A declared field: sample-level frame supports or temporal detections,
    /// or a `frames.`-prefixed label list field.
    Field(String),
    /// An arbitrary per-frame predicate.
    Expr(FrameExpr),
    /// Literal per-sample interval lists, aligned with the source view.
    Manual(Vec<Option<Vec<FrameSupport>>>),
}

/// Which source sample fields to carry onto the clips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OtherFields {
    #[default]
    None,
    All,
    Fields(Vec<String>),
}

impl OtherFields {
    pub fn fields<S: AsRef<str>>(names: &[S]) -> Self {
        Self::Fields(names.iter().map(|n| n.as_ref().to_string()).collect())
    }
}

/// A clip extraction request. Views keep their stage so the clips dataset can
/// be regenerated on reload.
#[derive(Debug, Clone)]
pub struct ClipsStage {
    pub by: ClipsBy,
    pub other_fields: OtherFields,
    /// Maximum number of consecutive "off" frames bridged into a clip.
    pub tol: u32,
    /// Minimum clip length in frames; shorter clips are dropped.
    pub min_len: u32,
    /// Cut one clip per object trajectory instead of per on-range.
    pub trajectories: bool,
}

impl ClipsStage {
    fn new(by: ClipsBy) -> Self {
        Self {
            by,
            other_fields: OtherFields::None,
            tol: 0,
            min_len: 0,
            trajectories: false,
        }
    }

    /// Cut clips from a declared field.
    pub fn field(name: impl Into<String>) -> Self {
        Self::new(ClipsBy::Field(name.into()))
    }

    /// Cut clips from a per-frame predicate.
    pub fn expression(expr: FrameExpr) -> Self {
        Self::new(ClipsBy::Expr(expr))
    }

    /// Cut clips from literal per-sample intervals.
    pub fn manual(supports: Vec<Option<Vec<FrameSupport>>>) -> Self {
        Self::new(ClipsBy::Manual(supports))
    }

    pub fn with_other_fields(mut self, other_fields: OtherFields) -> Self {
        self.other_fields = other_fields;
        self
    }

    pub fn with_tol(mut self, tol: u32) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_min_len(mut self, min_len: u32) -> Self {
        self.min_len = min_len;
        self
    }

    pub fn with_trajectories(mut self, trajectories: bool) -> Self {
        self.trajectories = trajectories;
        self
    }
}

// =============================================================================
// Classification
// =============================================================================

/// The five ways a clips dataset gets materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipsStrategy {
    /// Copy intervals straight from a frame-support field.
    Support,
    /// One clip per temporal detection, sharing the detection's id.
    TemporalDetection,
    /// One clip per tracked object in a frame label field.
    Trajectories,
    /// Run-length encode a per-frame predicate.
    Expression,
    /// Unwind caller-provided intervals.
    Manual,
}

impl ClipsStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipsStrategy::Support => "support",
            ClipsStrategy::TemporalDetection => "temporal_detection",
            ClipsStrategy::Trajectories => "trajectories",
            ClipsStrategy::Expression => "expression",
            ClipsStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ClipsStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolve the strategy for a request against the source sample schema.
///
/// A frame-level field means trajectories when requested, otherwise an
/// expression over that field. A sample-level field means supports when it is
/// declared as one, otherwise temporal detections; the detection case is
/// validated later, so an unknown field name lands there and fails with a
/// field error rather than being misread as something else.
pub fn classify(sample_fields: &[FieldSpec], stage: &ClipsStage) -> ClipsStrategy {
    match &stage.by {
        ClipsBy::Field(name) => {
            if name.starts_with(FRAMES_PREFIX) {
                if stage.trajectories {
                    ClipsStrategy::Trajectories
                } else {
                    ClipsStrategy::Expression
                }
            } else {
                let support_like = schema::find_field(sample_fields, name)
                    .map(|f| f.kind.is_frame_support_like())
                    .unwrap_or(false);
                if support_like {
                    ClipsStrategy::Support
                } else {
                    ClipsStrategy::TemporalDetection
                }
            }
        }
        ClipsBy::Expr(_) => ClipsStrategy::Expression,
        ClipsBy::Manual(_) => ClipsStrategy::Manual,
    }
}

#[cfg(test)]
mod tests {
    use framelab_dataset::FieldKind;

    use super::*;

    fn schema_with(name: &str, kind: FieldKind) -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("filepath", FieldKind::Str),
            FieldSpec::new(name, kind),
        ]
    }

    #[test]
    fn test_classify_support_fields() {
        let single = schema_with("chunks", FieldKind::FrameSupport);
        assert_eq!(
            classify(&single, &ClipsStage::field("chunks")),
            ClipsStrategy::Support
        );

        let list = schema_with(
            "chunks",
            FieldKind::List(Box::new(FieldKind::FrameSupport)),
        );
        assert_eq!(
            classify(&list, &ClipsStage::field("chunks")),
            ClipsStrategy::Support
        );
    }

    #[test]
    fn test_classify_temporal_detection_fields() {
        let fields = schema_with("events", FieldKind::Embedded(LabelKind::TemporalDetections));
        assert_eq!(
            classify(&fields, &ClipsStage::field("events")),
            ClipsStrategy::TemporalDetection
        );

        // unknown names land here too and fail validation downstream
        assert_eq!(
            classify(&fields, &ClipsStage::field("missing")),
            ClipsStrategy::TemporalDetection
        );
    }

    #[test]
    fn test_classify_frame_fields() {
        let fields = vec![FieldSpec::new("filepath", FieldKind::Str)];
        assert_eq!(
            classify(&fields, &ClipsStage::field("frames.dets")),
            ClipsStrategy::Expression
        );
        assert_eq!(
            classify(
                &fields,
                &ClipsStage::field("frames.dets").with_trajectories(true)
            ),
            ClipsStrategy::Trajectories
        );
    }

    #[test]
    fn test_classify_expression_and_manual() {
        let fields = vec![FieldSpec::new("filepath", FieldKind::Str)];
        assert_eq!(
            classify(
                &fields,
                &ClipsStage::expression(FrameExpr::field_truthy("flagged"))
            ),
            ClipsStrategy::Expression
        );
        assert_eq!(
            classify(&fields, &ClipsStage::manual(vec![])),
            ClipsStrategy::Manual
        );
    }

    #[test]
    fn test_field_truthy_expression() {
        let expr = FrameExpr::field_truthy("dets.detections");

        let mut with_labels = Document::new();
        with_labels.set_path("dets.detections", vec![Value::Int(1)]);
        assert!(expr.evaluate(&with_labels));

        let mut empty = Document::new();
        empty.set_path("dets.detections", Value::Array(vec![]));
        assert!(!expr.evaluate(&empty));

        assert!(!expr.evaluate(&Document::new()));

        let mut flag = Document::new();
        flag.set("dets", false);
        assert!(!FrameExpr::field_truthy("dets").evaluate(&flag));
    }

    #[test]
    fn test_stage_builders() {
        let stage = ClipsStage::field("events")
            .with_tol(2)
            .with_min_len(3)
            .with_other_fields(OtherFields::fields(&["weather"]));
        assert_eq!(stage.tol, 2);
        assert_eq!(stage.min_len, 3);
        assert_eq!(
            stage.other_fields,
            OtherFields::Fields(vec!["weather".to_string()])
        );
        assert!(!stage.trajectories);
    }
}
