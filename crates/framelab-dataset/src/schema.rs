//! Dataset field schemas.
//!
//! A schema is an ordered list of [`FieldSpec`]s. Field `name` is the public
//! name; `db_field` is the document field it is stored under when the two
//! differ (`id` is stored as `_id`, `sample_id` as `_sample_id`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use framelab_models::LabelKind;

/// The declared type of a dataset field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FieldKind {
    /// Primary document id
    Id,
    /// Reference to another document's id
    ObjectId,
    Str,
    Bool,
    Int,
    Float,
    DateTime,
    /// List of string tags
    Tags,
    /// Embedded media metadata document
    Metadata,
    /// A `[first, last]` frame interval
    FrameSupport,
    /// 1-based frame number
    FrameNumber,
    List(Box<FieldKind>),
    /// An embedded label document of the given kind
    Embedded(LabelKind),
}

impl FieldKind {
    /// Whether values of this kind are frame support intervals, singly or as
    /// a list.
    pub fn is_frame_support_like(&self) -> bool {
        match self {
            FieldKind::FrameSupport => true,
            FieldKind::List(inner) => matches!(**inner, FieldKind::FrameSupport),
            _ => false,
        }
    }

    /// The embedded label kind, if this field holds labels.
    pub fn label_kind(&self) -> Option<LabelKind> {
        match self {
            FieldKind::Embedded(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::List(inner) => write!(f, "List({})", inner),
            FieldKind::Embedded(kind) => write!(f, "Embedded({})", kind.as_str()),
            other => write!(f, "{:?}", other),
        }
    }
}

/// One declared dataset field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,

    /// Stored document field, when it differs from `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_field: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            db_field: None,
        }
    }

    pub fn with_db_field(mut self, db_field: impl Into<String>) -> Self {
        self.db_field = Some(db_field.into());
        self
    }

    /// The document field this spec reads and writes.
    pub fn db_name(&self) -> &str {
        self.db_field.as_deref().unwrap_or(&self.name)
    }
}

/// The fields every dataset declares.
pub fn default_sample_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("id", FieldKind::Id).with_db_field("_id"),
        FieldSpec::new("filepath", FieldKind::Str),
        FieldSpec::new("tags", FieldKind::Tags),
        FieldSpec::new("metadata", FieldKind::Metadata),
    ]
}

/// The fields every frame document declares.
pub fn default_frame_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("id", FieldKind::Id).with_db_field("_id"),
        FieldSpec::new("frame_number", FieldKind::FrameNumber),
        FieldSpec::new("sample_id", FieldKind::ObjectId).with_db_field("_sample_id"),
    ]
}

pub fn find_field<'a>(fields: &'a [FieldSpec], name: &str) -> Option<&'a FieldSpec> {
    fields.iter().find(|f| f.name == name)
}

/// Map a (possibly dotted) public path to its stored document path. Only the
/// leading segment is schema-renamed; unknown segments pass through, so
/// temporary fields never need a schema entry.
pub fn db_path(fields: &[FieldSpec], path: &str) -> String {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let head = match find_field(fields, head) {
        Some(spec) => spec.db_name(),
        None => head,
    };

    match rest {
        Some(rest) => format!("{}.{}", head, rest),
        None => head.to_string(),
    }
}

/// Reorder fields for display: `id, sample_id, filepath, support` first, then
/// the rest in declaration order.
pub fn pretty_order(fields: &mut Vec<FieldSpec>) {
    let lead = ["id", "sample_id", "filepath", "support"];
    let mut ordered = Vec::with_capacity(fields.len());

    for name in lead {
        if let Some(pos) = fields.iter().position(|f| f.name == name) {
            ordered.push(fields.remove(pos));
        }
    }
    ordered.append(fields);

    *fields = ordered;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_path_mapping() {
        let fields = vec![
            FieldSpec::new("id", FieldKind::Id).with_db_field("_id"),
            FieldSpec::new("sample_id", FieldKind::ObjectId).with_db_field("_sample_id"),
            FieldSpec::new("events", FieldKind::Embedded(LabelKind::TemporalDetections)),
        ];

        assert_eq!(db_path(&fields, "id"), "_id");
        assert_eq!(db_path(&fields, "sample_id"), "_sample_id");
        assert_eq!(db_path(&fields, "events.detections"), "events.detections");
        assert_eq!(db_path(&fields, "_support"), "_support");
    }

    #[test]
    fn test_pretty_order() {
        let mut fields = vec![
            FieldSpec::new("filepath", FieldKind::Str),
            FieldSpec::new("events", FieldKind::Embedded(LabelKind::Classification)),
            FieldSpec::new("support", FieldKind::FrameSupport),
            FieldSpec::new("id", FieldKind::Id).with_db_field("_id"),
            FieldSpec::new("sample_id", FieldKind::ObjectId).with_db_field("_sample_id"),
        ];

        pretty_order(&mut fields);

        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "sample_id", "filepath", "support", "events"]);
    }

    #[test]
    fn test_frame_support_like() {
        assert!(FieldKind::FrameSupport.is_frame_support_like());
        assert!(FieldKind::List(Box::new(FieldKind::FrameSupport)).is_frame_support_like());
        assert!(!FieldKind::List(Box::new(FieldKind::Int)).is_frame_support_like());
        assert!(!FieldKind::Str.is_frame_support_like());
    }

    #[test]
    fn test_field_kind_display() {
        assert_eq!(
            FieldKind::List(Box::new(FieldKind::FrameSupport)).to_string(),
            "List(FrameSupport)"
        );
        assert_eq!(
            FieldKind::Embedded(LabelKind::TemporalDetections).to_string(),
            "Embedded(TemporalDetections)"
        );
    }
}
