//! Typed aggregation pipeline model.
//!
//! A pipeline is a list of [`Stage`]s applied in order to a collection's
//! documents. Stages are plain data so callers can build, inspect, and log
//! them before execution.

use serde::{Deserialize, Serialize};

use crate::value::{Document, ToValue, Value};

/// A field expression evaluated against a single input document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Read a (dotted) field path from the input document.
    Field(String),
    /// A constant value.
    Literal(Value),
    /// A fresh uniform random double in `[0, 1)` per document.
    Rand,
    /// `skip`/`take` elements of an array-valued expression.
    Slice {
        expr: Box<Expr>,
        skip: usize,
        take: usize,
    },
    /// A single element of an array-valued expression.
    ElemAt { expr: Box<Expr>, index: usize },
    /// Build a nested map from named sub-expressions.
    Map(Vec<(String, Expr)>),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Expr {
        Expr::Field(path.into())
    }

    pub fn literal(value: impl ToValue) -> Expr {
        Expr::Literal(value.to_value())
    }

    pub fn slice(expr: Expr, skip: usize, take: usize) -> Expr {
        Expr::Slice {
            expr: Box::new(expr),
            skip,
            take,
        }
    }

    pub fn elem_at(expr: Expr, index: usize) -> Expr {
        Expr::ElemAt {
            expr: Box::new(expr),
            index,
        }
    }

    pub fn map(entries: Vec<(String, Expr)>) -> Expr {
        Expr::Map(entries)
    }
}

/// How a projected field is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Copy the field from the input document if present.
    Include,
    /// Drop the field. Only meaningful for `_id`, which is otherwise kept.
    Exclude,
    /// Compute the field from an expression.
    Expr(Expr),
}

/// A projection stage specification.
///
/// Projection runs in inclusion mode: only named fields appear in the output,
/// except `_id` which is carried through unless explicitly excluded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectSpec {
    fields: Vec<(String, Projection)>,
}

impl ProjectSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.fields.push((path.into(), Projection::Include));
        self
    }

    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.fields.push((path.into(), Projection::Exclude));
        self
    }

    pub fn computed(mut self, path: impl Into<String>, expr: Expr) -> Self {
        self.fields.push((path.into(), Projection::Expr(expr)));
        self
    }

    pub fn fields(&self) -> &[(String, Projection)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A document predicate for match stages and filtered updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field at `path` equals `value`.
    Eq { path: String, value: Value },
    /// Field at `path` equals one of `values`.
    In { path: String, values: Vec<Value> },
    /// Field at `path` is missing or equals none of `values`.
    NotIn { path: String, values: Vec<Value> },
    /// Field at `path` is present (or absent, when `exists` is false).
    Exists { path: String, exists: bool },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl ToValue) -> Filter {
        Filter::Eq {
            path: path.into(),
            value: value.to_value(),
        }
    }

    pub fn in_values<T: ToValue>(path: impl Into<String>, values: &[T]) -> Filter {
        Filter::In {
            path: path.into(),
            values: values.iter().map(|v| v.to_value()).collect(),
        }
    }

    pub fn not_in_values<T: ToValue>(path: impl Into<String>, values: &[T]) -> Filter {
        Filter::NotIn {
            path: path.into(),
            values: values.iter().map(|v| v.to_value()).collect(),
        }
    }

    pub fn exists(path: impl Into<String>) -> Filter {
        Filter::Exists {
            path: path.into(),
            exists: true,
        }
    }

    pub fn missing(path: impl Into<String>) -> Filter {
        Filter::Exists {
            path: path.into(),
            exists: false,
        }
    }

    /// Evaluate the predicate against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { path, value } => doc.get_path(path) == Some(value),
            Filter::In { path, values } => match doc.get_path(path) {
                Some(found) => values.contains(found),
                None => false,
            },
            Filter::NotIn { path, values } => match doc.get_path(path) {
                Some(found) => !values.contains(found),
                None => true,
            },
            Filter::Exists { path, exists } => doc.get_path(path).is_some() == *exists,
        }
    }
}

/// One aggregation pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    /// Reshape each document per the projection spec.
    Project(ProjectSpec),
    /// Emit one document per element of the array at `path`, with the element
    /// in place of the array. Documents where `path` is missing, null, or an
    /// empty array are dropped; non-array values pass through unchanged.
    Unwind { path: String },
    /// Set fields from expressions evaluated against the stage input.
    Set(Vec<(String, Expr)>),
    /// Remove fields by (dotted) path.
    Unset(Vec<String>),
    /// Keep only documents matching the filter.
    Match(Filter),
    /// Sort by the value at `path`.
    Sort { path: String, ascending: bool },
    /// Keep the first `n` documents.
    Limit(usize),
    /// Replace the named collection with the pipeline output. Must be the
    /// final stage; documents without an `_id` get a fresh one on write.
    Out { collection: String },
}

impl Stage {
    pub fn unwind(path: impl Into<String>) -> Stage {
        Stage::Unwind { path: path.into() }
    }

    pub fn sort_by(path: impl Into<String>, ascending: bool) -> Stage {
        Stage::Sort {
            path: path.into(),
            ascending,
        }
    }

    pub fn out(collection: impl Into<String>) -> Stage {
        Stage::Out {
            collection: collection.into(),
        }
    }
}

/// A mutation applied by `update_many`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateOp {
    /// Set fields to constant values.
    Set(Vec<(String, Value)>),
    /// Remove fields by (dotted) path.
    Unset(Vec<String>),
}

impl UpdateOp {
    pub fn set_one(path: impl Into<String>, value: impl ToValue) -> UpdateOp {
        UpdateOp::Set(vec![(path.into(), value.to_value())])
    }

    pub fn unset_one(path: impl Into<String>) -> UpdateOp {
        UpdateOp::Unset(vec![path.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let mut doc = Document::new();
        doc.set("filepath", "/videos/a.mp4");
        doc.set_path("events.label", "meeting");

        assert!(Filter::All.matches(&doc));
        assert!(Filter::eq("filepath", "/videos/a.mp4").matches(&doc));
        assert!(!Filter::eq("filepath", "/videos/b.mp4").matches(&doc));
        assert!(Filter::eq("events.label", "meeting").matches(&doc));
        assert!(Filter::in_values("filepath", &["/videos/a.mp4", "/videos/b.mp4"]).matches(&doc));
        assert!(!Filter::in_values("filepath", &["/videos/c.mp4"]).matches(&doc));
        assert!(Filter::not_in_values("filepath", &["/videos/c.mp4"]).matches(&doc));
        assert!(Filter::not_in_values("absent", &["x"]).matches(&doc));
        assert!(Filter::exists("events").matches(&doc));
        assert!(Filter::missing("tags").matches(&doc));
    }

    #[test]
    fn test_project_spec_builder() {
        let spec = ProjectSpec::new()
            .exclude("_id")
            .include("filepath")
            .computed("_sample_id", Expr::field("_id"));
        assert_eq!(spec.fields().len(), 3);
        assert_eq!(spec.fields()[0].0, "_id");
        assert!(matches!(spec.fields()[2].1, Projection::Expr(_)));
    }
}
