//! In-process document store engine.
//!
//! [`MemoryStore`] keeps every collection in memory behind an async lock and
//! implements the full [`DocumentStore`] surface, including the aggregation
//! pipeline. Pipelines with a trailing `$out` stage hold the write lock for
//! the whole run, so the target collection is never observed half-written.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::metrics::{record_documents, record_operation};
use crate::pipeline::{Expr, Filter, ProjectSpec, Projection, Stage, UpdateOp};
use crate::store::DocumentStore;
use crate::value::{compare_values, Document, Value};

#[derive(Debug)]
struct Collection {
    docs: Vec<Document>,
    indexes: Vec<String>,
}

impl Collection {
    fn new() -> Self {
        Self {
            docs: Vec::new(),
            indexes: vec!["_id".to_string()],
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    collections: HashMap<String, Collection>,
}

/// An in-memory [`DocumentStore`].
///
/// Cloning is cheap; clones share the same underlying collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn execute_op<T, F>(&self, operation: &str, collection: &str, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        let span = info_span!("store_op", operation = %operation, collection = %collection);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        record_operation(operation, result.is_ok(), latency_ms);

        result
    }
}

fn new_doc_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// Pipeline evaluation
// =============================================================================

fn validate_pipeline(stages: &[Stage]) -> StoreResult<()> {
    for (i, stage) in stages.iter().enumerate() {
        if matches!(stage, Stage::Out { .. }) && i + 1 != stages.len() {
            return Err(StoreError::invalid_pipeline(
                "an output stage must be the final stage",
            ));
        }
    }
    Ok(())
}

fn eval_expr(expr: &Expr, doc: &Document) -> Option<Value> {
    match expr {
        Expr::Field(path) => doc.get_path(path).cloned(),
        Expr::Literal(value) => Some(value.clone()),
        Expr::Rand => Some(Value::Double(rand::rng().random::<f64>())),
        Expr::Slice { expr, skip, take } => match eval_expr(expr, doc)? {
            Value::Array(elems) => Some(Value::Array(
                elems.into_iter().skip(*skip).take(*take).collect(),
            )),
            _ => None,
        },
        Expr::ElemAt { expr, index } => match eval_expr(expr, doc)? {
            Value::Array(elems) => elems.into_iter().nth(*index),
            _ => None,
        },
        Expr::Map(entries) => {
            let mut map = BTreeMap::new();
            for (name, sub) in entries {
                if let Some(value) = eval_expr(sub, doc) {
                    map.insert(name.clone(), value);
                }
            }
            Some(Value::Map(map))
        }
    }
}

fn apply_project(doc: &Document, spec: &ProjectSpec) -> Document {
    let mut out = Document::new();
    let mut id_named = false;

    for (path, projection) in spec.fields() {
        if path == "_id" {
            id_named = true;
        }
        match projection {
            Projection::Include => {
                if let Some(value) = doc.get_path(path) {
                    out.set_path(path, value.clone());
                }
            }
            Projection::Exclude => {}
            Projection::Expr(expr) => {
                if let Some(value) = eval_expr(expr, doc) {
                    out.set_path(path, value);
                }
            }
        }
    }

    // `_id` rides along unless the projection names it.
    if !id_named {
        if let Some(id) = doc.get("_id") {
            out.set("_id", id.clone());
        }
    }

    out
}

fn apply_unwind(docs: Vec<Document>, path: &str) -> Vec<Document> {
    let mut out = Vec::new();
    for doc in docs {
        match doc.get_path(path).cloned() {
            None | Some(Value::Null) => {}
            Some(Value::Array(elems)) => {
                for elem in elems {
                    let mut copy = doc.clone();
                    copy.set_path(path, elem);
                    out.push(copy);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    out
}

fn apply_set(doc: Document, entries: &[(String, Expr)]) -> Document {
    // Expressions see the stage input, not each other's outputs.
    let input = doc.clone();
    let mut out = doc;
    for (path, expr) in entries {
        if let Some(value) = eval_expr(expr, &input) {
            out.set_path(path, value);
        }
    }
    out
}

/// Run the non-output stages of a pipeline over a document snapshot.
fn eval_stages(mut docs: Vec<Document>, stages: &[Stage]) -> StoreResult<Vec<Document>> {
    for stage in stages {
        docs = match stage {
            Stage::Project(spec) => docs.iter().map(|d| apply_project(d, spec)).collect(),
            Stage::Unwind { path } => apply_unwind(docs, path),
            Stage::Set(entries) => docs.into_iter().map(|d| apply_set(d, entries)).collect(),
            Stage::Unset(paths) => {
                for doc in &mut docs {
                    for path in paths {
                        doc.remove_path(path);
                    }
                }
                docs
            }
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Sort { path, ascending } => {
                docs.sort_by(|a, b| {
                    let null = Value::Null;
                    let av = a.get_path(path).unwrap_or(&null);
                    let bv = b.get_path(path).unwrap_or(&null);
                    let ord = compare_values(av, bv);
                    if *ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                });
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Out { .. } => {
                return Err(StoreError::invalid_pipeline(
                    "an output stage cannot be evaluated inline",
                ));
            }
        };
    }
    Ok(docs)
}

fn apply_update(doc: &mut Document, op: &UpdateOp) {
    match op {
        UpdateOp::Set(entries) => {
            for (path, value) in entries {
                doc.set_path(path, value.clone());
            }
        }
        UpdateOp::Unset(paths) => {
            for path in paths {
                doc.remove_path(path);
            }
        }
    }
}

// =============================================================================
// DocumentStore implementation
// =============================================================================

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.execute_op("create_collection", name, async {
            let mut inner = self.inner.write().await;
            if inner.collections.contains_key(name) {
                return Err(StoreError::CollectionExists(name.to_string()));
            }
            inner.collections.insert(name.to_string(), Collection::new());
            Ok(())
        })
        .await
    }

    async fn drop_collection(&self, name: &str) -> StoreResult<bool> {
        self.execute_op("drop_collection", name, async {
            let mut inner = self.inner.write().await;
            Ok(inner.collections.remove(name).is_some())
        })
        .await
    }

    async fn collection_names(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<Vec<String>> {
        self.execute_op("insert_many", collection, async {
            let mut inner = self.inner.write().await;
            let coll = inner
                .collections
                .entry(collection.to_string())
                .or_insert_with(Collection::new);

            let mut ids = Vec::with_capacity(docs.len());
            for mut doc in docs {
                if doc.id().is_none() {
                    doc.set_id(new_doc_id());
                }
                // id() is always set here
                ids.push(doc.id().unwrap_or_default().to_string());
                coll.docs.push(doc);
            }

            record_documents("insert_many", ids.len() as u64);
            Ok(ids)
        })
        .await
    }

    async fn find(&self, collection: &str, filter: Filter) -> StoreResult<Vec<Document>> {
        self.execute_op("find", collection, async {
            let inner = self.inner.read().await;
            let docs = match inner.collections.get(collection) {
                Some(coll) => coll
                    .docs
                    .iter()
                    .filter(|d| filter.matches(d))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            };
            Ok(docs)
        })
        .await
    }

    async fn count(&self, collection: &str, filter: Filter) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        let count = match inner.collections.get(collection) {
            Some(coll) => coll.docs.iter().filter(|d| filter.matches(d)).count(),
            None => 0,
        };
        Ok(count as u64)
    }

    async fn aggregate(&self, collection: &str, stages: Vec<Stage>) -> StoreResult<Vec<Document>> {
        self.execute_op("aggregate", collection, async {
            validate_pipeline(&stages)?;

            let out_target = match stages.last() {
                Some(Stage::Out { collection }) => Some(collection.clone()),
                _ => None,
            };

            let results = match out_target {
                Some(target) => {
                    // Hold the write lock across read and write so the target
                    // collection swaps in one step.
                    let mut inner = self.inner.write().await;
                    let snapshot = inner
                        .collections
                        .get(collection)
                        .map(|c| c.docs.clone())
                        .unwrap_or_default();

                    let mut results = eval_stages(snapshot, &stages[..stages.len() - 1])?;
                    for doc in &mut results {
                        if doc.id().is_none() {
                            doc.set_id(new_doc_id());
                        }
                    }

                    let coll = inner
                        .collections
                        .entry(target)
                        .or_insert_with(Collection::new);
                    coll.docs = results.clone();
                    results
                }
                None => {
                    let snapshot = {
                        let inner = self.inner.read().await;
                        inner
                            .collections
                            .get(collection)
                            .map(|c| c.docs.clone())
                            .unwrap_or_default()
                    };
                    eval_stages(snapshot, &stages)?
                }
            };

            record_documents("aggregate", results.len() as u64);
            Ok(results)
        })
        .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Filter,
        op: UpdateOp,
    ) -> StoreResult<u64> {
        self.execute_op("update_many", collection, async {
            let mut inner = self.inner.write().await;
            let mut updated = 0u64;
            if let Some(coll) = inner.collections.get_mut(collection) {
                for doc in coll.docs.iter_mut().filter(|d| filter.matches(d)) {
                    apply_update(doc, &op);
                    updated += 1;
                }
            }
            record_documents("update_many", updated);
            Ok(updated)
        })
        .await
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> StoreResult<u64> {
        self.execute_op("delete_many", collection, async {
            let mut inner = self.inner.write().await;
            let mut deleted = 0u64;
            if let Some(coll) = inner.collections.get_mut(collection) {
                let before = coll.docs.len();
                coll.docs.retain(|d| !filter.matches(d));
                deleted = (before - coll.docs.len()) as u64;
            }
            record_documents("delete_many", deleted);
            Ok(deleted)
        })
        .await
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Filter,
        doc: Document,
    ) -> StoreResult<bool> {
        self.execute_op("replace_one", collection, async {
            let mut inner = self.inner.write().await;
            let Some(coll) = inner.collections.get_mut(collection) else {
                return Ok(false);
            };
            let Some(pos) = coll.docs.iter().position(|d| filter.matches(d)) else {
                return Ok(false);
            };

            let mut doc = doc;
            if doc.id().is_none() {
                if let Some(id) = coll.docs[pos].id() {
                    doc.set_id(id.to_string());
                }
            }
            coll.docs[pos] = doc;
            Ok(true)
        })
        .await
    }

    async fn create_index(&self, collection: &str, path: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let coll = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(Collection::new);
        if !coll.indexes.iter().any(|p| p == path) {
            coll.indexes.push(path.to_string());
        }
        Ok(())
    }

    async fn index_names(&self, collection: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let names = inner
            .collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default();
        Ok(names)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(entries: &[(&str, Value)]) -> Document {
        let mut doc = Document::new();
        for (name, value) in entries {
            doc.set(*name, value.clone());
        }
        doc
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_creates_collection() {
        let store = MemoryStore::new();
        let ids = store
            .insert_many("videos", vec![Document::new(), Document::new()])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(store.has_collection("videos").await.unwrap());
        assert_eq!(store.count("videos", Filter::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_collection_conflict() {
        let store = MemoryStore::new();
        store.create_collection("videos").await.unwrap();
        let err = store.create_collection("videos").await.unwrap_err();
        assert!(matches!(err, StoreError::CollectionExists(_)));
    }

    #[tokio::test]
    async fn test_missing_collection_reads_empty() {
        let store = MemoryStore::new();
        assert!(store.find("nope", Filter::All).await.unwrap().is_empty());
        assert_eq!(store.count("nope", Filter::All).await.unwrap(), 0);
        assert!(store
            .aggregate("nope", vec![Stage::Match(Filter::All)])
            .await
            .unwrap()
            .is_empty());
        assert!(!store.drop_collection("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_and_update_and_delete() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "videos",
                vec![
                    doc(&[("kind", Value::Str("a".into()))]),
                    doc(&[("kind", Value::Str("b".into()))]),
                    doc(&[("kind", Value::Str("a".into()))]),
                ],
            )
            .await
            .unwrap();

        let found = store.find("videos", Filter::eq("kind", "a")).await.unwrap();
        assert_eq!(found.len(), 2);

        let updated = store
            .update_many(
                "videos",
                Filter::eq("kind", "a"),
                UpdateOp::set_one("seen", true),
            )
            .await
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(store.count("videos", Filter::eq("seen", true)).await.unwrap(), 2);

        let removed = store
            .update_many("videos", Filter::All, UpdateOp::unset_one("seen"))
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.count("videos", Filter::exists("seen")).await.unwrap(), 0);

        let deleted = store
            .delete_many("videos", Filter::eq("kind", "b"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count("videos", Filter::All).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replace_one_inherits_id() {
        let store = MemoryStore::new();
        let ids = store
            .insert_many("videos", vec![doc(&[("name", Value::Str("old".into()))])])
            .await
            .unwrap();

        let replaced = store
            .replace_one(
                "videos",
                Filter::eq("name", "old"),
                doc(&[("name", Value::Str("new".into()))]),
            )
            .await
            .unwrap();
        assert!(replaced);

        let found = store.find("videos", Filter::All).await.unwrap();
        assert_eq!(found[0].id(), Some(ids[0].as_str()));
        assert_eq!(found[0].get("name").and_then(Value::as_str), Some("new"));
    }

    #[tokio::test]
    async fn test_project_inclusion_and_id_handling() {
        let store = MemoryStore::new();
        let mut input = Document::new();
        input.set_id("d1");
        input.set("keep", 1i64);
        input.set("drop", 2i64);
        store.insert_many("c", vec![input]).await.unwrap();

        // _id rides along by default
        let spec = ProjectSpec::new().include("keep");
        let out = store
            .aggregate("c", vec![Stage::Project(spec)])
            .await
            .unwrap();
        assert_eq!(out[0].id(), Some("d1"));
        assert!(out[0].contains("keep"));
        assert!(!out[0].contains("drop"));

        // explicit exclusion drops it
        let spec = ProjectSpec::new().exclude("_id").include("keep");
        let out = store
            .aggregate("c", vec![Stage::Project(spec)])
            .await
            .unwrap();
        assert!(out[0].id().is_none());

        // computed _id replaces it
        let spec = ProjectSpec::new().computed("_id", Expr::literal("forced"));
        let out = store
            .aggregate("c", vec![Stage::Project(spec)])
            .await
            .unwrap();
        assert_eq!(out[0].id(), Some("forced"));
    }

    #[tokio::test]
    async fn test_unwind_semantics() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "c",
                vec![
                    doc(&[(
                        "items",
                        Value::Array(vec![Value::Int(1), Value::Int(2)]),
                    )]),
                    doc(&[("items", Value::Array(vec![]))]),
                    doc(&[("items", Value::Null)]),
                    doc(&[("other", Value::Int(9))]),
                    doc(&[("items", Value::Int(7))]),
                ],
            )
            .await
            .unwrap();

        let out = store
            .aggregate("c", vec![Stage::unwind("items")])
            .await
            .unwrap();

        // two elements from the first doc, plus the non-array passthrough
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].get("items").and_then(Value::as_int), Some(1));
        assert_eq!(out[1].get("items").and_then(Value::as_int), Some(2));
        assert_eq!(out[2].get("items").and_then(Value::as_int), Some(7));
    }

    #[tokio::test]
    async fn test_set_sees_stage_input() {
        let store = MemoryStore::new();
        store
            .insert_many("c", vec![doc(&[("a", Value::Int(1)), ("b", Value::Int(2))])])
            .await
            .unwrap();

        let out = store
            .aggregate(
                "c",
                vec![Stage::Set(vec![
                    ("a".to_string(), Expr::field("b")),
                    ("b".to_string(), Expr::field("a")),
                ])],
            )
            .await
            .unwrap();

        assert_eq!(out[0].get("a").and_then(Value::as_int), Some(2));
        assert_eq!(out[0].get("b").and_then(Value::as_int), Some(1));
    }

    #[tokio::test]
    async fn test_slice_and_elem_at() {
        let store = MemoryStore::new();
        let values = Value::Array(vec![
            Value::Str("walking".into()),
            Value::Int(3),
            Value::Int(10),
            Value::Int(20),
        ]);
        store.insert_many("c", vec![doc(&[("tmp", values)])]).await.unwrap();

        let out = store
            .aggregate(
                "c",
                vec![Stage::Set(vec![
                    ("support".to_string(), Expr::slice(Expr::field("tmp"), 2, 2)),
                    ("label".to_string(), Expr::elem_at(Expr::field("tmp"), 0)),
                    ("index".to_string(), Expr::elem_at(Expr::field("tmp"), 1)),
                ])],
            )
            .await
            .unwrap();

        assert_eq!(
            out[0].get("support"),
            Some(&Value::Array(vec![Value::Int(10), Value::Int(20)]))
        );
        assert_eq!(out[0].get("label").and_then(Value::as_str), Some("walking"));
        assert_eq!(out[0].get("index").and_then(Value::as_int), Some(3));
    }

    #[tokio::test]
    async fn test_sort_and_limit() {
        let store = MemoryStore::new();
        store
            .insert_many(
                "c",
                vec![
                    doc(&[("n", Value::Int(3))]),
                    doc(&[("n", Value::Int(1))]),
                    doc(&[("n", Value::Int(2))]),
                ],
            )
            .await
            .unwrap();

        let out = store
            .aggregate(
                "c",
                vec![Stage::sort_by("n", true), Stage::Limit(2)],
            )
            .await
            .unwrap();

        let ns: Vec<i64> = out.iter().filter_map(|d| d.get("n").and_then(Value::as_int)).collect();
        assert_eq!(ns, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_out_replaces_target() {
        let store = MemoryStore::new();
        store
            .insert_many("src", vec![doc(&[("n", Value::Int(1))])])
            .await
            .unwrap();
        store
            .insert_many("dst", vec![doc(&[("stale", Value::Bool(true))])])
            .await
            .unwrap();
        store.create_index("dst", "n").await.unwrap();

        let spec = ProjectSpec::new().exclude("_id").include("n");
        let written = store
            .aggregate(
                "src",
                vec![Stage::Project(spec), Stage::out("dst")],
            )
            .await
            .unwrap();

        // the output got a fresh id on write
        assert!(written[0].id().is_some());

        let dst = store.find("dst", Filter::All).await.unwrap();
        assert_eq!(dst.len(), 1);
        assert!(dst[0].contains("n"));
        assert!(!dst[0].contains("stale"));

        // target indexes survive the swap
        let indexes = store.index_names("dst").await.unwrap();
        assert!(indexes.iter().any(|i| i == "n"));
    }

    #[tokio::test]
    async fn test_out_must_be_last() {
        let store = MemoryStore::new();
        let err = store
            .aggregate(
                "src",
                vec![Stage::out("dst"), Stage::Match(Filter::All)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPipeline(_)));
    }

    #[tokio::test]
    async fn test_rand_expr_in_range() {
        let store = MemoryStore::new();
        store
            .insert_many("c", (0..50).map(|_| Document::new()).collect())
            .await
            .unwrap();

        let out = store
            .aggregate(
                "c",
                vec![Stage::Set(vec![("_rand".to_string(), Expr::Rand)])],
            )
            .await
            .unwrap();

        for d in &out {
            let r = d.get("_rand").and_then(Value::as_double).unwrap();
            assert!((0.0..1.0).contains(&r));
        }
    }

    #[tokio::test]
    async fn test_create_index_dedup() {
        let store = MemoryStore::new();
        store.create_index("c", "_sample_id").await.unwrap();
        store.create_index("c", "_sample_id").await.unwrap();
        let names = store.index_names("c").await.unwrap();
        assert_eq!(
            names.iter().filter(|n| n.as_str() == "_sample_id").count(),
            1
        );
        assert!(names.iter().any(|n| n == "_id"));
    }
}
