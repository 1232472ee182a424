//! The document store capability trait.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::pipeline::{Filter, Stage, UpdateOp};
use crate::value::Document;

/// Backend-agnostic document store operations.
///
/// Collections hold documents keyed by a string `_id`. Writes targeting a
/// collection that does not exist create it; reads from a missing collection
/// return empty results rather than erroring.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create an empty collection. Errors if the name is taken.
    async fn create_collection(&self, name: &str) -> StoreResult<()>;

    /// Drop a collection and its documents. Returns whether it existed.
    async fn drop_collection(&self, name: &str) -> StoreResult<bool>;

    /// Names of all collections, sorted.
    async fn collection_names(&self) -> StoreResult<Vec<String>>;

    async fn has_collection(&self, name: &str) -> StoreResult<bool> {
        Ok(self.collection_names().await?.iter().any(|n| n == name))
    }

    /// Insert documents, assigning a fresh `_id` to any that lack one.
    /// Returns the ids in insertion order.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> StoreResult<Vec<String>>;

    /// All documents matching the filter, in insertion order.
    async fn find(&self, collection: &str, filter: Filter) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str, filter: Filter) -> StoreResult<u64>;

    /// Run an aggregation pipeline and return its output documents.
    ///
    /// A trailing [`Stage::Out`] writes the output to another collection
    /// instead, replacing it, and returns the written documents.
    async fn aggregate(&self, collection: &str, stages: Vec<Stage>) -> StoreResult<Vec<Document>>;

    /// Apply a mutation to every matching document. Returns the match count.
    async fn update_many(
        &self,
        collection: &str,
        filter: Filter,
        op: UpdateOp,
    ) -> StoreResult<u64>;

    /// Delete every matching document. Returns the delete count.
    async fn delete_many(&self, collection: &str, filter: Filter) -> StoreResult<u64>;

    /// Replace the first matching document wholesale. Returns whether a
    /// document was replaced.
    async fn replace_one(
        &self,
        collection: &str,
        filter: Filter,
        doc: Document,
    ) -> StoreResult<bool>;

    /// Declare an index on a field path. Indexes are advisory metadata here;
    /// engines may use them for lookup acceleration.
    async fn create_index(&self, collection: &str, path: &str) -> StoreResult<()>;

    async fn index_names(&self, collection: &str) -> StoreResult<Vec<String>>;
}
