//! Dataset registry.
//!
//! Dataset metadata lives in a `datasets` collection so handles can be
//! reloaded by name and stale clip datasets can be deleted for real.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use framelab_models::MediaType;
use framelab_store::{Document, DocumentStore, Filter};

use crate::config::DatasetConfig;
use crate::error::{DatasetError, DatasetResult};
use crate::schema::{default_sample_fields, FieldSpec};

/// Collection holding one metadata document per dataset.
pub const REGISTRY_COLLECTION: &str = "datasets";

/// Persisted dataset metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMeta {
    #[serde(rename = "_id")]
    pub id: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    pub sample_collection: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_collection: Option<String>,

    #[serde(default)]
    pub is_clips: bool,

    /// Name of the dataset this clips dataset was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    pub sample_fields: Vec<FieldSpec>,

    #[serde(default)]
    pub frame_fields: Vec<FieldSpec>,

    #[serde(default)]
    pub persistent: bool,

    pub created_at: DateTime<Utc>,
}

impl DatasetMeta {
    /// Fresh metadata for a new dataset with the default sample schema.
    pub fn new(name: impl Into<String>, config: &DatasetConfig) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();

        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            media_type: None,
            sample_collection: format!("{}.{}", config.sample_collection_prefix, suffix),
            frame_collection: None,
            is_clips: false,
            source_name: None,
            sample_fields: default_sample_fields(),
            frame_fields: Vec::new(),
            persistent: config.persistent_default,
            created_at: Utc::now(),
        }
    }

    fn to_doc(&self) -> DatasetResult<Document> {
        Ok(Document::from_serialize(self)?)
    }
}

pub async fn insert(store: &dyn DocumentStore, meta: &DatasetMeta) -> DatasetResult<()> {
    if exists(store, &meta.name).await? {
        return Err(DatasetError::NameInUse(meta.name.clone()));
    }
    store
        .insert_many(REGISTRY_COLLECTION, vec![meta.to_doc()?])
        .await?;
    Ok(())
}

pub async fn load(store: &dyn DocumentStore, name: &str) -> DatasetResult<DatasetMeta> {
    let docs = store
        .find(REGISTRY_COLLECTION, Filter::eq("name", name))
        .await?;
    match docs.first() {
        Some(doc) => Ok(doc.deserialize_into()?),
        None => Err(DatasetError::DoesNotExist(name.to_string())),
    }
}

/// Persist updated metadata. The dataset must already be registered.
pub async fn save(store: &dyn DocumentStore, meta: &DatasetMeta) -> DatasetResult<()> {
    let replaced = store
        .replace_one(
            REGISTRY_COLLECTION,
            Filter::eq("name", meta.name.as_str()),
            meta.to_doc()?,
        )
        .await?;
    if !replaced {
        return Err(DatasetError::DoesNotExist(meta.name.clone()));
    }
    Ok(())
}

pub async fn remove(store: &dyn DocumentStore, name: &str) -> DatasetResult<bool> {
    let deleted = store
        .delete_many(REGISTRY_COLLECTION, Filter::eq("name", name))
        .await?;
    Ok(deleted > 0)
}

pub async fn exists(store: &dyn DocumentStore, name: &str) -> DatasetResult<bool> {
    let count = store
        .count(REGISTRY_COLLECTION, Filter::eq("name", name))
        .await?;
    Ok(count > 0)
}

/// Names of all registered datasets, sorted.
pub async fn list_datasets(store: &dyn DocumentStore) -> DatasetResult<Vec<String>> {
    let docs = store.find(REGISTRY_COLLECTION, Filter::All).await?;
    let mut names: Vec<String> = docs
        .iter()
        .filter_map(|d| d.get("name").and_then(|v| v.as_str()).map(String::from))
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framelab_store::MemoryStore;

    #[tokio::test]
    async fn test_registry_round_trip() {
        let store = MemoryStore::new();
        let config = DatasetConfig::default();
        let meta = DatasetMeta::new("train", &config);

        insert(&store, &meta).await.unwrap();
        assert!(exists(&store, "train").await.unwrap());

        let loaded = load(&store, "train").await.unwrap();
        assert_eq!(loaded.name, "train");
        assert_eq!(loaded.sample_collection, meta.sample_collection);
        assert!(loaded.sample_fields.iter().any(|f| f.name == "filepath"));
    }

    #[tokio::test]
    async fn test_registry_rejects_duplicate_names() {
        let store = MemoryStore::new();
        let config = DatasetConfig::default();

        insert(&store, &DatasetMeta::new("train", &config))
            .await
            .unwrap();
        let err = insert(&store, &DatasetMeta::new("train", &config))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::NameInUse(_)));
    }

    #[tokio::test]
    async fn test_registry_save_and_remove() {
        let store = MemoryStore::new();
        let config = DatasetConfig::default();
        let mut meta = DatasetMeta::new("train", &config);
        insert(&store, &meta).await.unwrap();

        meta.media_type = Some(MediaType::Video);
        save(&store, &meta).await.unwrap();
        let loaded = load(&store, "train").await.unwrap();
        assert_eq!(loaded.media_type, Some(MediaType::Video));

        assert!(remove(&store, "train").await.unwrap());
        assert!(!exists(&store, "train").await.unwrap());
        assert!(matches!(
            load(&store, "train").await,
            Err(DatasetError::DoesNotExist(_))
        ));
    }

    #[tokio::test]
    async fn test_list_datasets_sorted() {
        let store = MemoryStore::new();
        let config = DatasetConfig::default();
        insert(&store, &DatasetMeta::new("zebra", &config))
            .await
            .unwrap();
        insert(&store, &DatasetMeta::new("alpha", &config))
            .await
            .unwrap();

        assert_eq!(list_datasets(&store).await.unwrap(), vec!["alpha", "zebra"]);
    }
}
