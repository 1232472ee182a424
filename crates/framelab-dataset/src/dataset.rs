//! Dataset handles.
//!
//! A [`Dataset`] is a cheap-to-clone handle over one sample collection (and,
//! for video, one frame collection) plus its registered schema. All live
//! state sits behind the registry document; handles reload from it.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use framelab_models::{MediaType, SampleId, VideoMetadata};
use framelab_store::{compare_values, Document, DocumentStore, Filter, UpdateOp, Value};

use crate::config::DatasetConfig;
use crate::error::{DatasetError, DatasetResult};
use crate::registry::{self, DatasetMeta};
use crate::schema::{self, default_frame_fields, FieldKind, FieldSpec};
use crate::view::DatasetView;

/// Path prefix addressing frame-level fields from a video dataset.
pub const FRAMES_PREFIX: &str = "frames.";

/// Shared handle to the backing document store.
pub type StoreHandle = Arc<dyn DocumentStore>;

/// Sample fields that cannot be removed from a schema.
const PROTECTED_SAMPLE_FIELDS: [&str; 6] =
    ["id", "filepath", "tags", "metadata", "sample_id", "support"];

/// Frame fields that cannot be removed from a schema.
const PROTECTED_FRAME_FIELDS: [&str; 3] = ["id", "frame_number", "sample_id"];

struct DatasetInner {
    store: StoreHandle,
    config: DatasetConfig,
    state: RwLock<DatasetMeta>,
}

/// A named collection of samples.
#[derive(Clone)]
pub struct Dataset {
    inner: Arc<DatasetInner>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset").finish_non_exhaustive()
    }
}

impl Dataset {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create and register a new dataset.
    pub async fn create(
        store: StoreHandle,
        name: &str,
        config: DatasetConfig,
    ) -> DatasetResult<Dataset> {
        let meta = DatasetMeta::new(name, &config);

        registry::insert(store.as_ref(), &meta).await?;
        store.create_collection(&meta.sample_collection).await?;
        store.create_index(&meta.sample_collection, "filepath").await?;

        debug!(dataset = %name, collection = %meta.sample_collection, "created dataset");

        Ok(Self::from_parts(store, config, meta))
    }

    /// Load a registered dataset by name.
    pub async fn load(
        store: StoreHandle,
        name: &str,
        config: DatasetConfig,
    ) -> DatasetResult<Dataset> {
        let meta = registry::load(store.as_ref(), name).await?;
        Ok(Self::from_parts(store, config, meta))
    }

    /// Create a clips dataset derived from `source`, sharing its frame
    /// collection.
    pub async fn create_clips(source: &Dataset, name: &str) -> DatasetResult<Dataset> {
        let store = source.store_handle();
        let config = source.inner.config.clone();
        let src_meta = source.meta().await;

        let mut meta = DatasetMeta::new(name, &config);
        meta.media_type = Some(MediaType::Video);
        meta.is_clips = true;
        meta.source_name = Some(src_meta.name.clone());
        meta.frame_collection = src_meta.frame_collection.clone();
        meta.frame_fields = src_meta.frame_fields.clone();

        registry::insert(store.as_ref(), &meta).await?;
        store.create_collection(&meta.sample_collection).await?;
        store.create_index(&meta.sample_collection, "filepath").await?;

        debug!(dataset = %name, source = %src_meta.name, "created clips dataset");

        Ok(Self::from_parts(store, config, meta))
    }

    fn from_parts(store: StoreHandle, config: DatasetConfig, meta: DatasetMeta) -> Dataset {
        Dataset {
            inner: Arc::new(DatasetInner {
                store,
                config,
                state: RwLock::new(meta),
            }),
        }
    }

    /// Delete the dataset's collections and registry entry.
    ///
    /// A clips dataset never drops the frame collection it shares with its
    /// source.
    pub async fn delete(&self) -> DatasetResult<()> {
        let meta = self.meta().await;

        self.store().drop_collection(&meta.sample_collection).await?;
        if !meta.is_clips {
            if let Some(frames) = &meta.frame_collection {
                self.store().drop_collection(frames).await?;
            }
        }
        registry::remove(self.store(), &meta.name).await?;

        debug!(dataset = %meta.name, "deleted dataset");
        Ok(())
    }

    /// Re-read schemas and collection names from the registry.
    pub async fn reload(&self) -> DatasetResult<()> {
        let name = self.name().await;
        let meta = registry::load(self.store(), &name).await?;
        *self.inner.state.write().await = meta;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    pub fn store_handle(&self) -> StoreHandle {
        Arc::clone(&self.inner.store)
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.inner.config
    }

    /// Snapshot of the current metadata.
    pub async fn meta(&self) -> DatasetMeta {
        self.inner.state.read().await.clone()
    }

    pub async fn name(&self) -> String {
        self.inner.state.read().await.name.clone()
    }

    pub async fn media_type(&self) -> Option<MediaType> {
        self.inner.state.read().await.media_type
    }

    pub async fn is_clips(&self) -> bool {
        self.inner.state.read().await.is_clips
    }

    pub async fn source_name(&self) -> Option<String> {
        self.inner.state.read().await.source_name.clone()
    }

    pub async fn sample_collection_name(&self) -> String {
        self.inner.state.read().await.sample_collection.clone()
    }

    pub async fn frame_collection_name(&self) -> Option<String> {
        self.inner.state.read().await.frame_collection.clone()
    }

    /// The base view over all samples.
    pub fn view(&self) -> DatasetView {
        DatasetView::new(self.clone())
    }

    // =========================================================================
    // Media type
    // =========================================================================

    /// Declare the dataset's media type. Setting video provisions the frame
    /// collection. The type cannot change once set.
    pub async fn set_media_type(&self, media_type: MediaType) -> DatasetResult<()> {
        let mut state = self.inner.state.write().await;

        match state.media_type {
            Some(current) if current == media_type => return Ok(()),
            Some(current) => {
                return Err(DatasetError::validation(format!(
                    "Media type is already {}; cannot change it to {}",
                    current, media_type
                )));
            }
            None => {}
        }

        state.media_type = Some(media_type);

        if media_type == MediaType::Video && state.frame_collection.is_none() {
            let name = format!(
                "{}.{}",
                self.inner.config.frame_collection_prefix,
                Uuid::new_v4().simple()
            );
            self.store().create_collection(&name).await?;
            self.store().create_index(&name, "_sample_id").await?;
            state.frame_collection = Some(name);
            state.frame_fields = default_frame_fields();
        }

        registry::save(self.store(), &state).await
    }

    // =========================================================================
    // Schema
    // =========================================================================

    pub async fn get_field_schema(&self) -> Vec<FieldSpec> {
        self.inner.state.read().await.sample_fields.clone()
    }

    pub async fn get_frame_field_schema(&self) -> Vec<FieldSpec> {
        self.inner.state.read().await.frame_fields.clone()
    }

    /// Look up a declared field. `frames.`-prefixed paths resolve against the
    /// frame schema; dotted paths resolve their leading segment.
    pub async fn get_field(&self, path: &str) -> Option<FieldSpec> {
        let state = self.inner.state.read().await;
        let (fields, path) = match path.strip_prefix(FRAMES_PREFIX) {
            Some(rest) => (&state.frame_fields, rest),
            None => (&state.sample_fields, path),
        };
        let head = path.split('.').next().unwrap_or(path);
        schema::find_field(fields, head).cloned()
    }

    /// Whether a path addresses a frame-level field.
    pub fn is_frame_field(path: &str) -> bool {
        path.starts_with(FRAMES_PREFIX)
    }

    /// Strip the `frames.` prefix, if present.
    pub fn strip_frames_prefix(path: &str) -> &str {
        path.strip_prefix(FRAMES_PREFIX).unwrap_or(path)
    }

    pub async fn add_sample_field(&self, name: &str, kind: FieldKind) -> DatasetResult<()> {
        self.add_sample_field_spec(FieldSpec::new(name, kind)).await
    }

    /// Declare a sample field with an explicit stored name.
    pub async fn add_sample_field_with_db(
        &self,
        name: &str,
        kind: FieldKind,
        db_field: &str,
    ) -> DatasetResult<()> {
        self.add_sample_field_spec(FieldSpec::new(name, kind).with_db_field(db_field))
            .await
    }

    pub async fn add_sample_field_spec(&self, spec: FieldSpec) -> DatasetResult<()> {
        let mut state = self.inner.state.write().await;
        merge_field(&mut state.sample_fields, spec)?;
        registry::save(self.store(), &state).await
    }

    pub async fn add_frame_field(&self, name: &str, kind: FieldKind) -> DatasetResult<()> {
        self.add_frame_field_spec(FieldSpec::new(name, kind)).await
    }

    pub async fn add_frame_field_spec(&self, spec: FieldSpec) -> DatasetResult<()> {
        let mut state = self.inner.state.write().await;
        if state.media_type != Some(MediaType::Video) {
            return Err(DatasetError::MediaType {
                expected: MediaType::Video.to_string(),
                found: media_type_str(state.media_type),
            });
        }
        merge_field(&mut state.frame_fields, spec)?;
        registry::save(self.store(), &state).await
    }

    /// Remove a declared sample field and unset it on every sample.
    pub async fn remove_sample_field(&self, name: &str) -> DatasetResult<()> {
        if PROTECTED_SAMPLE_FIELDS.contains(&name) {
            return Err(DatasetError::validation(format!(
                "Cannot remove default field '{}'",
                name
            )));
        }

        let mut state = self.inner.state.write().await;
        let Some(pos) = state.sample_fields.iter().position(|f| f.name == name) else {
            return Err(DatasetError::field_not_found(name));
        };
        let spec = state.sample_fields.remove(pos);

        self.store()
            .update_many(
                &state.sample_collection,
                Filter::All,
                UpdateOp::unset_one(spec.db_name()),
            )
            .await?;
        registry::save(self.store(), &state).await
    }

    /// Remove a declared frame field and unset it on every frame.
    pub async fn remove_frame_field(&self, name: &str) -> DatasetResult<()> {
        if PROTECTED_FRAME_FIELDS.contains(&name) {
            return Err(DatasetError::validation(format!(
                "Cannot remove default frame field '{}'",
                name
            )));
        }

        let mut state = self.inner.state.write().await;
        let Some(pos) = state.frame_fields.iter().position(|f| f.name == name) else {
            return Err(DatasetError::field_not_found(name));
        };
        let spec = state.frame_fields.remove(pos);

        if let Some(frames) = state.frame_collection.clone() {
            self.store()
                .update_many(&frames, Filter::All, UpdateOp::unset_one(spec.db_name()))
                .await?;
        }
        registry::save(self.store(), &state).await
    }

    /// Reorder declared fields for display.
    pub async fn apply_pretty_field_order(&self) -> DatasetResult<()> {
        let mut state = self.inner.state.write().await;
        schema::pretty_order(&mut state.sample_fields);
        registry::save(self.store(), &state).await
    }

    /// Declare an index on a sample field.
    pub async fn create_index(&self, field: &str) -> DatasetResult<()> {
        let state = self.inner.state.read().await;
        let db = schema::db_path(&state.sample_fields, field);
        self.store()
            .create_index(&state.sample_collection, &db)
            .await?;
        Ok(())
    }

    pub async fn index_names(&self) -> DatasetResult<Vec<String>> {
        let coll = self.sample_collection_name().await;
        Ok(self.store().index_names(&coll).await?)
    }

    /// Map a public sample path to its stored path.
    pub async fn db_sample_path(&self, path: &str) -> String {
        let state = self.inner.state.read().await;
        schema::db_path(&state.sample_fields, path)
    }

    /// Map a public frame path (without prefix) to its stored path.
    pub async fn db_frame_path(&self, path: &str) -> String {
        let state = self.inner.state.read().await;
        schema::db_path(&state.frame_fields, path)
    }

    // =========================================================================
    // Samples
    // =========================================================================

    /// Insert sample documents. Each must carry a `filepath`; missing `_id`,
    /// `_rand`, and `_media_type` values are filled in.
    pub async fn add_samples(&self, docs: Vec<Document>) -> DatasetResult<Vec<SampleId>> {
        let meta = self.meta().await;
        let mut prepared = Vec::with_capacity(docs.len());

        for mut doc in docs {
            if doc.get("filepath").and_then(Value::as_str).is_none() {
                return Err(DatasetError::validation(
                    "Samples must have a string 'filepath'",
                ));
            }
            if doc.id().is_none() {
                doc.set_id(SampleId::new().as_str());
            }
            if !doc.contains("_rand") {
                doc.set("_rand", rand::rng().random::<f64>());
            }
            if !doc.contains("_media_type") {
                if let Some(media_type) = meta.media_type {
                    doc.set("_media_type", media_type.as_str());
                }
            }
            prepared.push(doc);
        }

        let ids = self
            .store()
            .insert_many(&meta.sample_collection, prepared)
            .await?;
        Ok(ids.into_iter().map(SampleId::from).collect())
    }

    /// Add one video sample with its frames. Frame documents must carry a
    /// `frame_number`; ids and back-references are filled in.
    pub async fn add_video_sample(
        &self,
        filepath: &str,
        tags: Vec<String>,
        metadata: Option<VideoMetadata>,
        frames: Vec<Document>,
    ) -> DatasetResult<SampleId> {
        if self.media_type().await.is_none() {
            self.set_media_type(MediaType::Video).await?;
        }
        let meta = self.meta().await;
        if meta.media_type != Some(MediaType::Video) {
            return Err(DatasetError::MediaType {
                expected: MediaType::Video.to_string(),
                found: media_type_str(meta.media_type),
            });
        }

        let sample_id = SampleId::new();

        let mut doc = Document::new();
        doc.set_id(sample_id.as_str());
        doc.set("filepath", filepath);
        doc.set("tags", tags);
        if let Some(metadata) = &metadata {
            doc.set("metadata", Document::from_serialize(metadata)?);
        }
        doc.set("_media_type", MediaType::Video.as_str());
        doc.set("_rand", rand::rng().random::<f64>());

        self.store()
            .insert_many(&meta.sample_collection, vec![doc])
            .await?;

        if !frames.is_empty() {
            let Some(frame_coll) = &meta.frame_collection else {
                return Err(DatasetError::validation(
                    "Dataset has no frame collection",
                ));
            };

            let mut prepared = Vec::with_capacity(frames.len());
            for mut frame in frames {
                if frame.get("frame_number").and_then(Value::as_int).is_none() {
                    return Err(DatasetError::validation(
                        "Frames must have an integer 'frame_number'",
                    ));
                }
                if frame.id().is_none() {
                    frame.set_id(Uuid::new_v4().simple().to_string());
                }
                frame.set("_sample_id", sample_id.as_str());
                prepared.push(frame);
            }
            self.store().insert_many(frame_coll, prepared).await?;
        }

        Ok(sample_id)
    }

    pub async fn count(&self) -> DatasetResult<u64> {
        let coll = self.sample_collection_name().await;
        Ok(self.store().count(&coll, Filter::All).await?)
    }

    /// All sample documents, in insertion order.
    pub async fn samples(&self) -> DatasetResult<Vec<Document>> {
        let coll = self.sample_collection_name().await;
        Ok(self.store().find(&coll, Filter::All).await?)
    }

    /// Extract one value per sample for each path, in insertion order.
    pub async fn values(&self, paths: &[&str]) -> DatasetResult<Vec<Vec<Value>>> {
        self.view().values(paths).await
    }

    /// Write one value per sample at `path`, positionally aligned with
    /// insertion order.
    pub async fn set_values(&self, path: &str, values: Vec<Value>) -> DatasetResult<()> {
        self.view().set_values(path, values).await
    }

    /// Frame documents grouped by sample id, ordered by frame number. Pass
    /// `None` to load frames for every sample.
    pub async fn load_frames(
        &self,
        sample_ids: Option<&[String]>,
    ) -> DatasetResult<HashMap<String, Vec<Document>>> {
        let meta = self.meta().await;
        let Some(frame_coll) = &meta.frame_collection else {
            return Ok(HashMap::new());
        };

        let filter = match sample_ids {
            Some(ids) => Filter::in_values("_sample_id", ids),
            None => Filter::All,
        };
        let docs = self.store().find(frame_coll, filter).await?;

        let mut grouped: HashMap<String, Vec<Document>> = HashMap::new();
        for doc in docs {
            let Some(sample_id) = doc.get("_sample_id").and_then(Value::as_str) else {
                continue;
            };
            grouped.entry(sample_id.to_string()).or_default().push(doc);
        }

        let null = Value::Null;
        for frames in grouped.values_mut() {
            frames.sort_by(|a, b| {
                compare_values(
                    a.get("frame_number").unwrap_or(&null),
                    b.get("frame_number").unwrap_or(&null),
                )
            });
        }

        Ok(grouped)
    }
}

fn media_type_str(media_type: Option<MediaType>) -> String {
    match media_type {
        Some(m) => m.to_string(),
        None => "unset".to_string(),
    }
}

fn merge_field(fields: &mut Vec<FieldSpec>, spec: FieldSpec) -> DatasetResult<()> {
    match fields.iter().find(|f| f.name == spec.name) {
        Some(existing) if existing.kind == spec.kind => Ok(()),
        Some(existing) => Err(DatasetError::validation(format!(
            "Field '{}' already declared as {}; cannot redeclare as {}",
            spec.name, existing.kind, spec.kind
        ))),
        None => {
            fields.push(spec);
            Ok(())
        }
    }
}
