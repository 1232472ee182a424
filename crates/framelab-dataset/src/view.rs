//! Immutable dataset views.
//!
//! A [`DatasetView`] pairs a dataset handle with an ordered stage list. Views
//! are values: adding a stage returns a new view and never mutates the
//! original. Reads compile the stages into a store pipeline; writes
//! (`save`, `keep`, `keep_fields`, `set_values`) resolve the view first and
//! then mutate the underlying collections.

use std::collections::HashSet;

use framelab_store::{Document, Filter, ProjectSpec, Stage, UpdateOp, Value};

use crate::dataset::{Dataset, FRAMES_PREFIX};
use crate::error::{DatasetError, DatasetResult};
use crate::schema::{self, FieldSpec};

/// Sample fields every view carries regardless of field selection.
const ALWAYS_SAMPLE_FIELDS: [&str; 6] =
    ["id", "filepath", "tags", "metadata", "sample_id", "support"];

/// Frame fields every view carries regardless of field selection.
const ALWAYS_FRAME_FIELDS: [&str; 3] = ["id", "frame_number", "sample_id"];

/// Internal document fields carried through every projection.
const INTERNAL_DB_FIELDS: [&str; 2] = ["_media_type", "_rand"];

/// One view stage.
#[derive(Debug, Clone)]
pub enum ViewStage {
    SelectIds(Vec<String>),
    ExcludeIds(Vec<String>),
    /// Filter on stored document paths.
    Match(Filter),
    /// Restrict to the named fields (plus always-carried fields).
    /// `frames.`-prefixed entries restrict the frame schema.
    SelectFields(Vec<String>),
    /// Drop the named fields. `frames.`-prefixed entries drop frame fields
    /// from the view's frame schema.
    ExcludeFields(Vec<String>),
    SortBy { path: String, ascending: bool },
    /// Reorder by the materialized `_rand` key.
    Shuffle,
    Limit(usize),
}

/// An ordered, filtered look at a dataset's samples.
#[derive(Debug, Clone)]
pub struct DatasetView {
    dataset: Dataset,
    stages: Vec<ViewStage>,
}

impl DatasetView {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            stages: Vec::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn stages(&self) -> &[ViewStage] {
        &self.stages
    }

    pub fn has_stages(&self) -> bool {
        !self.stages.is_empty()
    }

    /// Return a new view with one more stage.
    pub fn with_stage(&self, stage: ViewStage) -> Self {
        let mut stages = self.stages.clone();
        stages.push(stage);
        Self {
            dataset: self.dataset.clone(),
            stages,
        }
    }

    pub fn select_ids<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        self.with_stage(ViewStage::SelectIds(
            ids.iter().map(|s| s.as_ref().to_string()).collect(),
        ))
    }

    pub fn exclude_ids<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        self.with_stage(ViewStage::ExcludeIds(
            ids.iter().map(|s| s.as_ref().to_string()).collect(),
        ))
    }

    pub fn match_filter(&self, filter: Filter) -> Self {
        self.with_stage(ViewStage::Match(filter))
    }

    pub fn select_fields<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        self.with_stage(ViewStage::SelectFields(
            fields.iter().map(|s| s.as_ref().to_string()).collect(),
        ))
    }

    pub fn exclude_fields<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        self.with_stage(ViewStage::ExcludeFields(
            fields.iter().map(|s| s.as_ref().to_string()).collect(),
        ))
    }

    pub fn sort_by(&self, path: &str, ascending: bool) -> Self {
        self.with_stage(ViewStage::SortBy {
            path: path.to_string(),
            ascending,
        })
    }

    pub fn shuffle(&self) -> Self {
        self.with_stage(ViewStage::Shuffle)
    }

    pub fn limit(&self, n: usize) -> Self {
        self.with_stage(ViewStage::Limit(n))
    }

    // =========================================================================
    // Pipeline compilation
    // =========================================================================

    /// Compile the view's stages into a store pipeline.
    pub async fn to_pipeline(&self) -> Vec<Stage> {
        self.to_pipeline_with(&[]).await
    }

    /// Compile with extra stored fields carried through any field selection.
    pub async fn to_pipeline_with(&self, always_selected: &[&str]) -> Vec<Stage> {
        let sample_fields = self.dataset.get_field_schema().await;
        let mut pipeline = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            match stage {
                ViewStage::SelectIds(ids) => {
                    pipeline.push(Stage::Match(Filter::in_values("_id", ids)));
                }
                ViewStage::ExcludeIds(ids) => {
                    pipeline.push(Stage::Match(Filter::not_in_values("_id", ids)));
                }
                ViewStage::Match(filter) => {
                    pipeline.push(Stage::Match(filter.clone()));
                }
                ViewStage::SelectFields(fields) => {
                    let mut spec = ProjectSpec::new();
                    let mut seen = HashSet::new();

                    for name in ALWAYS_SAMPLE_FIELDS {
                        if let Some(field) = schema::find_field(&sample_fields, name) {
                            if seen.insert(field.db_name().to_string()) {
                                spec = spec.include(field.db_name());
                            }
                        }
                    }
                    for db in INTERNAL_DB_FIELDS {
                        if seen.insert(db.to_string()) {
                            spec = spec.include(db);
                        }
                    }
                    for db in always_selected {
                        if seen.insert(db.to_string()) {
                            spec = spec.include(*db);
                        }
                    }
                    for name in fields {
                        if name.starts_with(FRAMES_PREFIX) {
                            continue;
                        }
                        let db = schema::db_path(&sample_fields, name);
                        if seen.insert(db.clone()) {
                            spec = spec.include(db);
                        }
                    }

                    pipeline.push(Stage::Project(spec));
                }
                ViewStage::ExcludeFields(fields) => {
                    let paths: Vec<String> = fields
                        .iter()
                        .filter(|name| !name.starts_with(FRAMES_PREFIX))
                        .map(|name| schema::db_path(&sample_fields, name))
                        .collect();
                    if !paths.is_empty() {
                        pipeline.push(Stage::Unset(paths));
                    }
                }
                ViewStage::SortBy { path, ascending } => {
                    pipeline.push(Stage::Sort {
                        path: schema::db_path(&sample_fields, path),
                        ascending: *ascending,
                    });
                }
                ViewStage::Shuffle => {
                    pipeline.push(Stage::Sort {
                        path: "_rand".to_string(),
                        ascending: true,
                    });
                }
                ViewStage::Limit(n) => {
                    pipeline.push(Stage::Limit(*n));
                }
            }
        }

        pipeline
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The view's sample documents, in view order.
    pub async fn docs(&self) -> DatasetResult<Vec<Document>> {
        let coll = self.dataset.sample_collection_name().await;
        if self.stages.is_empty() {
            return Ok(self.dataset.store().find(&coll, Filter::All).await?);
        }
        let pipeline = self.to_pipeline().await;
        Ok(self.dataset.store().aggregate(&coll, pipeline).await?)
    }

    pub async fn count(&self) -> DatasetResult<u64> {
        Ok(self.docs().await?.len() as u64)
    }

    pub async fn first(&self) -> DatasetResult<Option<Document>> {
        Ok(self.docs().await?.into_iter().next())
    }

    /// The view's sample ids, in view order.
    pub async fn ids(&self) -> DatasetResult<Vec<String>> {
        Ok(self
            .docs()
            .await?
            .iter()
            .filter_map(|d| d.id().map(String::from))
            .collect())
    }

    /// Extract one value per sample for each path, in view order.
    ///
    /// `frames.`-prefixed paths produce one array per sample holding the
    /// per-frame values ordered by frame number. Missing values are null.
    pub async fn values(&self, paths: &[&str]) -> DatasetResult<Vec<Vec<Value>>> {
        let docs = self.docs().await?;

        let needs_frames = paths.iter().any(|p| p.starts_with(FRAMES_PREFIX));
        let frames = if needs_frames {
            let ids: Vec<String> = docs.iter().filter_map(|d| d.id().map(String::from)).collect();
            self.dataset.load_frames(Some(&ids)).await?
        } else {
            Default::default()
        };

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let mut column = Vec::with_capacity(docs.len());

            if let Some(frame_path) = path.strip_prefix(FRAMES_PREFIX) {
                let db = self.dataset.db_frame_path(frame_path).await;
                for doc in &docs {
                    let sample_frames = doc
                        .id()
                        .and_then(|id| frames.get(id))
                        .map(|f| f.as_slice())
                        .unwrap_or(&[]);
                    let per_frame: Vec<Value> = sample_frames
                        .iter()
                        .map(|f| f.get_path(&db).cloned().unwrap_or(Value::Null))
                        .collect();
                    column.push(Value::Array(per_frame));
                }
            } else {
                let db = self.dataset.db_sample_path(path).await;
                for doc in &docs {
                    column.push(doc.get_path(&db).cloned().unwrap_or(Value::Null));
                }
            }

            results.push(column);
        }

        Ok(results)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write one value per sample at `path`, positionally aligned with the
    /// view's current order. Values for `frames.`-prefixed paths must be
    /// arrays aligned with each sample's frames.
    ///
    /// Undeclared paths are written as-is; temporary fields never enter the
    /// schema.
    pub async fn set_values(&self, path: &str, values: Vec<Value>) -> DatasetResult<()> {
        let ids = self.ids().await?;
        if ids.len() != values.len() {
            return Err(DatasetError::validation(format!(
                "Expected {} values for '{}'; got {}",
                ids.len(),
                path,
                values.len()
            )));
        }

        if let Some(frame_path) = path.strip_prefix(FRAMES_PREFIX) {
            return self.set_frame_values(frame_path, &ids, values).await;
        }

        let coll = self.dataset.sample_collection_name().await;
        let db = self.dataset.db_sample_path(path).await;
        for (id, value) in ids.iter().zip(values) {
            self.dataset
                .store()
                .update_many(
                    &coll,
                    Filter::eq("_id", id.as_str()),
                    UpdateOp::set_one(&db, value),
                )
                .await?;
        }
        Ok(())
    }

    async fn set_frame_values(
        &self,
        frame_path: &str,
        ids: &[String],
        values: Vec<Value>,
    ) -> DatasetResult<()> {
        let meta = self.dataset.meta().await;
        let Some(frame_coll) = &meta.frame_collection else {
            return Err(DatasetError::validation("Dataset has no frame collection"));
        };

        let frames = self.dataset.load_frames(Some(ids)).await?;
        let db = self.dataset.db_frame_path(frame_path).await;

        for (id, value) in ids.iter().zip(values) {
            let Value::Array(per_frame) = value else {
                return Err(DatasetError::validation(format!(
                    "Frame values for 'frames.{}' must be arrays",
                    frame_path
                )));
            };
            let sample_frames = frames.get(id).map(|f| f.as_slice()).unwrap_or(&[]);
            if sample_frames.len() != per_frame.len() {
                return Err(DatasetError::validation(format!(
                    "Sample '{}' has {} frames; got {} values",
                    id,
                    sample_frames.len(),
                    per_frame.len()
                )));
            }

            for (frame_doc, frame_value) in sample_frames.iter().zip(per_frame) {
                let Some(frame_id) = frame_doc.id() else {
                    continue;
                };
                self.dataset
                    .store()
                    .update_many(
                        frame_coll,
                        Filter::eq("_id", frame_id),
                        UpdateOp::set_one(&db, frame_value),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Write the view's documents back to the dataset.
    ///
    /// With `fields`, only those fields are overwritten. Without, each
    /// document is replaced wholesale, which permanently drops content the
    /// view has filtered out.
    pub async fn save(&self, fields: Option<&[&str]>) -> DatasetResult<()> {
        let coll = self.dataset.sample_collection_name().await;
        let sample_fields = self.dataset.get_field_schema().await;
        let docs = self.docs().await?;

        for doc in docs {
            let Some(id) = doc.id().map(String::from) else {
                continue;
            };

            match fields {
                None => {
                    self.dataset
                        .store()
                        .replace_one(&coll, Filter::eq("_id", id.as_str()), doc)
                        .await?;
                }
                Some(fields) => {
                    for field in fields {
                        let db = schema::db_path(&sample_fields, field);
                        let op = match doc.get_path(&db) {
                            Some(value) => UpdateOp::set_one(&db, value.clone()),
                            None => UpdateOp::unset_one(&db),
                        };
                        self.dataset
                            .store()
                            .update_many(&coll, Filter::eq("_id", id.as_str()), op)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete every sample not present in this view. For owned frame
    /// collections, the deleted samples' frames go too; shared (clips) frame
    /// collections are left alone.
    pub async fn keep(&self) -> DatasetResult<()> {
        let ids = self.ids().await?;
        let meta = self.dataset.meta().await;

        self.dataset
            .store()
            .delete_many(&meta.sample_collection, Filter::not_in_values("_id", &ids))
            .await?;

        if !meta.is_clips {
            if let Some(frame_coll) = &meta.frame_collection {
                self.dataset
                    .store()
                    .delete_many(frame_coll, Filter::not_in_values("_sample_id", &ids))
                    .await?;
            }
        }
        Ok(())
    }

    /// Delete fields the view has excluded from the dataset's schema and
    /// documents.
    pub async fn keep_fields(&self) -> DatasetResult<()> {
        let kept: HashSet<String> = self
            .get_field_schema()
            .await
            .into_iter()
            .map(|f| f.name)
            .collect();
        for field in self.dataset.get_field_schema().await {
            if !kept.contains(&field.name) {
                self.dataset.remove_sample_field(&field.name).await?;
            }
        }

        let kept_frames: HashSet<String> = self
            .get_frame_field_schema()
            .await
            .into_iter()
            .map(|f| f.name)
            .collect();
        for field in self.dataset.get_frame_field_schema().await {
            if !kept_frames.contains(&field.name) {
                self.dataset.remove_frame_field(&field.name).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// The sample schema as narrowed by this view's field stages.
    pub async fn get_field_schema(&self) -> Vec<FieldSpec> {
        let mut fields = self.dataset.get_field_schema().await;

        for stage in &self.stages {
            match stage {
                ViewStage::SelectFields(selected) => {
                    let names: HashSet<&str> = selected
                        .iter()
                        .filter(|n| !n.starts_with(FRAMES_PREFIX))
                        .map(|n| n.as_str())
                        .collect();
                    fields.retain(|f| {
                        ALWAYS_SAMPLE_FIELDS.contains(&f.name.as_str())
                            || names.contains(f.name.as_str())
                    });
                }
                ViewStage::ExcludeFields(excluded) => {
                    let names: HashSet<&str> = excluded
                        .iter()
                        .filter(|n| !n.starts_with(FRAMES_PREFIX))
                        .map(|n| n.as_str())
                        .collect();
                    fields.retain(|f| !names.contains(f.name.as_str()));
                }
                _ => {}
            }
        }

        fields
    }

    /// The frame schema as narrowed by this view's field stages.
    pub async fn get_frame_field_schema(&self) -> Vec<FieldSpec> {
        let mut fields = self.dataset.get_frame_field_schema().await;

        for stage in &self.stages {
            match stage {
                ViewStage::SelectFields(selected) => {
                    let names: HashSet<&str> = selected
                        .iter()
                        .filter_map(|n| n.strip_prefix(FRAMES_PREFIX))
                        .collect();
                    if names.is_empty() {
                        continue;
                    }
                    fields.retain(|f| {
                        ALWAYS_FRAME_FIELDS.contains(&f.name.as_str())
                            || names.contains(f.name.as_str())
                    });
                }
                ViewStage::ExcludeFields(excluded) => {
                    let names: HashSet<&str> = excluded
                        .iter()
                        .filter_map(|n| n.strip_prefix(FRAMES_PREFIX))
                        .collect();
                    fields.retain(|f| !names.contains(f.name.as_str()));
                }
                _ => {}
            }
        }

        fields
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use framelab_models::{LabelKind, MediaType};
    use framelab_store::MemoryStore;

    use super::*;
    use crate::config::DatasetConfig;
    use crate::dataset::StoreHandle;
    use crate::schema::FieldKind;

    async fn dataset_with_samples(n: usize) -> Dataset {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let dataset = Dataset::create(store, "view-test", DatasetConfig::default())
            .await
            .unwrap();
        dataset.set_media_type(MediaType::Video).await.unwrap();

        for i in 0..n {
            dataset
                .add_video_sample(&format!("/videos/{}.mp4", i), vec![], None, vec![])
                .await
                .unwrap();
        }
        dataset
    }

    #[tokio::test]
    async fn test_views_are_immutable_values() {
        let dataset = dataset_with_samples(3).await;
        let base = dataset.view();
        let limited = base.limit(1);

        assert!(!base.has_stages());
        assert!(limited.has_stages());
        assert_eq!(base.count().await.unwrap(), 3);
        assert_eq!(limited.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_select_and_exclude_ids() {
        let dataset = dataset_with_samples(3).await;
        let ids = dataset.view().ids().await.unwrap();

        let selected = dataset.view().select_ids(&ids[..2]);
        assert_eq!(selected.ids().await.unwrap(), ids[..2].to_vec());

        let excluded = dataset.view().exclude_ids(&ids[..2]);
        assert_eq!(excluded.ids().await.unwrap(), ids[2..].to_vec());
    }

    #[tokio::test]
    async fn test_values_and_set_values_align() {
        let dataset = dataset_with_samples(3).await;
        let view = dataset.view();

        view.set_values(
            "rating",
            vec![Value::Int(3), Value::Int(1), Value::Int(2)],
        )
        .await
        .unwrap();

        let columns = view.values(&["rating", "filepath"]).await.unwrap();
        assert_eq!(columns[0], vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(columns.len(), 2);

        // undeclared writes stay out of the schema
        assert!(schema::find_field(&dataset.get_field_schema().await, "rating").is_none());

        let sorted = view.sort_by("rating", true);
        let ratings = sorted.values(&["rating"]).await.unwrap();
        assert_eq!(
            ratings[0],
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[tokio::test]
    async fn test_set_values_length_mismatch() {
        let dataset = dataset_with_samples(2).await;
        let err = dataset
            .view()
            .set_values("rating", vec![Value::Int(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Validation(_)));
    }

    #[tokio::test]
    async fn test_frame_values_round_trip() {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let dataset = Dataset::create(store, "frames-test", DatasetConfig::default())
            .await
            .unwrap();
        dataset.set_media_type(MediaType::Video).await.unwrap();

        let mut f1 = Document::new();
        f1.set("frame_number", 1i64);
        let mut f2 = Document::new();
        f2.set("frame_number", 2i64);
        dataset
            .add_video_sample("/videos/a.mp4", vec![], None, vec![f1, f2])
            .await
            .unwrap();

        let view = dataset.view();
        let numbers = view.values(&["frames.frame_number"]).await.unwrap();
        assert_eq!(
            numbers[0],
            vec![Value::Array(vec![Value::Int(1), Value::Int(2)])]
        );

        view.set_values(
            "frames.flagged",
            vec![Value::Array(vec![Value::Bool(true), Value::Bool(false)])],
        )
        .await
        .unwrap();

        let flagged = view.values(&["frames.flagged"]).await.unwrap();
        assert_eq!(
            flagged[0],
            vec![Value::Array(vec![Value::Bool(true), Value::Bool(false)])]
        );
    }

    #[tokio::test]
    async fn test_keep_deletes_unseen_samples() {
        let dataset = dataset_with_samples(3).await;
        let ids = dataset.view().ids().await.unwrap();

        dataset.view().select_ids(&ids[..1]).keep().await.unwrap();
        assert_eq!(dataset.count().await.unwrap(), 1);
        assert_eq!(dataset.view().ids().await.unwrap(), ids[..1].to_vec());
    }

    #[tokio::test]
    async fn test_keep_fields_removes_excluded() {
        let dataset = dataset_with_samples(1).await;
        dataset
            .add_sample_field("events", FieldKind::Embedded(LabelKind::Classification))
            .await
            .unwrap();

        let view = dataset.view().exclude_fields(&["events"]);
        assert!(schema::find_field(&view.get_field_schema().await, "events").is_none());

        view.keep_fields().await.unwrap();
        assert!(schema::find_field(&dataset.get_field_schema().await, "events").is_none());
    }

    #[tokio::test]
    async fn test_select_fields_carries_defaults() {
        let dataset = dataset_with_samples(1).await;
        dataset.add_sample_field("extra", FieldKind::Str).await.unwrap();
        dataset.view().set_values("extra", vec![Value::Str("x".into())]).await.unwrap();

        let view = dataset.view().select_fields(&["extra"]);
        let docs = view.docs().await.unwrap();
        assert!(docs[0].contains("filepath"));
        assert!(docs[0].contains("extra"));
        assert!(docs[0].contains("_rand"));

        let narrowed = dataset.view().select_fields::<&str>(&[]);
        let docs = narrowed.docs().await.unwrap();
        assert!(docs[0].contains("filepath"));
        assert!(!docs[0].contains("extra"));
    }

    #[tokio::test]
    async fn test_shuffle_orders_by_rand() {
        let dataset = dataset_with_samples(5).await;
        let shuffled = dataset.view().shuffle();

        let rands = shuffled.values(&["_rand"]).await.unwrap();
        let doubles: Vec<f64> = rands[0]
            .iter()
            .filter_map(Value::as_double)
            .collect();
        assert_eq!(doubles.len(), 5);
        assert!(doubles.windows(2).all(|w| w[0] <= w[1]));

        // materialized key makes the shuffle reproducible
        assert_eq!(
            shuffled.ids().await.unwrap(),
            dataset.view().shuffle().ids().await.unwrap()
        );
    }
}
