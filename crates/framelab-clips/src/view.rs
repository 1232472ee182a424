//! Views over materialized clips.
//!
//! A [`ClipsView`] pairs a clips dataset with the source view it was cut
//! from. Reads go straight to the clips; writes additionally push
//! classification edits back to the source through [`SourceSync`]. Views are
//! immutable values: every stage builder returns a new view layered on the
//! same datasets.

use framelab_dataset::{Dataset, DatasetView, FieldSpec, ViewStage};
use framelab_models::{Classification, FrameSupport, LabelDoc, LabelId};
use framelab_store::{Document, Filter, Value};

use crate::error::{ClipsError, ClipsResult};
use crate::factory::make_clips_dataset;
use crate::strategy::ClipsStage;
use crate::sync::{temporal_detection_field, SourceSync};

/// A view into a clips dataset, synchronized with its source collection.
#[derive(Debug, Clone)]
pub struct ClipsView {
    source: DatasetView,
    stage: ClipsStage,
    inner: DatasetView,
    classification_field: Option<String>,
}

impl ClipsView {
    /// Materialize a clips dataset from `source` and wrap it.
    pub async fn create(source: &DatasetView, stage: ClipsStage) -> ClipsResult<Self> {
        let clips = make_clips_dataset(source, &stage, None).await?;
        let classification_field = temporal_detection_field(source, &stage).await;
        Ok(Self {
            source: source.clone(),
            stage,
            inner: clips.view(),
            classification_field,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The underlying clips dataset.
    pub fn dataset(&self) -> &Dataset {
        self.inner.dataset()
    }

    /// The source view the clips were cut from.
    pub fn source(&self) -> &DatasetView {
        &self.source
    }

    /// The extraction request that produced the clips.
    pub fn stage(&self) -> &ClipsStage {
        &self.stage
    }

    pub fn stages(&self) -> &[ViewStage] {
        self.inner.stages()
    }

    pub fn has_stages(&self) -> bool {
        self.inner.has_stages()
    }

    /// The source field mirrored on save, when clips were cut from temporal
    /// detections.
    pub fn classification_field(&self) -> Option<&str> {
        self.classification_field.as_deref()
    }

    pub async fn name(&self) -> String {
        self.inner.dataset().name().await
    }

    fn sync_engine(&self) -> SourceSync {
        SourceSync::new(
            self.source.clone(),
            self.inner.dataset().clone(),
            self.classification_field.clone(),
        )
    }

    // =========================================================================
    // Stages
    // =========================================================================

    fn layered(&self, inner: DatasetView) -> Self {
        Self {
            source: self.source.clone(),
            stage: self.stage.clone(),
            inner,
            classification_field: self.classification_field.clone(),
        }
    }

    pub fn with_stage(&self, stage: ViewStage) -> Self {
        self.layered(self.inner.with_stage(stage))
    }

    pub fn select_ids<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        self.layered(self.inner.select_ids(ids))
    }

    pub fn exclude_ids<S: AsRef<str>>(&self, ids: &[S]) -> Self {
        self.layered(self.inner.exclude_ids(ids))
    }

    pub fn match_filter(&self, filter: Filter) -> Self {
        self.layered(self.inner.match_filter(filter))
    }

    pub fn select_fields<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        self.layered(self.inner.select_fields(fields))
    }

    pub fn exclude_fields<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        self.layered(self.inner.exclude_fields(fields))
    }

    pub fn sort_by(&self, path: &str, ascending: bool) -> Self {
        self.layered(self.inner.sort_by(path, ascending))
    }

    pub fn shuffle(&self) -> Self {
        self.layered(self.inner.shuffle())
    }

    pub fn limit(&self, n: usize) -> Self {
        self.layered(self.inner.limit(n))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn count(&self) -> ClipsResult<u64> {
        Ok(self.inner.count().await?)
    }

    pub async fn ids(&self) -> ClipsResult<Vec<String>> {
        Ok(self.inner.ids().await?)
    }

    pub async fn docs(&self) -> ClipsResult<Vec<Document>> {
        Ok(self.inner.docs().await?)
    }

    pub async fn values(&self, paths: &[&str]) -> ClipsResult<Vec<Vec<Value>>> {
        Ok(self.inner.values(paths).await?)
    }

    pub async fn get_field_schema(&self) -> Vec<FieldSpec> {
        self.inner.get_field_schema().await
    }

    pub async fn get_frame_field_schema(&self) -> Vec<FieldSpec> {
        self.inner.get_frame_field_schema().await
    }

    /// The clips in this view, in view order.
    pub async fn clips(&self) -> ClipsResult<Vec<ClipView>> {
        let docs = self.inner.docs().await?;
        Ok(docs
            .into_iter()
            .map(|doc| ClipView::new(doc, self.clone()))
            .collect())
    }

    /// A single clip by id, if it is in this view.
    pub async fn clip(&self, id: &str) -> ClipsResult<Option<ClipView>> {
        let doc = self.select_ids(&[id]).inner.first().await?;
        Ok(doc.map(|doc| ClipView::new(doc, self.clone())))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set a field across the clips in this view, then mirror the change to
    /// the source when it touches the classification field.
    pub async fn set_values(&self, path: &str, values: Vec<Value>) -> ClipsResult<()> {
        let ids = if self.inner.has_stages() {
            Some(self.inner.ids().await?)
        } else {
            None
        };
        self.inner.set_values(path, values).await?;

        let root = path.split('.').next().unwrap_or(path);
        self.sync_engine()
            .sync(&self.inner, Some(&[root]), ids.as_deref(), true, false)
            .await
    }

    /// Persist the view's documents (or just `fields`), mirroring
    /// classification edits onto the source first.
    pub async fn save(&self, fields: Option<&[&str]>) -> ClipsResult<()> {
        self.sync_engine()
            .sync(&self.inner, fields, None, true, false)
            .await?;
        self.inner.save(fields).await?;
        Ok(())
    }

    /// Delete every clip not in this view. Source detections whose clip was
    /// deleted are deleted too.
    pub async fn keep(&self) -> ClipsResult<()> {
        self.sync_engine()
            .sync(&self.inner, None, None, false, true)
            .await?;
        self.inner.keep().await?;
        Ok(())
    }

    /// Delete every field this view excludes, from the clips and from the
    /// source.
    pub async fn keep_fields(&self) -> ClipsResult<()> {
        self.sync_engine().sync_keep_fields(&self.inner).await?;
        self.inner.keep_fields().await?;
        Ok(())
    }

    /// Regenerate the clips dataset from the current source contents. The
    /// returned view carries the same stages as this one.
    pub async fn reload(&self) -> ClipsResult<ClipsView> {
        self.source.dataset().reload().await?;

        let name = self.inner.dataset().name().await;
        let stages = self.inner.stages().to_vec();
        self.inner.dataset().delete().await?;

        let clips = make_clips_dataset(&self.source, &self.stage, Some(&name)).await?;
        let mut inner = clips.view();
        for stage in stages {
            inner = inner.with_stage(stage);
        }

        Ok(Self {
            source: self.source.clone(),
            stage: self.stage.clone(),
            inner,
            classification_field: self.classification_field.clone(),
        })
    }
}

// =============================================================================
// ClipView
// =============================================================================

/// One materialized clip, editable in memory and saved explicitly.
#[derive(Debug, Clone)]
pub struct ClipView {
    doc: Document,
    view: ClipsView,
}

impl ClipView {
    fn new(doc: Document, view: ClipsView) -> Self {
        Self { doc, view }
    }

    pub fn id(&self) -> Option<&str> {
        self.doc.id()
    }

    /// Id of the source video sample this clip was cut from.
    pub fn sample_id(&self) -> Option<&str> {
        self.doc.get("_sample_id").and_then(Value::as_str)
    }

    pub fn filepath(&self) -> Option<&str> {
        self.doc.get("filepath").and_then(Value::as_str)
    }

    pub fn support(&self) -> Option<FrameSupport> {
        let value = self.doc.get("support")?;
        serde_json::from_value(value.to_json()).ok()
    }

    /// The raw clip document.
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn set_support(&mut self, support: FrameSupport) {
        self.doc.set("support", support);
    }

    /// The clip's classification, when the view mirrors temporal detections.
    pub fn classification(&self) -> Option<Classification> {
        let field = self.view.classification_field.as_deref()?;
        let Some(Value::Map(label)) = self.doc.get(field) else {
            return None;
        };
        Classification::from_doc(&Document::from_fields(label.clone()))
    }

    /// Replace or clear the clip's classification. The label takes the
    /// clip's id, which is what ties it to its source detection.
    pub fn set_classification(
        &mut self,
        classification: Option<&Classification>,
    ) -> ClipsResult<()> {
        let Some(field) = self.view.classification_field.clone() else {
            return Err(ClipsError::validation(
                "This clips view was not created from temporal detections",
            ));
        };

        match classification {
            Some(classification) => {
                let mut label = classification.clone();
                if let Some(id) = self.doc.id() {
                    label.id = LabelId::from_string(id);
                }
                self.doc.set(field, label.to_doc()?);
            }
            None => {
                self.doc.set(field, Value::Null);
            }
        }
        Ok(())
    }

    /// Write this clip back to the clips dataset and mirror the edit onto
    /// the source.
    pub async fn save(&self) -> ClipsResult<()> {
        let Some(id) = self.doc.id() else {
            return Err(ClipsError::validation("Clip document has no id"));
        };

        let collection = self.view.dataset().sample_collection_name().await;
        self.view
            .dataset()
            .store()
            .replace_one(&collection, Filter::eq("_id", id), self.doc.clone())
            .await?;

        self.view.sync_engine().sync_sample(&self.doc).await
    }
}
