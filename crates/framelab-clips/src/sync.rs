//! Source synchronization for clip edits.
//!
//! Clips cut from temporal detections stay bidirectionally linked to the
//! source collection: each clip shares its id with the detection it was cut
//! from, and carries the detection as a classification. Saving clip edits
//! pushes label and support changes back onto the matching detections;
//! deleting clips deletes the detections.
//!
//! Views over any other strategy have no classification field, and every
//! operation here is a no-op for them.

use std::collections::{BTreeMap, HashSet};

use framelab_dataset::{schema, validation, Dataset, DatasetView, FRAMES_PREFIX};
use framelab_models::labels::CLS_KEY;
use framelab_models::LabelKind;
use framelab_store::{Document, Value};
use tracing::debug;

use crate::error::ClipsResult;
use crate::strategy::{ClipsBy, ClipsStage, TEMPORAL_DETECTION_KINDS};

/// The source label field a clips view mirrors, if its stage cut clips from
/// a temporal detection field.
pub(crate) async fn temporal_detection_field(
    source: &DatasetView,
    stage: &ClipsStage,
) -> Option<String> {
    let ClipsBy::Field(name) = &stage.by else {
        return None;
    };
    validation::validate_label_field(source.dataset(), name, &TEMPORAL_DETECTION_KINDS)
        .await
        .ok()
        .map(|_| name.clone())
}

/// Pushes clip edits back to the source collection.
#[derive(Debug, Clone)]
pub struct SourceSync {
    source: DatasetView,
    clips: Dataset,
    classification_field: Option<String>,
}

impl SourceSync {
    pub fn new(
        source: DatasetView,
        clips: Dataset,
        classification_field: Option<String>,
    ) -> Self {
        Self {
            source,
            clips,
            classification_field,
        }
    }

    /// Mirror one clip document onto its source detection. A present
    /// classification updates the detection in place; a cleared one deletes
    /// nothing: a singular field is emptied, a list keeps its entries.
    pub async fn sync_sample(&self, clip: &Document) -> ClipsResult<()> {
        let Some(field) = &self.classification_field else {
            return Ok(());
        };
        let Some(sample_id) = clip.get("_sample_id").and_then(Value::as_str) else {
            return Ok(());
        };

        let payload = match clip.get(field.as_str()) {
            Some(Value::Map(label)) if !label.is_empty() => {
                Some(detection_doc(label.clone(), clip.get("support").cloned()))
            }
            _ => None,
        };

        self.source
            .set_labels(field, &[sample_id.to_string()], vec![payload])
            .await?;
        Ok(())
    }

    /// Mirror the clips in `view` onto the source collection.
    ///
    /// `fields`, when given, gates the whole operation: nothing happens
    /// unless the classification field is named. `ids` narrows the clips
    /// considered, overriding the view's own stages. With `update`, present
    /// classifications overwrite their detections; clips whose
    /// classification was cleared always mark their detection for deletion.
    /// With `delete`, detections whose clip no longer appears are deleted
    /// too.
    pub async fn sync(
        &self,
        view: &DatasetView,
        fields: Option<&[&str]>,
        ids: Option<&[String]>,
        update: bool,
        delete: bool,
    ) -> ClipsResult<()> {
        let Some(field) = self.classification_field.clone() else {
            return Ok(());
        };
        if let Some(fields) = fields {
            if !fields.iter().any(|f| *f == field.as_str()) {
                return Ok(());
            }
        }

        let sync_view = match ids {
            Some(ids) => self.clips.view().select_ids(ids),
            None => view.clone(),
        };

        let columns = sync_view
            .values(&["id", "sample_id", "support", field.as_str()])
            .await?;

        let mut update_ids: Vec<String> = Vec::new();
        let mut update_docs: Vec<Option<Document>> = Vec::new();
        let mut delete_ids: HashSet<String> = HashSet::new();

        for i in 0..columns[0].len() {
            match &columns[3][i] {
                Value::Map(label) if !label.is_empty() => {
                    let Some(sample_id) = columns[1][i].as_str() else {
                        continue;
                    };
                    update_ids.push(sample_id.to_string());
                    update_docs.push(Some(detection_doc(
                        label.clone(),
                        Some(columns[2][i].clone()),
                    )));
                }
                _ => {
                    if let Some(label_id) = columns[0][i].as_str() {
                        delete_ids.insert(label_id.to_string());
                    }
                }
            }
        }

        if delete {
            let observed: HashSet<&str> = update_ids.iter().map(String::as_str).collect();
            let all = self.clips.view().values(&["id", "sample_id"]).await?;
            for i in 0..all[0].len() {
                let (Some(label_id), Some(sample_id)) = (all[0][i].as_str(), all[1][i].as_str())
                else {
                    continue;
                };
                if !observed.contains(sample_id) {
                    delete_ids.insert(label_id.to_string());
                }
            }
        }

        debug!(
            field = %field,
            updates = update_ids.len(),
            deletes = delete_ids.len(),
            "syncing clips to source"
        );

        if update {
            self.source
                .set_labels(&field, &update_ids, update_docs)
                .await?;
        }
        if !delete_ids.is_empty() {
            let delete_ids: Vec<String> = delete_ids.into_iter().collect();
            self.source
                .delete_labels(&delete_ids, &[field.as_str()])
                .await?;
        }
        Ok(())
    }

    /// Mirror a `keep_fields` call: fields the view dropped are removed from
    /// the source too. Sample-level removal only applies to the mirrored
    /// classification field; frame-level removal applies to any frame field
    /// the view no longer carries.
    pub async fn sync_keep_fields(&self, view: &DatasetView) -> ClipsResult<()> {
        if let Some(field) = &self.classification_field {
            let kept = view.get_field_schema().await;
            if schema::find_field(&kept, field).is_none() {
                self.source
                    .exclude_fields(&[field.as_str()])
                    .keep_fields()
                    .await?;
            }
        }

        let kept: HashSet<String> = view
            .get_frame_field_schema()
            .await
            .into_iter()
            .map(|f| f.name)
            .collect();
        let dropped: Vec<String> = self
            .source
            .get_frame_field_schema()
            .await
            .into_iter()
            .filter(|f| !kept.contains(&f.name))
            .map(|f| format!("{}{}", FRAMES_PREFIX, f.name))
            .collect();

        if !dropped.is_empty() {
            self.source.exclude_fields(&dropped).keep_fields().await?;
        }
        Ok(())
    }
}

/// Rebuild a temporal detection document from a clip's classification and
/// support.
fn detection_doc(label: BTreeMap<String, Value>, support: Option<Value>) -> Document {
    let mut doc = Document::from_fields(label);
    doc.set(CLS_KEY, LabelKind::TemporalDetection.as_str());
    doc.set("support", support.unwrap_or(Value::Null));
    doc
}
