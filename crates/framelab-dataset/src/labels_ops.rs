//! Bulk label writes keyed by label id.
//!
//! These operations power label synchronization between derived datasets and
//! their sources. They match labels by `_id` rather than by position, so a
//! stale id (a label deleted out from under the caller) is a quiet no-op
//! instead of a misdirected write.

use std::collections::HashSet;

use framelab_store::{Filter, ToValue, Value};

use crate::error::{DatasetError, DatasetResult};
use crate::view::DatasetView;

impl DatasetView {
    /// Overwrite labels in `field` for the given samples.
    ///
    /// `docs` aligns positionally with `sample_ids`. For single-label fields,
    /// a document replaces the current label only when their ids match, and
    /// `None` clears the field. For label-list fields, a document replaces
    /// the list element with the same id; `None` is ignored there, since
    /// list removal goes through [`delete_labels`](Self::delete_labels).
    pub async fn set_labels(
        &self,
        field: &str,
        sample_ids: &[String],
        docs: Vec<Option<framelab_store::Document>>,
    ) -> DatasetResult<()> {
        if sample_ids.len() != docs.len() {
            return Err(DatasetError::validation(format!(
                "Expected {} label documents for '{}'; got {}",
                sample_ids.len(),
                field,
                docs.len()
            )));
        }

        let spec = self
            .dataset()
            .get_field(field)
            .await
            .ok_or_else(|| DatasetError::field_not_found(field))?;
        let Some(kind) = spec.kind.label_kind() else {
            return Err(DatasetError::validation(format!(
                "Field '{}' does not hold labels",
                field
            )));
        };
        let db_field = spec.db_name().to_string();
        let coll = self.dataset().sample_collection_name().await;
        let store = self.dataset().store();

        for (sample_id, payload) in sample_ids.iter().zip(docs) {
            let found = store
                .find(&coll, Filter::eq("_id", sample_id.as_str()))
                .await?;
            let Some(mut doc) = found.into_iter().next() else {
                continue;
            };

            let changed = match (kind.list_field_name(), payload) {
                (None, Some(label)) => {
                    let id_path = format!("{}._id", db_field);
                    let current = doc.get_path(&id_path).and_then(Value::as_str);
                    if current == label.id() {
                        doc.set(&db_field, label);
                        true
                    } else {
                        false
                    }
                }
                (None, None) => {
                    doc.set(&db_field, Value::Null);
                    true
                }
                (Some(list_field), Some(label)) => {
                    let path = format!("{}.{}", db_field, list_field);
                    let Some(label_id) = label.id().map(String::from) else {
                        continue;
                    };
                    let Some(Value::Array(elements)) = doc.get_path(&path).cloned() else {
                        continue;
                    };
                    let mut replaced = false;
                    let elements: Vec<Value> = elements
                        .into_iter()
                        .map(|el| {
                            if element_id(&el) == Some(label_id.as_str()) {
                                replaced = true;
                                label.to_value()
                            } else {
                                el
                            }
                        })
                        .collect();
                    if replaced {
                        doc.set_path(&path, Value::Array(elements));
                    }
                    replaced
                }
                (Some(_), None) => false,
            };

            if changed {
                store
                    .replace_one(&coll, Filter::eq("_id", sample_id.as_str()), doc)
                    .await?;
            }
        }

        Ok(())
    }

    /// Delete the labels with the given ids from the named fields.
    ///
    /// Single-label fields are cleared; label-list fields drop the matching
    /// elements. Unknown ids are ignored. Returns the number of labels
    /// removed.
    pub async fn delete_labels(
        &self,
        label_ids: &[String],
        fields: &[&str],
    ) -> DatasetResult<u64> {
        let ids: HashSet<&str> = label_ids.iter().map(String::as_str).collect();
        if ids.is_empty() || fields.is_empty() {
            return Ok(0);
        }

        let coll = self.dataset().sample_collection_name().await;
        let store = self.dataset().store();
        let mut removed = 0u64;

        for field in fields {
            let spec = self
                .dataset()
                .get_field(field)
                .await
                .ok_or_else(|| DatasetError::field_not_found(*field))?;
            let Some(kind) = spec.kind.label_kind() else {
                return Err(DatasetError::validation(format!(
                    "Field '{}' does not hold labels",
                    field
                )));
            };
            let db_field = spec.db_name().to_string();

            for mut doc in store.find(&coll, Filter::All).await? {
                let Some(sample_id) = doc.id().map(String::from) else {
                    continue;
                };
                let mut changed = false;

                match kind.list_field_name() {
                    Some(list_field) => {
                        let path = format!("{}.{}", db_field, list_field);
                        if let Some(Value::Array(elements)) = doc.get_path(&path).cloned() {
                            let kept: Vec<Value> = elements
                                .into_iter()
                                .filter(|el| {
                                    let matched = element_id(el)
                                        .map(|id| ids.contains(id))
                                        .unwrap_or(false);
                                    if matched {
                                        removed += 1;
                                        changed = true;
                                    }
                                    !matched
                                })
                                .collect();
                            if changed {
                                doc.set_path(&path, Value::Array(kept));
                            }
                        }
                    }
                    None => {
                        let id_path = format!("{}._id", db_field);
                        let matched = doc
                            .get_path(&id_path)
                            .and_then(Value::as_str)
                            .map(|id| ids.contains(id))
                            .unwrap_or(false);
                        if matched {
                            doc.set(&db_field, Value::Null);
                            removed += 1;
                            changed = true;
                        }
                    }
                }

                if changed {
                    store
                        .replace_one(&coll, Filter::eq("_id", sample_id.as_str()), doc)
                        .await?;
                }
            }
        }

        Ok(removed)
    }
}

fn element_id(el: &Value) -> Option<&str> {
    el.as_map()?.get("_id")?.as_str()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use framelab_models::{
        Classification, FrameSupport, LabelDoc, LabelKind, MediaType, TemporalDetection,
        TemporalDetections,
    };
    use framelab_store::{Document, MemoryStore};

    use super::*;
    use crate::config::DatasetConfig;
    use crate::dataset::{Dataset, StoreHandle};
    use crate::schema::FieldKind;

    async fn video_dataset(name: &str) -> Dataset {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let dataset = Dataset::create(store, name, DatasetConfig::default())
            .await
            .unwrap();
        dataset.set_media_type(MediaType::Video).await.unwrap();
        dataset
    }

    #[tokio::test]
    async fn test_set_labels_single_field() {
        let dataset = video_dataset("labels-single").await;
        dataset
            .add_sample_field("event", FieldKind::Embedded(LabelKind::TemporalDetection))
            .await
            .unwrap();

        let label = TemporalDetection::new("goal", FrameSupport::new(10, 20).unwrap());
        let label_id = label.label_id().clone();
        let mut sample = Document::new();
        sample.set("filepath", "/videos/a.mp4");
        sample.set("event", label.to_doc().unwrap());
        let ids = dataset.add_samples(vec![sample]).await.unwrap();
        let sample_id = ids[0].to_string();

        // matching id replaces the label
        let mut updated = TemporalDetection::new("corner", FrameSupport::new(10, 20).unwrap());
        updated.id = label_id.clone();
        dataset
            .view()
            .set_labels(
                "event",
                &[sample_id.clone()],
                vec![Some(updated.to_doc().unwrap())],
            )
            .await
            .unwrap();
        let values = dataset.view().values(&["event.label"]).await.unwrap();
        assert_eq!(values[0], vec![framelab_store::Value::Str("corner".into())]);

        // stale id is a no-op
        let stale = TemporalDetection::new("kickoff", FrameSupport::new(1, 2).unwrap());
        dataset
            .view()
            .set_labels(
                "event",
                &[sample_id.clone()],
                vec![Some(stale.to_doc().unwrap())],
            )
            .await
            .unwrap();
        let values = dataset.view().values(&["event.label"]).await.unwrap();
        assert_eq!(values[0], vec![framelab_store::Value::Str("corner".into())]);

        // None clears the field
        dataset
            .view()
            .set_labels("event", &[sample_id], vec![None])
            .await
            .unwrap();
        let values = dataset.view().values(&["event"]).await.unwrap();
        assert_eq!(values[0], vec![framelab_store::Value::Null]);
    }

    #[tokio::test]
    async fn test_set_labels_list_field() {
        let dataset = video_dataset("labels-list").await;
        dataset
            .add_sample_field("events", FieldKind::Embedded(LabelKind::TemporalDetections))
            .await
            .unwrap();

        let first = TemporalDetection::new("goal", FrameSupport::new(1, 5).unwrap());
        let second = TemporalDetection::new("foul", FrameSupport::new(8, 12).unwrap());
        let second_id = second.label_id().clone();
        let lists = TemporalDetections::new(vec![first, second]);

        let mut sample = Document::new();
        sample.set("filepath", "/videos/a.mp4");
        sample.set("events", lists.to_doc().unwrap());
        let ids = dataset.add_samples(vec![sample]).await.unwrap();
        let sample_id = ids[0].to_string();

        let mut updated = TemporalDetection::new("penalty", FrameSupport::new(8, 12).unwrap());
        updated.id = second_id;
        dataset
            .view()
            .set_labels(
                "events",
                &[sample_id],
                vec![Some(updated.to_doc().unwrap())],
            )
            .await
            .unwrap();

        let values = dataset
            .view()
            .values(&["events.detections"])
            .await
            .unwrap();
        let Some(framelab_store::Value::Array(elements)) = values[0].first() else {
            panic!("expected label list");
        };
        let labels: Vec<&str> = elements
            .iter()
            .filter_map(|el| el.as_map()?.get("label")?.as_str())
            .collect();
        assert_eq!(labels, vec!["goal", "penalty"]);
    }

    #[tokio::test]
    async fn test_delete_labels() {
        let dataset = video_dataset("labels-delete").await;
        dataset
            .add_sample_field("event", FieldKind::Embedded(LabelKind::TemporalDetection))
            .await
            .unwrap();
        dataset
            .add_sample_field("events", FieldKind::Embedded(LabelKind::TemporalDetections))
            .await
            .unwrap();

        let single = TemporalDetection::new("goal", FrameSupport::new(1, 5).unwrap());
        let single_id = single.label_id().to_string();
        let kept = TemporalDetection::new("foul", FrameSupport::new(8, 12).unwrap());
        let dropped = TemporalDetection::new("corner", FrameSupport::new(20, 25).unwrap());
        let dropped_id = dropped.label_id().to_string();

        let mut sample = Document::new();
        sample.set("filepath", "/videos/a.mp4");
        sample.set("event", single.to_doc().unwrap());
        sample.set(
            "events",
            TemporalDetections::new(vec![kept, dropped]).to_doc().unwrap(),
        );
        dataset.add_samples(vec![sample]).await.unwrap();

        let removed = dataset
            .view()
            .delete_labels(
                &[single_id, dropped_id, "missing".to_string()],
                &["event", "events"],
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let values = dataset
            .view()
            .values(&["event", "events.detections"])
            .await
            .unwrap();
        assert_eq!(values[0], vec![framelab_store::Value::Null]);
        let Some(framelab_store::Value::Array(elements)) = values[1].first() else {
            panic!("expected label list");
        };
        assert_eq!(elements.len(), 1);
    }

    #[tokio::test]
    async fn test_set_labels_non_label_field_errors() {
        let dataset = video_dataset("labels-kind").await;
        let err = dataset
            .view()
            .set_labels("filepath", &[], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Validation(_)));

        let classification_doc = Classification::new("x").to_doc().unwrap();
        let err = dataset
            .view()
            .set_labels(
                "nope",
                &["s".to_string()],
                vec![Some(classification_doc)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::FieldNotFound { .. }));
    }
}
