//! Collection and field validation helpers.

use framelab_models::{LabelKind, MediaType};

use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};

/// Ensure the dataset holds video samples.
pub async fn validate_video_collection(dataset: &Dataset) -> DatasetResult<()> {
    match dataset.media_type().await {
        Some(MediaType::Video) => Ok(()),
        other => Err(DatasetError::MediaType {
            expected: MediaType::Video.as_str().to_string(),
            found: other
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "unset".to_string()),
        }),
    }
}

/// Resolve `path` to a label field of one of the `supported` kinds.
///
/// `frames.`-prefixed paths resolve against the frame schema.
pub async fn validate_label_field(
    dataset: &Dataset,
    path: &str,
    supported: &[LabelKind],
) -> DatasetResult<LabelKind> {
    let spec = dataset
        .get_field(path)
        .await
        .ok_or_else(|| DatasetError::field_not_found(path))?;

    let unsupported = |found: String| DatasetError::UnsupportedLabelType {
        field: path.to_string(),
        found,
        supported: supported.iter().map(|k| k.to_string()).collect(),
    };

    let Some(kind) = spec.kind.label_kind() else {
        return Err(unsupported(spec.kind.to_string()));
    };
    if !supported.contains(&kind) {
        return Err(unsupported(kind.to_string()));
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use framelab_store::MemoryStore;

    use super::*;
    use crate::config::DatasetConfig;
    use crate::dataset::StoreHandle;
    use crate::schema::FieldKind;

    #[tokio::test]
    async fn test_validate_video_collection() {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let dataset = Dataset::create(store, "validate-media", DatasetConfig::default())
            .await
            .unwrap();

        let err = validate_video_collection(&dataset).await.unwrap_err();
        assert!(matches!(err, DatasetError::MediaType { .. }));

        dataset.set_media_type(MediaType::Video).await.unwrap();
        assert!(validate_video_collection(&dataset).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_label_field() {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let dataset = Dataset::create(store, "validate-labels", DatasetConfig::default())
            .await
            .unwrap();
        dataset.set_media_type(MediaType::Video).await.unwrap();
        dataset
            .add_frame_field("detections", FieldKind::Embedded(LabelKind::Detections))
            .await
            .unwrap();

        let kind = validate_label_field(
            &dataset,
            "frames.detections",
            &[LabelKind::Detections, LabelKind::Polylines],
        )
        .await
        .unwrap();
        assert_eq!(kind, LabelKind::Detections);

        let err = validate_label_field(&dataset, "frames.detections", &[LabelKind::Polylines])
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("frames.detections"));
        assert!(message.contains("Polylines"));
        assert!(message.contains("Detections"));

        let err = validate_label_field(&dataset, "frames.nothing", &[LabelKind::Detections])
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::FieldNotFound { .. }));
    }
}
