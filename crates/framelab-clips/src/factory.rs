//! Clips dataset construction.

use std::collections::HashSet;

use framelab_dataset::{
    registry, schema, validation, Dataset, DatasetError, DatasetView, FieldKind, FieldSpec,
};
use framelab_models::LabelKind;
use tracing::info;

use crate::error::{ClipsError, ClipsResult};
use crate::strategy::{
    classify, ClipsBy, ClipsStage, ClipsStrategy, FrameExpr, OtherFields,
    TEMPORAL_DETECTION_KINDS, TRAJECTORY_KINDS,
};
use crate::view::ClipsView;
use crate::writers::{
    ClipsMaterializer, ExpressionWriter, ManualWriter, SupportWriter, TemporalDetectionWriter,
    TrajectoriesWriter, WriteContext,
};

/// Materialize clips from `source` and wrap them in a synchronized view.
pub async fn to_clips(source: &DatasetView, stage: ClipsStage) -> ClipsResult<ClipsView> {
    ClipsView::create(source, stage).await
}

/// Create a clips dataset containing one sample per clip cut from `source`.
///
/// The dataset shares the source's frame collection, so clips carry the
/// source's frame labels over their supports without copying. Its name
/// defaults to `<source>-clips`; an existing dataset by that name is replaced
/// when it is itself a clips dataset generated from the same source, and the
/// name is reported as taken otherwise.
pub async fn make_clips_dataset(
    source: &DatasetView,
    stage: &ClipsStage,
    name: Option<&str>,
) -> ClipsResult<Dataset> {
    validation::validate_video_collection(source.dataset()).await?;

    let sample_fields = source.dataset().get_field_schema().await;
    let strategy = classify(&sample_fields, stage);

    // label-type problems surface before anything is created
    match (strategy, &stage.by) {
        (ClipsStrategy::TemporalDetection, ClipsBy::Field(field)) => {
            validation::validate_label_field(source.dataset(), field, &TEMPORAL_DETECTION_KINDS)
                .await?;
        }
        (ClipsStrategy::Trajectories, ClipsBy::Field(field)) => {
            validation::validate_label_field(source.dataset(), field, &TRAJECTORY_KINDS).await?;
        }
        (ClipsStrategy::Expression, ClipsBy::Field(field)) => {
            validation::validate_label_field(source.dataset(), field, &LabelKind::list_kinds())
                .await?;
        }
        _ => {}
    }

    let source_name = source.dataset().name().await;
    let name = match name {
        Some(name) => name.to_string(),
        None => format!("{}-clips", source_name),
    };
    replace_stale_clips(source, &source_name, &name).await?;

    let clips = Dataset::create_clips(source.dataset(), &name).await?;
    if let Err(err) = populate_clips(source, &clips, strategy, stage, &sample_fields).await {
        // a half-built dataset is worse than none
        clips.delete().await.ok();
        return Err(err);
    }

    info!(dataset = %name, strategy = %strategy, "materialized clips dataset");
    Ok(clips)
}

/// Declare the clips schema and run the strategy's materializer. Split out
/// so any failure after creation tears the dataset down again.
async fn populate_clips(
    source: &DatasetView,
    clips: &Dataset,
    strategy: ClipsStrategy,
    stage: &ClipsStage,
    sample_fields: &[FieldSpec],
) -> ClipsResult<()> {
    clips
        .add_sample_field_with_db("sample_id", FieldKind::ObjectId, "_sample_id")
        .await?;
    clips.create_index("sample_id").await?;
    clips
        .add_sample_field("support", FieldKind::FrameSupport)
        .await?;

    match (strategy, &stage.by) {
        (ClipsStrategy::TemporalDetection, ClipsBy::Field(field)) => {
            clips
                .add_sample_field(field, FieldKind::Embedded(LabelKind::Classification))
                .await?;
        }
        (ClipsStrategy::Trajectories, ClipsBy::Field(field)) => {
            let bare = Dataset::strip_frames_prefix(field);
            clips
                .add_sample_field(bare, FieldKind::Embedded(LabelKind::TrajectoryLabel))
                .await?;
        }
        _ => {}
    }

    let other_fields = resolve_other_fields(&stage.other_fields, sample_fields, clips).await?;
    clips.apply_pretty_field_order().await?;

    let ctx = WriteContext {
        source,
        clips,
        other_fields,
        tol: stage.tol,
        min_len: stage.min_len,
    };
    let writer = materializer_for(source, strategy, stage).await?;
    writer.materialize(&ctx).await
}

/// Delete a previous generation of this clips dataset, if that is what holds
/// the name. Unrelated datasets keep it and the conflict surfaces on create.
async fn replace_stale_clips(
    source: &DatasetView,
    source_name: &str,
    name: &str,
) -> ClipsResult<()> {
    let store = source.dataset().store_handle();
    if !registry::exists(store.as_ref(), name).await? {
        return Ok(());
    }

    let existing = Dataset::load(store, name, source.dataset().config().clone()).await?;
    if existing.is_clips().await && existing.source_name().await.as_deref() == Some(source_name) {
        existing.delete().await?;
    }
    Ok(())
}

/// Resolve the extra sample fields to carry onto the clips, declaring any the
/// clips dataset does not already have.
async fn resolve_other_fields(
    other_fields: &OtherFields,
    source_fields: &[FieldSpec],
    clips: &Dataset,
) -> ClipsResult<Vec<String>> {
    let current: HashSet<String> = clips
        .get_field_schema()
        .await
        .into_iter()
        .map(|f| f.name)
        .collect();

    let requested: Vec<String> = match other_fields {
        OtherFields::None => return Ok(Vec::new()),
        OtherFields::Fields(fields) => fields.clone(),
        OtherFields::All => source_fields
            .iter()
            .map(|f| f.name.clone())
            .filter(|name| !current.contains(name))
            .collect(),
    };

    for name in &requested {
        if current.contains(name) {
            continue;
        }
        let spec = schema::find_field(source_fields, name)
            .ok_or_else(|| DatasetError::field_not_found(name))?;
        clips.add_sample_field_spec(spec.clone()).await?;
    }
    Ok(requested)
}

async fn materializer_for(
    source: &DatasetView,
    strategy: ClipsStrategy,
    stage: &ClipsStage,
) -> ClipsResult<Box<dyn ClipsMaterializer>> {
    match (strategy, &stage.by) {
        (ClipsStrategy::Support, ClipsBy::Field(field)) => Ok(Box::new(SupportWriter {
            field: field.clone(),
        })),
        (ClipsStrategy::TemporalDetection, ClipsBy::Field(field)) => {
            Ok(Box::new(TemporalDetectionWriter {
                field: field.clone(),
            }))
        }
        (ClipsStrategy::Trajectories, ClipsBy::Field(field)) => {
            Ok(Box::new(TrajectoriesWriter {
                field: Dataset::strip_frames_prefix(field).to_string(),
            }))
        }
        (ClipsStrategy::Expression, ClipsBy::Field(field)) => {
            let expr = frame_field_expr(source, field).await?;
            Ok(Box::new(ExpressionWriter { expr }))
        }
        (ClipsStrategy::Expression, ClipsBy::Expr(expr)) => Ok(Box::new(ExpressionWriter {
            expr: expr.clone(),
        })),
        (ClipsStrategy::Manual, ClipsBy::Manual(supports)) => Ok(Box::new(ManualWriter {
            supports: supports.clone(),
        })),
        _ => Err(ClipsError::validation(
            "Clip strategy does not match its stage",
        )),
    }
}

/// Truthiness predicate over a frame label list field: a frame is "on" when
/// the list has at least one element.
async fn frame_field_expr(source: &DatasetView, field: &str) -> ClipsResult<FrameExpr> {
    let kind =
        validation::validate_label_field(source.dataset(), field, &LabelKind::list_kinds())
            .await?;
    let bare = Dataset::strip_frames_prefix(field);
    let db = source.dataset().db_frame_path(bare).await;
    let path = match kind.list_field_name() {
        Some(list_field) => format!("{}.{}", db, list_field),
        None => db,
    };
    Ok(FrameExpr::field_truthy(path))
}
