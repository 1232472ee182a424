//! Per-strategy clip materializers.
//!
//! Each materializer appends its stages to the source view's pipeline and
//! ends with an out-stage into the clips sample collection, so existing view
//! filters apply before any clip is cut. Strategies that stage per-sample
//! values on the source (trajectories, expression, manual) write them to a
//! temporary underscore field and remove it again whether or not the
//! pipeline succeeded.

use async_trait::async_trait;

use framelab_dataset::{validation, Dataset, DatasetError, DatasetView, FieldKind, FRAMES_PREFIX};
use framelab_models::labels::CLS_KEY;
use framelab_models::{FrameSupport, LabelKind};
use framelab_store::{Expr, Filter, ProjectSpec, Stage, ToValue, UpdateOp, Value};
use tracing::debug;

use crate::error::ClipsResult;
use crate::rle::to_rle;
use crate::strategy::{FrameExpr, TEMPORAL_DETECTION_KINDS, TRAJECTORY_KINDS};
use crate::trajectories::get_trajectories;

/// Everything a materializer needs to cut clips.
pub(crate) struct WriteContext<'a> {
    pub source: &'a DatasetView,
    pub clips: &'a Dataset,
    /// Extra source sample fields to carry onto the clips, by public name.
    pub other_fields: Vec<String>,
    pub tol: u32,
    pub min_len: u32,
}

#[async_trait]
pub(crate) trait ClipsMaterializer: Send + Sync {
    async fn materialize(&self, ctx: &WriteContext<'_>) -> ClipsResult<()>;
}

// =============================================================================
// Shared pipeline pieces
// =============================================================================

/// The stored field clip back-references point at. Clips of clips reference
/// the root video sample, not the intermediate clip.
async fn source_id_field(source: &DatasetView) -> &'static str {
    if source.dataset().is_clips().await {
        "_sample_id"
    } else {
        "_id"
    }
}

/// Projection shared by every strategy: drop the sample id, record it as the
/// clip's back-reference, and carry the media fields plus any requested
/// extras.
async fn base_project(ctx: &WriteContext<'_>, include_rand: bool) -> ProjectSpec {
    let mut spec = ProjectSpec::new()
        .exclude("_id")
        .computed("_sample_id", Expr::field(source_id_field(ctx.source).await))
        .include("_media_type")
        .include("filepath")
        .include("metadata")
        .include("tags");

    if include_rand {
        spec = spec.include("_rand");
    }
    for field in &ctx.other_fields {
        spec = spec.include(ctx.source.dataset().db_sample_path(field).await);
    }
    spec
}

async fn run_pipeline(ctx: &WriteContext<'_>, mut pipeline: Vec<Stage>) -> ClipsResult<()> {
    pipeline.push(Stage::out(ctx.clips.sample_collection_name().await));

    let collection = ctx.source.dataset().sample_collection_name().await;
    debug!(
        collection = %collection,
        stages = pipeline.len(),
        "materializing clips"
    );
    ctx.source
        .dataset()
        .store()
        .aggregate(&collection, pipeline)
        .await?;
    Ok(())
}

/// Run a pipeline that depends on a temporary source field, then remove the
/// field from every source sample even when the pipeline failed.
async fn run_pipeline_with_temp(
    ctx: &WriteContext<'_>,
    pipeline: Vec<Stage>,
    temp_field: &str,
) -> ClipsResult<()> {
    let result = run_pipeline(ctx, pipeline).await;

    let collection = ctx.source.dataset().sample_collection_name().await;
    let cleanup = ctx
        .source
        .dataset()
        .store()
        .update_many(&collection, Filter::All, UpdateOp::unset_one(temp_field))
        .await;

    result?;
    cleanup?;
    Ok(())
}

// =============================================================================
// Frame support fields
// =============================================================================

/// Copies intervals straight out of a sample-level frame-support field. A
/// list field cuts one clip per interval.
pub(crate) struct SupportWriter {
    pub field: String,
}

#[async_trait]
impl ClipsMaterializer for SupportWriter {
    async fn materialize(&self, ctx: &WriteContext<'_>) -> ClipsResult<()> {
        let spec = ctx
            .source
            .dataset()
            .get_field(&self.field)
            .await
            .ok_or_else(|| DatasetError::field_not_found(&self.field))?;
        let is_list = matches!(spec.kind, FieldKind::List(_));

        let project = base_project(ctx, true)
            .await
            .computed("support", Expr::field(spec.db_name()));

        let mut pipeline = ctx.source.to_pipeline().await;
        pipeline.push(Stage::Project(project));
        if is_list {
            pipeline.push(Stage::unwind("support"));
            pipeline.push(Stage::Set(vec![("_rand".to_string(), Expr::Rand)]));
        }
        run_pipeline(ctx, pipeline).await
    }
}

// =============================================================================
// Temporal detections
// =============================================================================

/// Cuts one clip per temporal detection. The clip takes over the detection's
/// id and support, and keeps the rest of the detection as a classification,
/// which is what makes edits synchronizable back to the source.
pub(crate) struct TemporalDetectionWriter {
    pub field: String,
}

#[async_trait]
impl ClipsMaterializer for TemporalDetectionWriter {
    async fn materialize(&self, ctx: &WriteContext<'_>) -> ClipsResult<()> {
        let kind = validation::validate_label_field(
            ctx.source.dataset(),
            &self.field,
            &TEMPORAL_DETECTION_KINDS,
        )
        .await?;
        let db_field = ctx.source.dataset().db_sample_path(&self.field).await;

        let project = base_project(ctx, true).await.include(&db_field);

        let mut pipeline = ctx.source.to_pipeline().await;
        pipeline.push(Stage::Project(project));

        if let Some(list_field) = kind.list_field_name() {
            let list_path = format!("{}.{}", db_field, list_field);
            pipeline.push(Stage::unwind(&list_path));
            pipeline.push(Stage::Set(vec![(
                db_field.clone(),
                Expr::field(&list_path),
            )]));
        }

        let support_path = format!("{}.support", db_field);
        pipeline.push(Stage::Set(vec![
            ("_id".to_string(), Expr::field(format!("{}._id", db_field))),
            ("support".to_string(), Expr::field(&support_path)),
            (
                format!("{}.{}", db_field, CLS_KEY),
                Expr::literal(LabelKind::Classification.as_str()),
            ),
            ("_rand".to_string(), Expr::Rand),
        ]));
        pipeline.push(Stage::Unset(vec![support_path]));

        run_pipeline(ctx, pipeline).await
    }
}

// =============================================================================
// Trajectories
// =============================================================================

/// Cuts one clip per tracked object. Trajectories are computed client-side,
/// staged on the source samples as flattened `[label, index, first, last]`
/// arrays, then unwound and split back apart in the pipeline.
pub(crate) struct TrajectoriesWriter {
    /// Frame field name without the `frames.` prefix.
    pub field: String,
}

#[async_trait]
impl ClipsMaterializer for TrajectoriesWriter {
    async fn materialize(&self, ctx: &WriteContext<'_>) -> ClipsResult<()> {
        let frame_path = format!("{}{}", FRAMES_PREFIX, self.field);
        validation::validate_label_field(ctx.source.dataset(), &frame_path, &TRAJECTORY_KINDS)
            .await?;

        let trajectories = get_trajectories(ctx.source, &self.field).await?;
        let temp_field = format!("_{}", self.field);

        let values: Vec<Value> = trajectories
            .iter()
            .map(|sample| match sample {
                Some(tracks) => Value::Array(tracks.iter().map(ToValue::to_value).collect()),
                None => Value::Null,
            })
            .collect();
        ctx.source.set_values(&temp_field, values).await?;

        let project = base_project(ctx, false).await.include(&temp_field);

        let mut pipeline = ctx.source.to_pipeline_with(&[temp_field.as_str()]).await;
        pipeline.push(Stage::Project(project));
        pipeline.push(Stage::unwind(&temp_field));
        pipeline.push(Stage::Set(vec![
            (
                "support".to_string(),
                Expr::slice(Expr::field(&temp_field), 2, 2),
            ),
            (
                self.field.clone(),
                Expr::map(vec![
                    (
                        CLS_KEY.to_string(),
                        Expr::literal(LabelKind::TrajectoryLabel.as_str()),
                    ),
                    ("label".to_string(), Expr::elem_at(Expr::field(&temp_field), 0)),
                    ("index".to_string(), Expr::elem_at(Expr::field(&temp_field), 1)),
                ]),
            ),
            ("_rand".to_string(), Expr::Rand),
        ]));
        pipeline.push(Stage::Unset(vec![temp_field.clone()]));

        run_pipeline_with_temp(ctx, pipeline, &temp_field).await
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// Evaluates a per-frame predicate, run-length encodes the results with the
/// stage's tolerance and minimum length, and hands the intervals to the
/// manual writer.
pub(crate) struct ExpressionWriter {
    pub expr: FrameExpr,
}

#[async_trait]
impl ClipsMaterializer for ExpressionWriter {
    async fn materialize(&self, ctx: &WriteContext<'_>) -> ClipsResult<()> {
        let ids = ctx.source.ids().await?;
        let mut frames = ctx.source.dataset().load_frames(Some(&ids)).await?;

        let mut supports = Vec::with_capacity(ids.len());
        for id in &ids {
            let sample_frames = frames.remove(id).unwrap_or_default();

            let mut frame_numbers = Vec::with_capacity(sample_frames.len());
            let mut flags = Vec::with_capacity(sample_frames.len());
            for frame in &sample_frames {
                let Some(number) = frame
                    .get("frame_number")
                    .and_then(Value::as_int)
                    .and_then(|n| u32::try_from(n).ok())
                else {
                    continue;
                };
                frame_numbers.push(number);
                flags.push(self.expr.evaluate(frame));
            }

            supports.push(to_rle(&frame_numbers, &flags, ctx.tol, ctx.min_len)?);
        }

        ManualWriter { supports }.materialize(ctx).await
    }
}

// =============================================================================
// Manual intervals
// =============================================================================

/// Stages caller-provided interval lists on the source and unwinds them, one
/// clip per interval. Samples with `None` or an empty list produce no clips.
pub(crate) struct ManualWriter {
    pub supports: Vec<Option<Vec<FrameSupport>>>,
}

#[async_trait]
impl ClipsMaterializer for ManualWriter {
    async fn materialize(&self, ctx: &WriteContext<'_>) -> ClipsResult<()> {
        let temp_field = "_support";

        let values: Vec<Value> = self
            .supports
            .iter()
            .map(|sample| match sample {
                Some(intervals) => {
                    Value::Array(intervals.iter().map(ToValue::to_value).collect())
                }
                None => Value::Null,
            })
            .collect();
        ctx.source.set_values(temp_field, values).await?;

        let project = base_project(ctx, false)
            .await
            .computed("support", Expr::field(temp_field));

        let mut pipeline = ctx.source.to_pipeline_with(&[temp_field]).await;
        pipeline.push(Stage::Project(project));
        pipeline.push(Stage::unwind("support"));
        pipeline.push(Stage::Set(vec![("_rand".to_string(), Expr::Rand)]));

        run_pipeline_with_temp(ctx, pipeline, temp_field).await
    }
}
