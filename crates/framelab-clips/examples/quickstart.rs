//! End-to-end tour: build a video dataset, cut clips from its temporal
//! detections, edit one clip, and watch the edit land back on the source.
//!
//! Run with `cargo run --example quickstart`; set `RUST_LOG` to raise the
//! log level.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use framelab_clips::{to_clips, ClipsStage};
use framelab_dataset::{Dataset, DatasetConfig, FieldKind, StoreHandle};
use framelab_models::{
    Classification, FrameSupport, LabelKind, MediaType, TemporalDetection, TemporalDetections,
};
use framelab_store::{Document, MemoryStore, Value};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::from_default_env().add_directive("framelab=info".parse()?);
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true).with_target(true))
        .with(env_filter)
        .init();

    info!("Starting framelab quickstart");

    let config = DatasetConfig::from_env();
    let store: StoreHandle = Arc::new(MemoryStore::new());

    let dataset = Dataset::create(store, "quickstart", config).await?;
    dataset.set_media_type(MediaType::Video).await?;
    dataset
        .add_sample_field("events", FieldKind::Embedded(LabelKind::TemporalDetections))
        .await?;

    let kickoff = TemporalDetection::new("kickoff", FrameSupport::new(30, 180)?);
    let goal = TemporalDetection::new("goal", FrameSupport::new(1500, 1620)?);
    let drill = TemporalDetection::new("drill", FrameSupport::new(90, 400)?);

    let mut game = Document::new();
    game.set("filepath", "/videos/match.mp4");
    game.set(
        "events",
        TemporalDetections::new(vec![kickoff, goal.clone()]).to_doc()?,
    );
    let mut training = Document::new();
    training.set("filepath", "/videos/training.mp4");
    training.set("events", TemporalDetections::new(vec![drill]).to_doc()?);
    dataset.add_samples(vec![game, training]).await?;

    info!(samples = dataset.count().await?, "dataset ready");

    // One clip per detection, sharing the detection's id and support
    let clips = to_clips(&dataset.view(), ClipsStage::field("events")).await?;
    info!(
        dataset = %clips.name().await,
        clips = clips.count().await?,
        "cut clips"
    );
    for clip in clips.clips().await? {
        let label = clip
            .classification()
            .and_then(|c| c.label)
            .unwrap_or_default();
        info!(
            id = clip.id().unwrap_or("?"),
            filepath = clip.filepath().unwrap_or("?"),
            label = %label,
            "clip"
        );
    }

    // Relabel and retrim one clip; saving mirrors both edits onto the
    // source detection
    if let Some(mut clip) = clips.clip(goal.id.as_str()).await? {
        clip.set_classification(Some(&Classification::new("goal-replay")))?;
        clip.set_support(FrameSupport::new(1480, 1650)?);
        clip.save().await?;
        info!(clip = goal.id.as_str(), "relabeled and retrimmed");
    }

    let columns = dataset.view().values(&["events.detections"]).await?;
    for sample in &columns[0] {
        let Some(items) = sample.as_array() else {
            continue;
        };
        for item in items {
            let label = item
                .as_map()
                .and_then(|m| m.get("label"))
                .and_then(Value::as_str)
                .unwrap_or("?");
            info!(label, "source detection after sync");
        }
    }

    Ok(())
}
