//! Trajectory extraction from frame-level labels.
//!
//! A trajectory is one tracked object: every frame label that shares a
//! `(label, index)` pair belongs to the same track, and its support is the
//! `[min, max]` range of frame numbers the track was observed in. Labels
//! without an `index` do not form trajectories and are skipped.

use std::collections::HashMap;

use framelab_dataset::{validation, DatasetView, FRAMES_PREFIX};
use framelab_models::{FrameSupport, LabelKind};
use framelab_store::{ToValue, Value};

use crate::error::{ClipsError, ClipsResult};

/// One tracked object in a video sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trajectory {
    pub label: String,
    pub index: i64,
    pub support: FrameSupport,
}

impl ToValue for Trajectory {
    /// Flattened to `[label, index, first_frame, last_frame]` so pipeline
    /// slice and element operators can split it back apart.
    fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::Str(self.label.clone()),
            Value::Int(self.index),
            Value::Int(i64::from(self.support.first_frame())),
            Value::Int(i64::from(self.support.last_frame())),
        ])
    }
}

/// Min/max accumulator for observed frame numbers.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: u32,
    max: u32,
}

impl Bounds {
    fn new(frame_number: u32) -> Self {
        Self {
            min: frame_number,
            max: frame_number,
        }
    }

    fn add(&mut self, frame_number: u32) {
        self.min = self.min.min(frame_number);
        self.max = self.max.max(frame_number);
    }
}

/// Track identity of a frame label, as a `<label>.<index-or-empty>` string.
/// Labels may themselves contain dots, so decoding splits on the last one.
fn encode_track_uuid(label: &str, index: Option<i64>) -> String {
    match index {
        Some(index) => format!("{}.{}", label, index),
        None => format!("{}.", label),
    }
}

fn decode_track_uuid(uuid: &str) -> Option<(String, i64)> {
    let (label, index) = uuid.rsplit_once('.')?;
    if index.is_empty() {
        return None;
    }
    let index: i64 = index.parse().ok()?;
    Some((label.to_string(), index))
}

/// Extract the object trajectories from a frame-level label list field.
///
/// Returns one entry per sample in view order: `None` for samples with no
/// frames, otherwise the sample's trajectories in first-observed order.
pub async fn get_trajectories(
    source: &DatasetView,
    frame_field: &str,
) -> ClipsResult<Vec<Option<Vec<Trajectory>>>> {
    let field_path = format!("{}{}", FRAMES_PREFIX, frame_field);
    let kind =
        validation::validate_label_field(source.dataset(), &field_path, &LabelKind::list_kinds())
            .await?;
    let list_field = kind.list_field_name().ok_or_else(|| {
        ClipsError::validation(format!("Field '{}' holds no label list", field_path))
    })?;

    let labels_path = format!("{}.{}", field_path, list_field);
    let columns = source
        .values(&["frames.frame_number", labels_path.as_str()])
        .await?;

    let mut results = Vec::with_capacity(columns[0].len());
    for (numbers, labels) in columns[0].iter().zip(&columns[1]) {
        results.push(sample_trajectories(numbers, labels)?);
    }
    Ok(results)
}

fn sample_trajectories(numbers: &Value, labels: &Value) -> ClipsResult<Option<Vec<Trajectory>>> {
    let (Some(numbers), Some(labels)) = (numbers.as_array(), labels.as_array()) else {
        return Ok(None);
    };
    if labels.is_empty() {
        // no frames at all
        return Ok(None);
    }

    let mut order: Vec<(String, i64)> = Vec::new();
    let mut bounds: HashMap<(String, i64), Bounds> = HashMap::new();

    for (number, frame_labels) in numbers.iter().zip(labels) {
        let Some(frame_number) = number.as_int().and_then(|n| u32::try_from(n).ok()) else {
            continue;
        };
        let Some(elements) = frame_labels.as_array() else {
            continue;
        };

        for element in elements {
            let Some(fields) = element.as_map() else {
                continue;
            };
            let Some(label) = fields.get("label").and_then(Value::as_str) else {
                continue;
            };
            let index = fields.get("index").and_then(Value::as_int);

            let uuid = encode_track_uuid(label, index);
            let Some(key) = decode_track_uuid(&uuid) else {
                continue;
            };

            if let Some(b) = bounds.get_mut(&key) {
                b.add(frame_number);
            } else {
                order.push(key.clone());
                bounds.insert(key, Bounds::new(frame_number));
            }
        }
    }

    let mut trajectories = Vec::with_capacity(order.len());
    for (label, index) in order {
        let b = bounds[&(label.clone(), index)];
        trajectories.push(Trajectory {
            label,
            index,
            support: FrameSupport::new(b.min, b.max)?,
        });
    }
    Ok(Some(trajectories))
}
