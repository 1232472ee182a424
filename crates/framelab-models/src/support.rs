//! Frame support intervals.
//!
//! A support is the closed, inclusive `[first_frame, last_frame]` range of frame
//! numbers that a clip covers. Frame numbers are 1-based. Supports are stored as
//! two-element integer arrays so that pipeline slice/element operators can address
//! them positionally.

use std::fmt;

use framelab_store::{ToValue, Value};
use schemars::JsonSchema;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error produced when constructing an invalid support interval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupportError {
    #[error("Invalid support [{first}, {last}]: first_frame must be <= last_frame")]
    Inverted { first: u32, last: u32 },

    #[error("Invalid support: frame numbers are 1-based, got {0}")]
    ZeroFrame(u32),
}

/// A closed, inclusive frame-number interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameSupport {
    first_frame: u32,
    last_frame: u32,
}

impl FrameSupport {
    /// Create a new support, validating `first_frame <= last_frame`.
    pub fn new(first_frame: u32, last_frame: u32) -> Result<Self, SupportError> {
        if first_frame == 0 {
            return Err(SupportError::ZeroFrame(first_frame));
        }

        if first_frame > last_frame {
            return Err(SupportError::Inverted {
                first: first_frame,
                last: last_frame,
            });
        }

        Ok(Self {
            first_frame,
            last_frame,
        })
    }

    /// The first frame number in the interval.
    pub fn first_frame(&self) -> u32 {
        self.first_frame
    }

    /// The last frame number in the interval.
    pub fn last_frame(&self) -> u32 {
        self.last_frame
    }

    /// Number of frames covered, inclusive of both endpoints.
    pub fn len(&self) -> u32 {
        self.last_frame - self.first_frame + 1
    }

    /// Supports are never empty; provided for clippy symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the given frame number falls inside the interval.
    pub fn contains(&self, frame_number: u32) -> bool {
        frame_number >= self.first_frame && frame_number <= self.last_frame
    }

    /// Smallest interval covering both `self` and `other`.
    pub fn union(&self, other: &FrameSupport) -> FrameSupport {
        FrameSupport {
            first_frame: self.first_frame.min(other.first_frame),
            last_frame: self.last_frame.max(other.last_frame),
        }
    }
}

impl fmt::Display for FrameSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first_frame, self.last_frame)
    }
}

impl From<FrameSupport> for (u32, u32) {
    fn from(s: FrameSupport) -> Self {
        (s.first_frame, s.last_frame)
    }
}

impl TryFrom<(u32, u32)> for FrameSupport {
    type Error = SupportError;

    fn try_from((first, last): (u32, u32)) -> Result<Self, Self::Error> {
        FrameSupport::new(first, last)
    }
}

impl ToValue for FrameSupport {
    fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::Int(i64::from(self.first_frame)),
            Value::Int(i64::from(self.last_frame)),
        ])
    }
}

impl Serialize for FrameSupport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.first_frame)?;
        tup.serialize_element(&self.last_frame)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for FrameSupport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SupportVisitor;

        impl<'de> Visitor<'de> for SupportVisitor {
            type Value = FrameSupport;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [first_frame, last_frame] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let first: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let last: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;

                FrameSupport::new(first, last).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_tuple(2, SupportVisitor)
    }
}

impl JsonSchema for FrameSupport {
    fn schema_name() -> String {
        "FrameSupport".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        let item = gen.subschema_for::<u32>();
        schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::Array.into()),
            array: Some(Box::new(schemars::schema::ArrayValidation {
                items: Some(schemars::schema::SingleOrVec::Single(Box::new(item))),
                min_items: Some(2),
                max_items: Some(2),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_support_validation() {
        assert!(FrameSupport::new(1, 10).is_ok());
        assert!(FrameSupport::new(5, 5).is_ok());
        assert!(matches!(
            FrameSupport::new(10, 1),
            Err(SupportError::Inverted { first: 10, last: 1 })
        ));
        assert!(matches!(FrameSupport::new(0, 3), Err(SupportError::ZeroFrame(0))));
    }

    #[test]
    fn test_support_len_and_contains() {
        let s = FrameSupport::new(3, 7).unwrap();
        assert_eq!(s.len(), 5);
        assert!(s.contains(3));
        assert!(s.contains(7));
        assert!(!s.contains(8));
        assert!(!s.contains(2));
    }

    #[test]
    fn test_support_single_frame() {
        let s = FrameSupport::new(4, 4).unwrap();
        assert_eq!(s.len(), 1);
        assert!(s.contains(4));
    }

    #[test]
    fn test_support_serde_as_pair() {
        let s = FrameSupport::new(2, 9).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "[2,9]");

        let back: FrameSupport = serde_json::from_str("[2,9]").unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_support_deserialize_rejects_inverted() {
        let result: Result<FrameSupport, _> = serde_json::from_str("[9,2]");
        assert!(result.is_err());
    }

    #[test]
    fn test_support_union() {
        let a = FrameSupport::new(2, 5).unwrap();
        let b = FrameSupport::new(4, 9).unwrap();
        assert_eq!(a.union(&b), FrameSupport::new(2, 9).unwrap());
    }

    #[test]
    fn test_support_to_value() {
        let s = FrameSupport::new(2, 9).unwrap();
        assert_eq!(
            s.to_value(),
            Value::Array(vec![Value::Int(2), Value::Int(9)])
        );
    }
}
