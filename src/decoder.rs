//! MessagePack frame decoding and shape validation.
//!
//! The bridge never interprets individual point fields; it only needs to know
//! that a frame holds a sequence and how long that sequence is. Decoding is
//! therefore done at the value level with `rmpv`, keeping the point schema
//! opaque.

use rmpv::Value;
use thiserror::Error;

/// A single decoded point. Opaque to the bridge; forwarded downstream as part
/// of the original frame bytes, never re-encoded field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct Point(Value);

impl Point {
    /// Raw decoded value, for callers that do want to look inside.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Errors produced while decoding a frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not well-formed MessagePack.
    #[error("malformed frame: {0}")]
    Malformed(#[from] rmpv::decode::Error),
    /// Well-formed MessagePack, but the top-level value is not an array.
    #[error("frame is not a point sequence (got {found})")]
    NotASequence { found: &'static str },
    /// Valid top-level value followed by garbage.
    #[error("trailing bytes after frame payload ({remaining} left)")]
    TrailingBytes { remaining: usize },
}

/// Decode one frame into its point sequence.
///
/// Pure function. Returns the points in wire order; the sequence may be
/// empty — emptiness is a policy decision for the caller, not a decode
/// failure.
pub fn decode(frame: &[u8]) -> Result<Vec<Point>, DecodeError> {
    let mut rd = frame;
    let value = rmpv::decode::read_value(&mut rd)?;
    if !rd.is_empty() {
        return Err(DecodeError::TrailingBytes {
            remaining: rd.len(),
        });
    }
    match value {
        Value::Array(points) => Ok(points.into_iter().map(Point).collect()),
        other => Err(DecodeError::NotASequence {
            found: value_kind(&other),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "ext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestPoint {
        angle: f64,
        distance: f64,
        quality: u8,
    }

    fn encode_points(n: usize) -> Vec<u8> {
        let points: Vec<TestPoint> = (0..n)
            .map(|i| TestPoint {
                angle: i as f64 * 0.01,
                distance: 1.5 + i as f64,
                quality: (i % 256) as u8,
            })
            .collect();
        rmp_serde::to_vec_named(&points).unwrap()
    }

    #[test]
    fn decodes_point_count() {
        for n in [1, 5, 360] {
            let frame = encode_points(n);
            let points = decode(&frame).unwrap();
            assert_eq!(points.len(), n);
        }
    }

    #[test]
    fn preserves_wire_order() {
        let frame = encode_points(8);
        let points = decode(&frame).unwrap();
        for (i, point) in points.iter().enumerate() {
            // Points encode as maps; check the angle field tracks the index.
            let Value::Map(fields) = &point.0 else {
                panic!("expected map point, got {:?}", point.0);
            };
            let angle = fields
                .iter()
                .find(|(k, _)| k.as_str() == Some("angle"))
                .and_then(|(_, v)| v.as_f64())
                .unwrap();
            assert!((angle - i as f64 * 0.01).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_sequence_is_valid() {
        let frame = rmp_serde::to_vec_named(&Vec::<TestPoint>::new()).unwrap();
        let points = decode(&frame).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let mut frame = encode_points(10);
        frame.truncate(frame.len() / 2);
        assert!(matches!(decode(&frame), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn empty_bytes_are_malformed() {
        assert!(matches!(decode(&[]), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn non_array_payload_rejected() {
        let frame = rmp_serde::to_vec_named(&42u32).unwrap();
        let err = decode(&frame).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::NotASequence { found: "integer" }
        ));
    }

    #[test]
    fn map_payload_rejected() {
        let frame = rmp_serde::to_vec_named(&TestPoint {
            angle: 0.0,
            distance: 1.0,
            quality: 9,
        })
        .unwrap();
        let err = decode(&frame).unwrap_err();
        assert!(matches!(err, DecodeError::NotASequence { found: "map" }));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut frame = encode_points(3);
        frame.extend_from_slice(&[0xde, 0xad]);
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::TrailingBytes { remaining: 2 })
        ));
    }

    #[test]
    fn decode_never_panics_on_fuzz_bytes() {
        // A handful of adversarial prefixes; each must fail cleanly.
        let cases: &[&[u8]] = &[
            &[0xc1],             // reserved marker
            &[0xdd, 0xff, 0xff], // truncated array32 header
            &[0x91],             // fixarray(1) with no element
            &[0xd9, 0x20],       // truncated str8
        ];
        for bytes in cases {
            assert!(decode(bytes).is_err());
        }
    }
}
