//! Property tests for the framed channel.

use std::io::Cursor;

use proptest::prelude::*;
use serde_json::Value;
use twinrun_worker::channel::{FrameReader, FrameWriter, PREFIX_LEN};
use twinrun_worker::ChannelError;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Nested maps, sequences, strings, integers, booleans and null.
fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        ".*".prop_map(Value::from),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map(".{0,12}", inner, 0..8)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn values_survive_the_channel(values in prop::collection::vec(value_strategy(), 1..6)) {
        let mut wire = Vec::new();
        let mut writer = FrameWriter::new(&mut wire);
        for value in &values {
            writer.send(value).unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(wire));
        for value in &values {
            let received: Value = reader.receive().unwrap();
            prop_assert_eq!(&received, value);
        }
        prop_assert!(matches!(reader.read_frame(), Err(ChannelError::Closed)));
    }

    #[test]
    fn any_truncation_reports_closed(
        value in value_strategy(),
        cut in any::<prop::sample::Index>(),
    ) {
        let mut wire = Vec::new();
        FrameWriter::new(&mut wire).send(&value).unwrap();
        let keep = cut.index(wire.len());
        wire.truncate(keep);

        let mut reader = FrameReader::new(Cursor::new(wire));
        prop_assert!(matches!(reader.read_frame(), Err(ChannelError::Closed)));
    }
}

#[test]
fn length_prefix_counts_payload_bytes_only() {
    let mut wire = Vec::new();
    FrameWriter::new(&mut wire)
        .send(&serde_json::json!({"é": [1, 2]}))
        .unwrap();
    let len = u32::from_le_bytes(wire[..PREFIX_LEN].try_into().unwrap()) as usize;
    assert_eq!(len, wire.len() - PREFIX_LEN);
}
