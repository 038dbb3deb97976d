//! Property tests for the universal codec guarantees: round-trips,
//! decoder totality, encoder rejection and metadata consistency.

use std::collections::BTreeMap;

use proptest::prelude::*;

use perspec::composite::{
    ChoiceAlternative, ChoiceCodec, SequenceCodec, SequenceField, SequenceOfCodec,
};
use perspec::primitives::IntegerCodec;
use perspec::strings::{CharacterStringCodec, OctetStringCodec};
use perspec::{
    BitBuffer, Codec, IntegerConstraints, SchemaField, SchemaNode, SizeConstraints, SizeDef,
    Value, build_all, strip_metadata,
};

fn u8_codec() -> IntegerCodec {
    IntegerCodec::new(IntegerConstraints::range(0, 255))
}

/// A mixed-shape sequence used by several properties: a mandatory integer,
/// an optional string, a defaulted boolean and a list.
fn sample_codec() -> Codec {
    SequenceCodec::new(
        vec![
            SequenceField::required("id", IntegerCodec::new(IntegerConstraints::range(0, 9999))),
            SequenceField::optional(
                "tag",
                CharacterStringCodec::ia5(SizeConstraints::bounded(0, 16)),
            ),
            SequenceField::defaulted(
                "flag",
                perspec::primitives::BooleanCodec::new(),
                Value::Boolean(false),
            ),
            SequenceField::optional(
                "data",
                SequenceOfCodec::new(u8_codec(), SizeConstraints::unconstrained()),
            ),
        ],
        None,
    )
    .into()
}

fn sample_value() -> impl Strategy<Value = Value> {
    (
        0i64..=9999,
        proptest::option::of("[ -~]{0,16}"),
        any::<bool>(),
        proptest::option::of(proptest::collection::vec(0i64..=255, 0..20)),
    )
        .prop_map(|(id, tag, flag, data)| {
            let mut map = BTreeMap::from([
                ("id".to_string(), Value::Integer(id)),
                ("flag".to_string(), Value::Boolean(flag)),
            ]);
            if let Some(tag) = tag {
                map.insert("tag".to_string(), Value::Text(tag));
            }
            if let Some(data) = data {
                map.insert(
                    "data".to_string(),
                    Value::SequenceOf(data.into_iter().map(Value::Integer).collect()),
                );
            }
            Value::Sequence(map)
        })
}

proptest! {
    #[test]
    fn constrained_integer_round_trips(
        (min, span, offset) in (-1_000_000i64..1_000_000, 0i64..2_000_000, 0.0f64..=1.0)
    ) {
        let max = min + span;
        let v = min + (span as f64 * offset) as i64;
        let codec: Codec = IntegerCodec::new(IntegerConstraints::range(min, max)).into();

        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(v)).unwrap();
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), Value::Integer(v));
        prop_assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn unconstrained_integer_round_trips(v in any::<i64>()) {
        let codec: Codec = IntegerCodec::new(IntegerConstraints::unconstrained()).into();
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(v)).unwrap();
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), Value::Integer(v));
    }

    #[test]
    fn semi_constrained_integer_round_trips(min in -1000i64..1000, delta in 0i64..1_000_000) {
        let codec: Codec = IntegerCodec::new(IntegerConstraints::at_least(min)).into();
        let v = min + delta;
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Integer(v)).unwrap();
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), Value::Integer(v));
    }

    #[test]
    fn octet_string_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..300)) {
        let codec: Codec = OctetStringCodec::new(SizeConstraints::unconstrained()).into();
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::OctetString(bytes.clone())).unwrap();
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), Value::OctetString(bytes));
    }

    #[test]
    fn utf8_string_round_trips(text in "\\PC{0,40}") {
        let codec: Codec = CharacterStringCodec::utf8(SizeConstraints::unconstrained()).into();
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &Value::Text(text.clone())).unwrap();
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), Value::Text(text));
    }

    #[test]
    fn sample_sequence_round_trips(value in sample_value()) {
        let codec = sample_codec();
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &value).unwrap();

        // `flag` always appears in the generated map, so the decode (which
        // reinstates the default when it was elided) reports the same map.
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), value);
    }

    #[test]
    fn decoder_is_total_on_random_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let codecs: Vec<Codec> = vec![
            sample_codec(),
            u8_codec().into(),
            IntegerCodec::new(IntegerConstraints::unconstrained()).into(),
            OctetStringCodec::new(SizeConstraints::unconstrained()).into(),
            CharacterStringCodec::ia5(SizeConstraints::bounded(0, 16)).into(),
            perspec::primitives::ObjectIdentifierCodec::new().into(),
            ChoiceCodec::new(
                vec![
                    ChoiceAlternative::new("a", u8_codec()),
                    ChoiceAlternative::new("b", perspec::primitives::BooleanCodec::new()),
                ],
                Some(vec![]),
            ).into(),
        ];

        for codec in &codecs {
            let mut buf = BitBuffer::from_bytes(&bytes);
            // Either a value or a typed error; never a panic.
            let _ = codec.decode(&mut buf);

            let mut buf = BitBuffer::from_bytes(&bytes);
            let _ = codec.decode_with_metadata(&mut buf);
        }
    }

    #[test]
    fn encoder_rejection_restores_buffer(
        prefix_bits in 0usize..20,
        v in 10_000i64..100_000,
    ) {
        let codec: Codec = IntegerCodec::new(IntegerConstraints::range(0, 9999)).into();
        let mut buf = BitBuffer::new();
        for i in 0..prefix_bits {
            buf.write_bit(i % 2 == 0);
        }
        let before = buf.to_bytes();

        prop_assert!(codec.encode(&mut buf, &Value::Integer(v)).is_err());
        prop_assert_eq!(buf.bit_len(), prefix_bits);
        prop_assert_eq!(buf.to_bytes(), before);
    }

    #[test]
    fn strip_metadata_matches_plain_decode(value in sample_value()) {
        let codec = sample_codec();
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &value).unwrap();
        let bytes = buf.to_bytes();

        let mut plain = BitBuffer::from_bytes_bits(&bytes, buf.bit_len()).unwrap();
        let mut meta = BitBuffer::from_bytes_bits(&bytes, buf.bit_len()).unwrap();

        let decoded = codec.decode(&mut plain).unwrap();
        let node = codec.decode_with_metadata(&mut meta).unwrap();

        prop_assert_eq!(strip_metadata(&node), decoded);
        prop_assert_eq!(node.meta.bit_length, meta.read_position());
        prop_assert_eq!(plain.read_position(), meta.read_position());
    }

    #[test]
    fn raw_bytes_reproduce_the_source_region(value in sample_value()) {
        let codec = sample_codec();
        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &value).unwrap();

        let node = {
            let mut decode_buf = BitBuffer::from_bytes_bits(&buf.to_bytes(), buf.bit_len()).unwrap();
            codec.decode_with_metadata(&mut decode_buf).unwrap()
        };

        // The root starts at bit 0, so its raw bytes are the source bytes
        // with trailing bits zeroed, which the encoder guarantees anyway.
        prop_assert_eq!(node.meta.bit_offset, 0);
        prop_assert_eq!(node.meta.raw_bytes, buf.to_bytes());
    }

    #[test]
    fn recursive_schema_round_trips(values in proptest::collection::vec(
        proptest::collection::vec(0i64..=255, 0..4),
        0..4,
    )) {
        let registry = BTreeMap::from([(
            "TreeNode".to_string(),
            SchemaNode::Sequence {
                fields: vec![
                    SchemaField::new(
                        "value",
                        SchemaNode::Integer { min: Some(0), max: Some(255), extensible: false },
                    ),
                    SchemaField::optional(
                        "children",
                        SchemaNode::SequenceOf {
                            item: Box::new(SchemaNode::Ref { name: "TreeNode".to_string() }),
                            size: SizeDef::default(),
                        },
                    ),
                ],
                extension_fields: None,
            },
        )]);
        let codecs = build_all(&registry).unwrap();
        let codec = &codecs["TreeNode"];

        // A three-level tree shaped by the generated value matrix.
        let leaf = |v: i64| Value::Sequence(BTreeMap::from([
            ("value".to_string(), Value::Integer(v)),
        ]));
        let tree = Value::Sequence(BTreeMap::from([
            ("value".to_string(), Value::Integer(0)),
            ("children".to_string(), Value::SequenceOf(
                values.iter().map(|grandchildren| Value::Sequence(BTreeMap::from([
                    ("value".to_string(), Value::Integer(grandchildren.len() as i64)),
                    ("children".to_string(), Value::SequenceOf(
                        grandchildren.iter().map(|&v| leaf(v)).collect(),
                    )),
                ]))).collect(),
            )),
        ]));

        let mut buf = BitBuffer::new();
        codec.encode(&mut buf, &tree).unwrap();
        prop_assert_eq!(codec.decode(&mut buf).unwrap(), tree);
    }
}
