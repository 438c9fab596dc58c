//! Property-Based Tests for Store Module
//!
//! Uses proptest to check codec round trips and store read/write consistency
//! against the in-process backend.

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::codec::{CacheValue, Codec, CompressorKind, SerializerKind};
use crate::config::StoreConfig;
use crate::remote::MemoryBackend;
use crate::store::{CacheDefinition, KeyAwareStore, KeyValueStore, RedisStore, SearchableStore};

// == Strategies ==
/// Generates store keys
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,32}"
}

/// Generates every scalar kind with finite floats
fn scalar_strategy() -> impl Strategy<Value = CacheValue> {
    prop_oneof![
        Just(CacheValue::Null),
        any::<bool>().prop_map(CacheValue::Bool),
        any::<i64>().prop_map(CacheValue::Int),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(CacheValue::Float),
        ".{0,64}".prop_map(CacheValue::Str),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(CacheValue::Bytes),
    ]
}

/// Generates nested values up to three levels deep
fn value_strategy() -> impl Strategy<Value = CacheValue> {
    scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(CacheValue::List),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|m: BTreeMap<String, CacheValue>| CacheValue::Map(m)),
        ]
    })
}

fn non_finite_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![Just(f64::INFINITY), Just(f64::NEG_INFINITY), Just(f64::NAN)]
}

fn compressor_strategy() -> impl Strategy<Value = CompressorKind> {
    prop_oneof![
        Just(CompressorKind::None),
        Just(CompressorKind::Gzip),
        Just(CompressorKind::Zstd),
    ]
}

#[derive(Debug, Clone)]
enum StoreOp {
    Set { key: String, value: CacheValue },
    Delete { key: String },
    Purge,
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        6 => (key_strategy(), value_strategy()).prop_map(|(key, value)| StoreOp::Set { key, value }),
        3 => key_strategy().prop_map(|key| StoreOp::Delete { key }),
        1 => Just(StoreOp::Purge),
    ]
}

fn store_on(backend: &MemoryBackend) -> RedisStore {
    RedisStore::with_backend(
        "prop",
        CacheDefinition::new("prop/store").with_ttl(3600),
        &StoreConfig::default(),
        Arc::new(backend.clone()),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Structured serializers round-trip any value under any compressor
    #[test]
    fn prop_codec_roundtrip(
        value in value_strategy(),
        compact in any::<bool>(),
        compressor in compressor_strategy(),
    ) {
        let serializer = if compact { SerializerKind::Compact } else { SerializerKind::Generic };
        let codec = Codec::new(serializer, compressor);

        let payload = codec.encode(&value).unwrap();
        prop_assert_eq!(codec.decode(Some(&payload)).unwrap(), Some(value));
    }

    // Non-finite floats are refused wherever they sit in a value
    #[test]
    fn prop_non_finite_floats_rejected(
        value in value_strategy(),
        bad in non_finite_strategy(),
        compact in any::<bool>(),
        compressor in compressor_strategy(),
    ) {
        let serializer = if compact { SerializerKind::Compact } else { SerializerKind::Generic };
        let codec = Codec::new(serializer, compressor);

        let mut map = BTreeMap::new();
        map.insert("bad".to_string(), CacheValue::Float(bad));
        let nested = CacheValue::List(vec![value, CacheValue::Map(map)]);

        prop_assert!(codec.encode(&CacheValue::Float(bad)).is_err());
        prop_assert!(codec.encode(&nested).is_err());
    }

    // Passthrough serializer round-trips strings under any compressor
    #[test]
    fn prop_passthrough_roundtrip(text in ".{0,128}", compressor in compressor_strategy()) {
        let codec = Codec::new(SerializerKind::None, compressor);
        let value = CacheValue::Str(text);

        let payload = codec.encode(&value).unwrap();
        prop_assert_eq!(codec.decode(Some(&payload)).unwrap(), Some(value));
    }

    // Store contents always match a map model after any operation sequence
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(store_op_strategy(), 1..40)) {
        tokio_test::block_on(async {
            let backend = MemoryBackend::new();
            let store = store_on(&backend);
            let mut model: HashMap<String, CacheValue> = HashMap::new();

            for op in ops {
                match op {
                    StoreOp::Set { key, value } => {
                        prop_assert!(store.set(&key, &value).await);
                        model.insert(key, value);
                    }
                    StoreOp::Delete { key } => {
                        prop_assert_eq!(store.delete(&key).await, model.remove(&key).is_some());
                    }
                    StoreOp::Purge => {
                        prop_assert!(store.purge().await);
                        model.clear();
                    }
                }
            }

            let mut expected: Vec<String> = model.keys().cloned().collect();
            expected.sort();
            let mut found = store.find_all().await;
            found.sort();
            prop_assert_eq!(found, expected);

            for (key, value) in &model {
                prop_assert!(store.has(key).await);
                let got = store.get(key).await;
                prop_assert_eq!(got.as_ref(), Some(value));
            }
            Ok(())
        })?;
    }

    // Batch reads return values in request order, with misses in place
    #[test]
    fn prop_get_many_aligned(
        stored in prop::collection::btree_map(key_strategy(), scalar_strategy(), 0..20),
        missing in prop::collection::vec("[#]{1,4}", 0..5),
    ) {
        tokio_test::block_on(async {
            let backend = MemoryBackend::new();
            let store = store_on(&backend);
            let pairs: Vec<(String, CacheValue)> = stored.clone().into_iter().collect();
            prop_assert_eq!(store.set_many(&pairs).await, pairs.len());

            let mut keys: Vec<String> = missing.clone();
            keys.extend(stored.keys().rev().cloned());
            let values = store.get_many(&keys).await;

            prop_assert_eq!(values.len(), keys.len());
            for (key, value) in keys.iter().zip(values) {
                prop_assert_eq!(value.as_ref(), stored.get(key));
            }
            Ok(())
        })?;
    }
}
