use proptest::prelude::*;
use serde_json::{json, Value};
use trikv::{
    Arena, CollectionId, ColumnType, DocFormat, DocValue, Edge, FieldRef, Options, ReadSpec, Role,
    Store, Strided, WriteSpec, EDGE_ID_ANY,
};

const COL: CollectionId = CollectionId::MAIN;

fn arb_json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|i| json!(i)),
        (-1.0e9f64..1.0e9).prop_map(|f| json!(f)),
        "[a-z0-9]{0,8}".prop_map(Value::String),
    ]
}

fn arb_json() -> impl Strategy<Value = Value> {
    arb_json_leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn arb_json_document() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,6}", arb_json(), 0..5)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

fn write_json(store: &Store, arena: &mut Arena, key: i64, doc: &Value, format: DocFormat) {
    let text = serde_json::to_vec(doc).unwrap();
    let payload: Option<&[u8]> = Some(&text);
    store
        .docs_write(
            None,
            &WriteSpec::puts_in(&COL, &[key], std::slice::from_ref(&payload)),
            None,
            format,
            Options::DEFAULT,
            arena,
        )
        .unwrap();
}

fn read_json(store: &Store, arena: &mut Arena, key: i64) -> Value {
    let view = store
        .docs_read(
            None,
            &ReadSpec::keys_in(&COL, &[key]),
            None,
            DocFormat::Json,
            Options::DEFAULT,
            arena,
        )
        .unwrap();
    let bytes = view.get(0).expect("document present");
    let text = std::str::from_utf8(bytes).unwrap().trim_end_matches('\0');
    serde_json::from_str(text).unwrap()
}

proptest! {
    #[test]
    fn prop_blob_roundtrip(entries in prop::collection::vec((0i64..32, prop::collection::vec(any::<u8>(), 0..64)), 1..20)) {
        let store = Store::in_memory();
        let mut arena = Arena::new();
        let mut model = std::collections::BTreeMap::new();
        for (key, bytes) in &entries {
            let payload: Option<&[u8]> = Some(bytes);
            store
                .write(
                    None,
                    &WriteSpec::puts_in(&COL, std::slice::from_ref(key), std::slice::from_ref(&payload)),
                    Options::DEFAULT,
                )
                .unwrap();
            model.insert(*key, bytes.clone());
        }
        for (key, expected) in &model {
            let view = store
                .read(None, &ReadSpec::keys_in(&COL, std::slice::from_ref(key)), Options::DEFAULT, &mut arena)
                .unwrap();
            prop_assert_eq!(view.get(0), Some(expected.as_slice()));
        }
    }

    #[test]
    fn prop_document_roundtrip_is_semantically_stable(doc in arb_json_document()) {
        let store = Store::in_memory();
        let mut arena = Arena::new();
        let expected = DocValue::from(doc.clone());

        for format in [DocFormat::Json, DocFormat::MsgPack, DocFormat::Bson, DocFormat::Cbor, DocFormat::UbJson] {
            // Export in `format`, re-ingest, read back as text JSON.
            write_json(&store, &mut arena, 1, &doc, DocFormat::Json);
            let exported = store
                .docs_read(None, &ReadSpec::keys_in(&COL, &[1]), None, format, Options::DEFAULT, &mut arena)
                .unwrap()
                .get(0)
                .unwrap()
                .to_vec();
            let payload: Option<&[u8]> = Some(&exported);
            store
                .docs_write(
                    None,
                    &WriteSpec::puts_in(&COL, &[2], std::slice::from_ref(&payload)),
                    None,
                    format,
                    Options::DEFAULT,
                    &mut arena,
                )
                .unwrap();
            let back = DocValue::from(read_json(&store, &mut arena, 2));
            prop_assert_eq!(back, expected.clone(), "format {:?}", format);
        }
    }

    #[test]
    fn prop_flat_merge_patches_compose(
        base in arb_json_document(),
        p1 in prop::collection::btree_map("[a-z]{1,3}", arb_json_leaf(), 0..5),
        p2 in prop::collection::btree_map("[a-z]{1,3}", arb_json_leaf(), 0..5),
    ) {
        let store = Store::in_memory();
        let mut arena = Arena::new();
        let patch1 = Value::Object(p1.clone().into_iter().collect());
        let patch2 = Value::Object(p2.clone().into_iter().collect());

        // Sequential application.
        write_json(&store, &mut arena, 1, &base, DocFormat::Json);
        write_json(&store, &mut arena, 1, &patch1, DocFormat::JsonMergePatch);
        write_json(&store, &mut arena, 1, &patch2, DocFormat::JsonMergePatch);
        let sequential = read_json(&store, &mut arena, 1);

        // One composed flat patch: later members win, nulls survive.
        let mut merged = p1;
        merged.extend(p2);
        let composed = Value::Object(merged.into_iter().collect());
        write_json(&store, &mut arena, 2, &base, DocFormat::Json);
        write_json(&store, &mut arena, 2, &composed, DocFormat::JsonMergePatch);
        let at_once = read_json(&store, &mut arena, 2);

        prop_assert_eq!(DocValue::from(sequential), DocValue::from(at_once));
    }

    #[test]
    fn prop_read_outputs_follow_any_task_order(keys in prop::collection::vec(0i64..12, 1..24)) {
        let store = Store::in_memory();
        let mut arena = Arena::new();
        for key in 0i64..12 {
            if key % 3 != 0 {
                let bytes = key.to_le_bytes();
                let payload: Option<&[u8]> = Some(&bytes);
                store
                    .write(
                        None,
                        &WriteSpec::puts_in(&COL, &[key], std::slice::from_ref(&payload)),
                        Options::DEFAULT,
                    )
                    .unwrap();
            }
        }

        let batched: Vec<Option<Vec<u8>>> = {
            let view = store
                .read(None, &ReadSpec::keys_in(&COL, &keys), Options::DEFAULT, &mut arena)
                .unwrap();
            (0..keys.len()).map(|i| view.get(i).map(<[u8]>::to_vec)).collect()
        };
        for (index, key) in keys.iter().enumerate() {
            let view = store
                .read(None, &ReadSpec::keys_in(&COL, std::slice::from_ref(key)), Options::DEFAULT, &mut arena)
                .unwrap();
            prop_assert_eq!(&batched[index], &view.get(0).map(<[u8]>::to_vec));
        }
    }

    #[test]
    fn prop_gather_outcomes_partition_exactly(
        doc in arb_json_document(),
        ty in prop_oneof![
            Just(ColumnType::Bool), Just(ColumnType::I8), Just(ColumnType::I32),
            Just(ColumnType::I64), Just(ColumnType::U16), Just(ColumnType::U64),
            Just(ColumnType::F32), Just(ColumnType::F64), Just(ColumnType::Str),
        ],
        field in "[a-z]{1,6}",
    ) {
        let store = Store::in_memory();
        let mut arena = Arena::new();
        write_json(&store, &mut arena, 1, &doc, DocFormat::Json);

        let request = [FieldRef::parse(&field).unwrap()];
        let columns = store
            .docs_gather(None, &ReadSpec::keys_in(&COL, &[1, 2]), &request, &[ty], Options::DEFAULT, &mut arena)
            .unwrap();
        for row in 0..2 {
            let valid = columns.is_valid(0, row);
            let convert = columns.converted(0, row);
            let collide = columns.collided(0, row);
            // A slot is in exactly one of valid-exact, valid-converted,
            // collided, absent.
            prop_assert!(!(valid && collide));
            if convert {
                prop_assert!(valid);
            }
        }
        // Row 1 reads a missing document: absent across the board.
        prop_assert!(!columns.is_valid(0, 1) && !columns.collided(0, 1) && !columns.converted(0, 1));
    }
}

#[derive(Debug, Clone)]
enum GraphOp {
    Upsert(i64, i64, i64),
    RemoveEdge(i64, i64, i64),
    RemoveVertex(i64, Role),
}

fn arb_graph_op() -> impl Strategy<Value = GraphOp> {
    let vertex = 0i64..8;
    let edge_id = prop_oneof![Just(EDGE_ID_ANY), (0i64..4)];
    prop_oneof![
        (vertex.clone(), vertex.clone(), 0i64..4).prop_map(|(u, v, e)| GraphOp::Upsert(u, v, e)),
        (vertex.clone(), vertex.clone(), edge_id).prop_map(|(u, v, e)| GraphOp::RemoveEdge(u, v, e)),
        (
            vertex,
            prop_oneof![Just(Role::Source), Just(Role::Target), Just(Role::Any)]
        )
            .prop_map(|(v, role)| GraphOp::RemoveVertex(v, role)),
    ]
}

proptest! {
    #[test]
    fn prop_adjacency_stays_symmetric(ops in prop::collection::vec(arb_graph_op(), 1..40)) {
        let store = Store::in_memory();
        let mut arena = Arena::new();
        let graph = store.graph(COL);

        for op in ops {
            match op {
                GraphOp::Upsert(u, v, e) => {
                    store
                        .graph_upsert_edges(None, Strided::repeat(&COL), &[Edge::new(u, v, e)], Options::DEFAULT, &mut arena)
                        .unwrap();
                }
                GraphOp::RemoveEdge(u, v, e) => {
                    store
                        .graph_remove_edges(None, Strided::repeat(&COL), &[Edge::new(u, v, e)], Options::DEFAULT, &mut arena)
                        .unwrap();
                }
                GraphOp::RemoveVertex(v, role) => {
                    store
                        .graph_remove_vertices(
                            None,
                            Strided::repeat(&COL),
                            &[v],
                            Strided::repeat(&role),
                            Options::DEFAULT,
                            &mut arena,
                        )
                        .unwrap();
                }
            }
        }

        for v in 0i64..8 {
            let out_edges = graph.edges(None, v, Role::Source, &mut arena).unwrap().to_vec();
            for edge in out_edges {
                let mirror = graph.edges(None, edge.target, Role::Target, &mut arena).unwrap().to_vec();
                prop_assert!(mirror.contains(&edge), "out-record {:?} lacks its in-mirror", edge);
            }
            let in_edges = graph.edges(None, v, Role::Target, &mut arena).unwrap().to_vec();
            for edge in in_edges {
                let mirror = graph.edges(None, edge.source, Role::Source, &mut arena).unwrap().to_vec();
                prop_assert!(mirror.contains(&edge), "in-record {:?} lacks its out-mirror", edge);
            }
        }
    }
}
