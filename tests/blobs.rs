use trikv::{
    Arena, CollectionId, Options, ReadSpec, SizeEstimate, Store, Strided, WriteSpec, LEN_MISSING,
};

const COL: CollectionId = CollectionId::MAIN;

fn put(store: &Store, key: i64, value: Option<&[u8]>) {
    store
        .write(
            None,
            &WriteSpec::puts_in(&COL, &[key], std::slice::from_ref(&value)),
            Options::DEFAULT,
        )
        .unwrap();
}

#[test]
fn roundtrip_empty_and_missing_are_distinct() {
    let store = Store::in_memory();
    let mut arena = Arena::new();

    put(&store, 1, Some(b"payload"));
    put(&store, 2, Some(b""));

    let view = store
        .read(None, &ReadSpec::keys_in(&COL, &[1, 2, 3]), Options::DEFAULT, &mut arena)
        .unwrap();
    assert_eq!(view.get(0), Some(&b"payload"[..]));
    assert_eq!(view.get(1), Some(&b""[..]));
    assert_eq!(view.length(1), 0);
    assert_eq!(view.get(2), None);
    assert_eq!(view.length(2), LEN_MISSING);
}

#[test]
fn erase_then_read_yields_missing() {
    let store = Store::in_memory();
    let mut arena = Arena::new();

    put(&store, 5, Some(b"gone soon"));
    put(&store, 5, None);

    let view = store
        .read(None, &ReadSpec::keys_in(&COL, &[5]), Options::DEFAULT, &mut arena)
        .unwrap();
    assert_eq!(view.get(0), None);
}

#[test]
fn unsorted_duplicated_batch_is_deduplicated_and_scattered() {
    let store = Store::in_memory();
    let mut arena = Arena::new();

    put(&store, 1, Some(b"one"));
    put(&store, 3, Some(b"three"));
    put(&store, 5, Some(b"five"));

    // The literal scenario: keys [5, 1, 5, 3] in one call.
    let view = store
        .read(
            None,
            &ReadSpec::keys_in(&COL, &[5, 1, 5, 3]),
            Options::DEFAULT,
            &mut arena,
        )
        .unwrap();
    assert_eq!(view.count(), 4);
    assert_eq!(view.get(0), Some(&b"five"[..]));
    assert_eq!(view.get(1), Some(&b"one"[..]));
    assert_eq!(view.get(2), Some(&b"five"[..]));
    assert_eq!(view.get(3), Some(&b"three"[..]));

    // The substrate saw the reduced ascending set.
    let prepared: Vec<i64> = arena.prepared_keys().iter().map(|a| a.key).collect();
    assert_eq!(prepared, vec![1, 3, 5]);
    assert_eq!(store.engine().metrics().reads, 3);
}

#[test]
fn broadcast_payload_reaches_every_key() {
    let store = Store::in_memory();
    let mut arena = Arena::new();

    let keys = [10i64, 11, 12];
    let payload: Option<&[u8]> = Some(b"same");
    store
        .write(
            None,
            &WriteSpec::new(
                Strided::repeat(&COL),
                Strided::new(&keys),
                Strided::repeat(&payload),
                keys.len(),
            ),
            Options::DEFAULT,
        )
        .unwrap();

    let view = store
        .read(None, &ReadSpec::keys_in(&COL, &keys), Options::DEFAULT, &mut arena)
        .unwrap();
    for index in 0..keys.len() {
        assert_eq!(view.get(index), Some(&b"same"[..]));
    }
}

#[test]
fn lengths_only_reports_sizes_without_payloads() {
    let store = Store::in_memory();
    let mut arena = Arena::new();

    put(&store, 1, Some(b"12345"));
    let view = store
        .read(
            None,
            &ReadSpec::keys_in(&COL, &[1, 2]),
            Options {
                lengths_only: true,
                ..Options::DEFAULT
            },
            &mut arena,
        )
        .unwrap();
    assert_eq!(view.length(0), 5);
    assert_eq!(view.length(1), LEN_MISSING);
}

#[test]
fn empty_batch_is_a_noop() {
    let store = Store::in_memory();
    let mut arena = Arena::new();
    let view = store
        .read(None, &ReadSpec::keys_in(&COL, &[]), Options::DEFAULT, &mut arena)
        .unwrap();
    assert_eq!(view.count(), 0);
    store
        .write(None, &WriteSpec::puts_in(&COL, &[], &[]), Options::DEFAULT)
        .unwrap();
}

#[test]
fn scan_and_size_estimates() {
    let store = Store::in_memory();

    for key in [2i64, 4, 6, 8] {
        put(&store, key, Some(b"xx"));
    }
    assert_eq!(store.scan(None, COL, 3, 10).unwrap(), vec![4, 6, 8]);
    assert_eq!(store.scan(None, COL, i64::MIN, 2).unwrap(), vec![2, 4]);

    let estimates = store
        .size_estimates(COL, &[(i64::MIN, i64::MAX), (5, 9)])
        .unwrap();
    assert_eq!(
        estimates[0],
        SizeEstimate {
            cardinality: 4,
            bytes_total: 8
        }
    );
    assert_eq!(
        estimates[1],
        SizeEstimate {
            cardinality: 2,
            bytes_total: 4
        }
    );
}

#[test]
fn transactional_writes_are_invisible_until_commit() {
    let store = Store::in_memory();
    let mut arena = Arena::new();

    let mut txn = store.begin().unwrap();
    let payload: Option<&[u8]> = Some(b"later");
    store
        .write(
            Some(&mut txn),
            &WriteSpec::puts_in(&COL, &[42], std::slice::from_ref(&payload)),
            Options::DEFAULT,
        )
        .unwrap();

    let outside = store
        .read(None, &ReadSpec::keys_in(&COL, &[42]), Options::DEFAULT, &mut arena)
        .unwrap();
    assert_eq!(outside.get(0), None);

    store.commit(txn, Options::DEFAULT).unwrap();
    let after = store
        .read(None, &ReadSpec::keys_in(&COL, &[42]), Options::DEFAULT, &mut arena)
        .unwrap();
    assert_eq!(after.get(0), Some(&b"later"[..]));
}

#[test]
fn tracked_reads_conflict_with_interleaved_writes() {
    let store = Store::in_memory();
    let mut arena = Arena::new();

    put(&store, 7, Some(b"v1"));
    let mut txn = store.begin().unwrap();
    store
        .read(
            Some(&mut txn),
            &ReadSpec::keys_in(&COL, &[7]),
            Options {
                track: true,
                ..Options::DEFAULT
            },
            &mut arena,
        )
        .unwrap();

    put(&store, 7, Some(b"v2"));
    let err = store.commit(txn, Options::DEFAULT).unwrap_err();
    assert!(err.is_retryable());
}
