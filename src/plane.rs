//! Batched data-plane shared by every modality.
//!
//! Reads prepare the task batch for the substrate: already ascending and
//! duplicate-free batches are forwarded as-is, anything else is sorted
//! and deduplicated first to turn random point lookups into one ordered
//! pass, and the reduced results are scattered back to the caller's task
//! order afterwards. Writes pass through in caller order.

use tracing::trace;

use crate::arena::Arena;
use crate::error::Result;
use crate::strided::{ReadSpec, WriteSpec};
use crate::substrate::{KvEngine, ReadOptions, WriteOptions};
use crate::types::{Address, Options};

fn ascending_unique(tasks: &[Address]) -> bool {
    tasks.windows(2).all(|pair| pair[0] < pair[1])
}

/// Reborrows an optional transaction handle for a sub-call.
pub(crate) fn reborrow<'a, T>(txn: &'a mut Option<&mut T>) -> Option<&'a mut T> {
    match txn {
        Some(txn) => Some(txn),
        None => None,
    }
}

/// Batched read. On return the arena tape holds one entry per task in
/// the caller's task order, and [`Arena::prepared_keys`] holds the
/// sorted-unique address set the substrate actually served.
pub(crate) fn read<E: KvEngine>(
    engine: &E,
    txn: Option<&mut E::Txn>,
    spec: &ReadSpec<'_>,
    opts: Options,
    arena: &mut Arena,
) -> Result<()> {
    spec.check()?;
    arena.tape.clear();
    arena.keys.clear();
    if spec.count == 0 {
        return Ok(());
    }

    arena.keys.try_reserve(spec.count)?;
    for index in 0..spec.count {
        arena.keys.push(spec.address(index));
    }

    let read_opts = ReadOptions {
        track: opts.track,
        lengths_only: opts.lengths_only,
    };

    if ascending_unique(&arena.keys) {
        let tasks = std::mem::take(&mut arena.keys);
        let outcome = engine.read(txn, &tasks, read_opts, arena);
        arena.keys = tasks;
        trace!(tasks = spec.count, path = "fast", "plane.read");
        return outcome;
    }

    let mut task_addrs = Vec::new();
    task_addrs.try_reserve(spec.count)?;
    task_addrs.extend_from_slice(&arena.keys);
    arena.keys.sort_unstable();
    arena.keys.dedup();

    let unique = std::mem::take(&mut arena.keys);
    let outcome = engine.read(txn, &unique, read_opts, arena);
    arena.keys = unique;
    outcome?;

    // Scatter the reduced results back to task order. Every task address
    // is present in the sorted set by construction.
    let scatter: Vec<usize> = task_addrs
        .iter()
        .map(|addr| {
            arena
                .keys
                .binary_search(addr)
                .expect("task address missing from its own sorted batch")
        })
        .collect();
    arena.tape.scatter(&scatter)?;
    trace!(
        tasks = spec.count,
        unique = arena.keys.len(),
        path = "sorted",
        "plane.read"
    );
    Ok(())
}

/// Batched read over an already-materialized address list, used by the
/// upper layers mid-pipeline. Same contract as [`read`].
pub(crate) fn read_addresses<E: KvEngine>(
    engine: &E,
    txn: Option<&mut E::Txn>,
    tasks: &[Address],
    opts: Options,
    arena: &mut Arena,
) -> Result<()> {
    arena.tape.clear();
    arena.keys.clear();
    if tasks.is_empty() {
        return Ok(());
    }
    arena.keys.try_reserve(tasks.len())?;
    arena.keys.extend_from_slice(tasks);

    let read_opts = ReadOptions {
        track: opts.track,
        lengths_only: opts.lengths_only,
    };

    let prepared = ascending_unique(&arena.keys);
    if !prepared {
        arena.keys.sort_unstable();
        arena.keys.dedup();
    }
    let unique = std::mem::take(&mut arena.keys);
    let outcome = engine.read(txn, &unique, read_opts, arena);
    arena.keys = unique;
    outcome?;

    if !prepared {
        let scatter: Vec<usize> = tasks
            .iter()
            .map(|addr| {
                arena
                    .keys
                    .binary_search(addr)
                    .expect("task address missing from its own sorted batch")
            })
            .collect();
        arena.tape.scatter(&scatter)?;
    }
    Ok(())
}

/// Batched write, forwarded in caller order.
pub(crate) fn write<E: KvEngine>(
    engine: &E,
    txn: Option<&mut E::Txn>,
    spec: &WriteSpec<'_>,
    opts: Options,
) -> Result<()> {
    spec.check()?;
    if spec.count == 0 {
        return Ok(());
    }
    let mut batch: Vec<(Address, Option<&[u8]>)> = Vec::new();
    batch.try_reserve(spec.count)?;
    for index in 0..spec.count {
        batch.push((spec.address(index), *spec.values.get(index)));
    }
    trace!(tasks = spec.count, flush = opts.flush, "plane.write");
    engine.write(txn, &batch, WriteOptions { flush: opts.flush })
}
