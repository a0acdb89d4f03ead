//! Per-vertex adjacency entries.
//!
//! On the substrate a vertex owns one entry: `u32 out_count`,
//! `u32 in_count`, then `(neighbor, edge_id)` pairs for the out-portion
//! followed by the in-portion, all little-endian. Decoding also accepts
//! a leading version byte `0` ("uncompressed"), reserved for future
//! integer compression; the two framings differ by length mod 16.
//!
//! Both portions stay sorted by `(neighbor, edge_id)` so membership and
//! `edges(u, v)` lookups are binary searches.

use crate::error::{Result, StoreError};
use crate::types::{Key, Role, EDGE_ID_ANY};

const HEADER_LEN: usize = 8;
const RECORD_LEN: usize = 16;
const VERSION_UNCOMPRESSED: u8 = 0;

/// One `(neighbor, edge_id)` record.
pub(crate) type Record = (Key, Key);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct AdjacencyEntry {
    /// Records where the owning vertex is the source.
    pub out: Vec<Record>,
    /// Records where the owning vertex is the target.
    pub inc: Vec<Record>,
}

impl AdjacencyEntry {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let body = match bytes.len() % RECORD_LEN {
            r if r == HEADER_LEN => bytes,
            r if r == HEADER_LEN + 1 => {
                if bytes[0] != VERSION_UNCOMPRESSED {
                    return Err(StoreError::Fatal("unknown adjacency entry version"));
                }
                &bytes[1..]
            }
            _ => return Err(StoreError::Fatal("malformed adjacency entry length")),
        };
        let out_count = u32::from_le_bytes(body[0..4].try_into().unwrap()) as usize;
        let in_count = u32::from_le_bytes(body[4..8].try_into().unwrap()) as usize;
        if body.len() != HEADER_LEN + (out_count + in_count) * RECORD_LEN {
            return Err(StoreError::Fatal("adjacency entry counts disagree with length"));
        }
        let mut cursor = HEADER_LEN;
        let mut read_records = |count: usize| -> Vec<Record> {
            let mut records = Vec::with_capacity(count);
            for _ in 0..count {
                let neighbor = i64::from_le_bytes(body[cursor..cursor + 8].try_into().unwrap());
                let edge = i64::from_le_bytes(body[cursor + 8..cursor + 16].try_into().unwrap());
                records.push((neighbor, edge));
                cursor += RECORD_LEN;
            }
            records
        };
        let out = read_records(out_count);
        let inc = read_records(in_count);
        Ok(Self { out, inc })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.reserve(HEADER_LEN + (self.out.len() + self.inc.len()) * RECORD_LEN);
        out.extend_from_slice(&(self.out.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.inc.len() as u32).to_le_bytes());
        for (neighbor, edge) in self.out.iter().chain(&self.inc) {
            out.extend_from_slice(&neighbor.to_le_bytes());
            out.extend_from_slice(&edge.to_le_bytes());
        }
    }

    /// Header counts without decoding the records.
    pub fn decode_counts(bytes: &[u8]) -> Result<(u32, u32)> {
        let body = match bytes.len() % RECORD_LEN {
            r if r == HEADER_LEN => bytes,
            r if r == HEADER_LEN + 1 => &bytes[1..],
            _ => return Err(StoreError::Fatal("malformed adjacency entry length")),
        };
        if body.len() < HEADER_LEN {
            return Err(StoreError::Fatal("adjacency entry shorter than header"));
        }
        Ok((
            u32::from_le_bytes(body[0..4].try_into().unwrap()),
            u32::from_le_bytes(body[4..8].try_into().unwrap()),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty() && self.inc.is_empty()
    }

    pub fn degree(&self, role: Role) -> u32 {
        match role {
            Role::Source => self.out.len() as u32,
            Role::Target => self.inc.len() as u32,
            Role::Any => (self.out.len() + self.inc.len()) as u32,
        }
    }

    /// Inserts into the out-portion; duplicates of an existing record are
    /// kept out (upsert semantics).
    pub fn insert_out(&mut self, neighbor: Key, edge: Key) -> bool {
        insert_record(&mut self.out, neighbor, edge)
    }

    pub fn insert_in(&mut self, neighbor: Key, edge: Key) -> bool {
        insert_record(&mut self.inc, neighbor, edge)
    }

    /// Removes one out-record; [`EDGE_ID_ANY`] matches the first record
    /// with the given neighbor. Returns the removed record's edge id.
    pub fn remove_out(&mut self, neighbor: Key, edge: Key) -> Option<Key> {
        remove_record(&mut self.out, neighbor, edge)
    }

    pub fn remove_in(&mut self, neighbor: Key, edge: Key) -> Option<Key> {
        remove_record(&mut self.inc, neighbor, edge)
    }

    /// Drops every out-record pointing at `vertex`; returns how many went.
    pub fn strip_out(&mut self, vertex: Key) -> usize {
        strip_records(&mut self.out, vertex)
    }

    pub fn strip_in(&mut self, vertex: Key) -> usize {
        strip_records(&mut self.inc, vertex)
    }
}

fn insert_record(records: &mut Vec<Record>, neighbor: Key, edge: Key) -> bool {
    match records.binary_search(&(neighbor, edge)) {
        Ok(_) => false,
        Err(pos) => {
            records.insert(pos, (neighbor, edge));
            true
        }
    }
}

fn remove_record(records: &mut Vec<Record>, neighbor: Key, edge: Key) -> Option<Key> {
    if edge == EDGE_ID_ANY {
        let pos = records.partition_point(|&(n, _)| n < neighbor);
        if records.get(pos).is_some_and(|&(n, _)| n == neighbor) {
            return Some(records.remove(pos).1);
        }
        return None;
    }
    match records.binary_search(&(neighbor, edge)) {
        Ok(pos) => Some(records.remove(pos).1),
        Err(_) => None,
    }
}

fn strip_records(records: &mut Vec<Record>, vertex: Key) -> usize {
    let before = records.len();
    records.retain(|&(n, _)| n != vertex);
    before - records.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_roundtrip() {
        let mut entry = AdjacencyEntry::default();
        entry.insert_out(2, 100);
        entry.insert_out(3, 300);
        entry.insert_in(-5, 200);

        let mut bytes = Vec::new();
        entry.encode(&mut bytes);
        assert_eq!(bytes.len(), 8 + 3 * 16);
        assert_eq!(AdjacencyEntry::decode(&bytes).unwrap(), entry);
        assert_eq!(AdjacencyEntry::decode_counts(&bytes).unwrap(), (2, 1));
    }

    #[test]
    fn version_prefix_zero_is_accepted() {
        let mut entry = AdjacencyEntry::default();
        entry.insert_out(7, 1);
        let mut bytes = vec![0u8];
        entry.encode(&mut bytes);
        assert_eq!(AdjacencyEntry::decode(&bytes).unwrap(), entry);

        bytes[0] = 1;
        assert!(AdjacencyEntry::decode(&bytes).is_err());
    }

    #[test]
    fn inserts_stay_sorted_and_deduped() {
        let mut entry = AdjacencyEntry::default();
        assert!(entry.insert_out(5, 2));
        assert!(entry.insert_out(1, 9));
        assert!(entry.insert_out(5, 1));
        assert!(!entry.insert_out(5, 2));
        assert_eq!(entry.out, vec![(1, 9), (5, 1), (5, 2)]);
    }

    #[test]
    fn any_edge_removal_takes_the_first_match() {
        let mut entry = AdjacencyEntry::default();
        entry.insert_out(5, 10);
        entry.insert_out(5, 20);
        assert_eq!(entry.remove_out(5, EDGE_ID_ANY), Some(10));
        assert_eq!(entry.remove_out(5, EDGE_ID_ANY), Some(20));
        assert_eq!(entry.remove_out(5, EDGE_ID_ANY), None);
    }

    #[test]
    fn strip_drops_every_reference() {
        let mut entry = AdjacencyEntry::default();
        entry.insert_in(4, 1);
        entry.insert_in(4, 2);
        entry.insert_in(6, 3);
        assert_eq!(entry.strip_in(4), 2);
        assert_eq!(entry.inc, vec![(6, 3)]);
    }

    #[test]
    fn truncated_entry_is_fatal() {
        assert!(AdjacencyEntry::decode(&[1, 2, 3]).is_err());
        let mut bytes = Vec::new();
        AdjacencyEntry::default().encode(&mut bytes);
        bytes[0] = 9; // claims nine out-records in an empty body
        assert!(AdjacencyEntry::decode(&bytes).is_err());
    }
}
