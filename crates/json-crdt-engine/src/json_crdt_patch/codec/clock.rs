//! Session-id compression for the model codecs.
//!
//! Timestamps are written as `(session index, time difference)` pairs
//! against a table of reference clocks. Index 0 always stands for the system
//! session, whose ids are written with their absolute time.

use std::collections::HashMap;

use crdt_pack::{Reader, Writer};

use crate::error::CrdtError;
use crate::json_crdt_patch::clock::{ts, ClockVector, Ts};
use crate::json_crdt_patch::enums::session;
use crate::json_crdt_patch::util::binary::{CrdtReader, CrdtWriter};

/// A timestamp relative to a clock table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeTimestamp {
    pub session_index: u64,
    pub time_diff: u64,
}

impl RelativeTimestamp {
    pub fn new(session_index: u64, time_diff: u64) -> Self {
        Self {
            session_index,
            time_diff,
        }
    }
}

/// Fixed table of reference clocks, written up front by the indexed and
/// sidecar codecs. Entry `i` (1-based) is `by_idx[i - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockTable {
    pub by_idx: Vec<Ts>,
    by_sid: HashMap<u64, usize>,
}

impl ClockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local session first at its last issued time, then the peers ordered
    /// by session id.
    pub fn from_clock(clock: &ClockVector) -> Self {
        let mut table = Self::new();
        table.push(ts(clock.sid, clock.time.saturating_sub(1)));
        for peer in clock.sorted_peers() {
            table.push(peer);
        }
        table
    }

    pub fn push(&mut self, id: Ts) {
        self.by_idx.push(id);
        self.by_sid.insert(id.sid, self.by_idx.len());
    }

    pub fn len(&self) -> usize {
        self.by_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_idx.is_empty()
    }

    pub fn get_by_index(&self, index: u64) -> Option<Ts> {
        let i = usize::try_from(index).ok()?.checked_sub(1)?;
        self.by_idx.get(i).copied()
    }

    /// Returns the 1-based index and reference clock of `sid`.
    pub fn get_by_sid(&self, sid: u64) -> Option<(u64, Ts)> {
        let index = *self.by_sid.get(&sid)?;
        Some((index as u64, self.by_idx[index - 1]))
    }

    pub fn encode_id(&self, id: Ts) -> Result<RelativeTimestamp, CrdtError> {
        if id.sid == session::SYSTEM {
            return Ok(RelativeTimestamp::new(0, id.time));
        }
        let (index, clock) = self.get_by_sid(id.sid).ok_or(CrdtError::ClockNotFound)?;
        if id.time > clock.time {
            return Err(CrdtError::TimeTravel);
        }
        Ok(RelativeTimestamp::new(index, clock.time - id.time))
    }

    pub fn decode_id(&self, index: u64, time_diff: u64) -> Result<Ts, CrdtError> {
        if index == 0 {
            return Ok(ts(session::SYSTEM, time_diff));
        }
        let clock = self.get_by_index(index).ok_or(CrdtError::InvalidClockTable)?;
        let time = clock.time.checked_sub(time_diff).ok_or(CrdtError::InvalidClockTable)?;
        Ok(ts(clock.sid, time))
    }

    /// Writes `vu57 count` followed by `vu57 sid, vu57 time` per entry.
    pub fn write(&self, w: &mut Writer) {
        w.vu57(self.by_idx.len() as u64);
        for id in &self.by_idx {
            w.vu57(id.sid);
            w.vu57(id.time);
        }
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self, CrdtError> {
        let count = r.vu57()?;
        if count == 0 {
            return Err(CrdtError::InvalidClockTable);
        }
        let mut table = Self::new();
        for _ in 0..count {
            let sid = r.vu57()?;
            let time = r.vu57()?;
            table.push(ts(sid, time));
        }
        Ok(table)
    }

    pub fn to_binary(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(4 + self.by_idx.len() * 8);
        self.write(&mut w);
        w.flush()
    }

    pub fn from_binary(data: &[u8]) -> Result<Self, CrdtError> {
        let mut r = Reader::new(data);
        Self::read(&mut r)
    }

    /// Rebuilds the clock vector: the first entry is the local session.
    pub fn to_clock(&self) -> Result<ClockVector, CrdtError> {
        let (first, rest) = self.by_idx.split_first().ok_or(CrdtError::InvalidClockTable)?;
        let mut clock = ClockVector::new(first.sid, first.time + 1);
        for peer in rest {
            clock.observe(*peer, 1);
        }
        Ok(clock)
    }
}

/// Builds a clock table lazily while encoding: only sessions actually
/// referenced end up in the output.
#[derive(Debug, Clone, Default)]
pub struct ClockEncoder {
    table: HashMap<u64, (u64, Ts)>,
    order: Vec<Ts>,
    clock: ClockVector,
}

impl ClockEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new table with the local session at index 1.
    pub fn reset(&mut self, clock: &ClockVector) {
        self.table.clear();
        self.order.clear();
        self.clock = clock.clone();
        self.register(ts(clock.sid, clock.time.saturating_sub(1)));
    }

    fn register(&mut self, reference: Ts) -> (u64, Ts) {
        self.order.push(reference);
        let entry = (self.order.len() as u64, reference);
        self.table.insert(reference.sid, entry);
        entry
    }

    pub fn append(&mut self, id: Ts) -> Result<RelativeTimestamp, CrdtError> {
        if id.sid == session::SYSTEM {
            return Ok(RelativeTimestamp::new(0, id.time));
        }
        let (index, reference) = match self.table.get(&id.sid) {
            Some(entry) => *entry,
            None => {
                let reference = self
                    .clock
                    .peers
                    .get(&id.sid)
                    .copied()
                    .unwrap_or_else(|| ts(id.sid, self.clock.time.saturating_sub(1)));
                self.register(reference)
            }
        };
        if id.time > reference.time {
            return Err(CrdtError::TimeTravel);
        }
        Ok(RelativeTimestamp::new(index, reference.time - id.time))
    }

    /// Registered reference clocks in index order.
    pub fn entries(&self) -> &[Ts] {
        &self.order
    }

    /// Flat `[sid, time, sid, time, …]` form.
    pub fn to_json(&self) -> Vec<u64> {
        self.order.iter().flat_map(|id| [id.sid, id.time]).collect()
    }
}

/// Inverse of [`ClockEncoder`].
#[derive(Debug, Clone)]
pub struct ClockDecoder {
    table: Vec<Ts>,
    pub clock: ClockVector,
}

impl ClockDecoder {
    /// Seeds the decoder with the local session's last issued time.
    pub fn new(sid: u64, time: u64) -> Self {
        Self {
            table: vec![ts(sid, time)],
            clock: ClockVector::new(sid, time + 1),
        }
    }

    pub fn from_arr(arr: &[u64]) -> Result<Self, CrdtError> {
        if arr.len() < 2 || arr.len() % 2 != 0 {
            return Err(CrdtError::InvalidClockTable);
        }
        let mut decoder = Self::new(arr[0], arr[1]);
        for pair in arr[2..].chunks_exact(2) {
            decoder.push_tuple(pair[0], pair[1]);
        }
        Ok(decoder)
    }

    pub fn push_tuple(&mut self, sid: u64, time: u64) {
        let id = ts(sid, time);
        self.clock.observe(id, 1);
        self.table.push(id);
    }

    pub fn decode_id(&self, session_index: u64, time_diff: u64) -> Result<Ts, CrdtError> {
        if session_index == 0 {
            return Ok(ts(session::SYSTEM, time_diff));
        }
        let reference = usize::try_from(session_index - 1)
            .ok()
            .and_then(|i| self.table.get(i))
            .ok_or(CrdtError::InvalidClockTable)?;
        let time = reference
            .time
            .checked_sub(time_diff)
            .ok_or(CrdtError::InvalidClockTable)?;
        Ok(ts(reference.sid, time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock_with_peers() -> ClockVector {
        let mut clock = ClockVector::new(100, 100);
        clock.observe(ts(100, 100), 1);
        clock.observe(ts(50, 50), 1);
        clock.observe(ts(10, 10), 1);
        clock
    }

    #[test]
    fn encoder_registers_local_session_first() {
        let mut encoder = ClockEncoder::new();
        encoder.reset(&clock_with_peers());
        assert_eq!(encoder.to_json(), vec![100, 100]);
        assert_eq!(encoder.append(ts(100, 98)).unwrap(), RelativeTimestamp::new(1, 2));
    }

    #[test]
    fn encoder_adds_peers_once_on_first_use() {
        let mut encoder = ClockEncoder::new();
        encoder.reset(&clock_with_peers());
        assert_eq!(encoder.append(ts(10, 10)).unwrap(), RelativeTimestamp::new(2, 0));
        assert_eq!(encoder.append(ts(50, 45)).unwrap(), RelativeTimestamp::new(3, 5));
        assert_eq!(encoder.append(ts(10, 3)).unwrap(), RelativeTimestamp::new(2, 7));
        assert_eq!(encoder.to_json(), vec![100, 100, 10, 10, 50, 50]);
    }

    #[test]
    fn encoder_rejects_ids_newer_than_the_reference() {
        let mut encoder = ClockEncoder::new();
        encoder.reset(&clock_with_peers());
        assert_eq!(encoder.append(ts(50, 51)), Err(CrdtError::TimeTravel));
    }

    #[test]
    fn system_ids_use_index_zero() {
        let mut encoder = ClockEncoder::new();
        encoder.reset(&clock_with_peers());
        assert_eq!(encoder.append(ts(0, 1)).unwrap(), RelativeTimestamp::new(0, 1));
        let decoder = ClockDecoder::new(100, 100);
        assert_eq!(decoder.decode_id(0, 1).unwrap(), ts(0, 1));
    }

    #[test]
    fn decoder_reverses_encoder() {
        let mut encoder = ClockEncoder::new();
        encoder.reset(&clock_with_peers());
        let ids = [ts(100, 7), ts(10, 9), ts(50, 50), ts(100, 100)];
        let rel: Vec<RelativeTimestamp> = ids.iter().map(|id| encoder.append(*id).unwrap()).collect();
        let decoder = ClockDecoder::from_arr(&encoder.to_json()).unwrap();
        for (id, r) in ids.iter().zip(rel) {
            assert_eq!(decoder.decode_id(r.session_index, r.time_diff).unwrap(), *id);
        }
        assert_eq!(decoder.clock.sid, 100);
        assert_eq!(decoder.clock.time, 101);
        assert_eq!(decoder.clock.peers[&50], ts(50, 50));
    }

    #[test]
    fn decoder_rejects_bad_references() {
        let decoder = ClockDecoder::new(5, 3);
        assert_eq!(decoder.decode_id(2, 0), Err(CrdtError::InvalidClockTable));
        assert_eq!(decoder.decode_id(1, 4), Err(CrdtError::InvalidClockTable));
        assert!(ClockDecoder::from_arr(&[1]).is_err());
    }

    #[test]
    fn table_round_trips_through_binary() {
        let table = ClockTable::from_clock(&clock_with_peers());
        assert_eq!(table.by_idx, vec![ts(100, 100), ts(10, 10), ts(50, 50)]);
        let decoded = ClockTable::from_binary(&table.to_binary()).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(decoded.get_by_sid(50), Some((3, ts(50, 50))));
        let clock = decoded.to_clock().unwrap();
        assert_eq!(clock.time, 101);
        assert_eq!(clock.peers.len(), 2);
    }

    #[test]
    fn table_encodes_relative_ids() {
        let table = ClockTable::from_clock(&clock_with_peers());
        let rel = table.encode_id(ts(50, 40)).unwrap();
        assert_eq!(rel, RelativeTimestamp::new(3, 10));
        assert_eq!(table.decode_id(3, 10).unwrap(), ts(50, 40));
        assert_eq!(table.encode_id(ts(77, 1)), Err(CrdtError::ClockNotFound));
        assert_eq!(table.encode_id(ts(10, 11)), Err(CrdtError::TimeTravel));
    }
}
