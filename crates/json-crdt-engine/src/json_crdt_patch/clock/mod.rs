//! Logical timestamps and the clocks that issue them.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::CrdtError;
use crate::json_crdt_patch::enums::session;

/// A logical timestamp. Every CRDT node and every inserted element is
/// identified by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ts {
    pub sid: u64,
    pub time: u64,
}

impl Ts {
    pub const fn new(sid: u64, time: u64) -> Self {
        Self { sid, time }
    }

    /// Lexicographic `(sid, time)` order used by the RGA id index.
    #[inline]
    pub fn cmp_by_session(&self, other: &Ts) -> Ordering {
        self.sid.cmp(&other.sid).then(self.time.cmp(&other.time))
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_ts(*self))
    }
}

/// A run of `span` consecutive timestamps of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tss {
    pub sid: u64,
    pub time: u64,
    pub span: u64,
}

impl Tss {
    pub const fn new(sid: u64, time: u64, span: u64) -> Self {
        Self { sid, time, span }
    }

    pub fn ts(&self) -> Ts {
        Ts::new(self.sid, self.time)
    }
}

impl fmt::Display for Tss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.ts(), self.span)
    }
}

#[inline]
pub fn ts(sid: u64, time: u64) -> Ts {
    Ts::new(sid, time)
}

#[inline]
pub fn tss(sid: u64, time: u64, span: u64) -> Tss {
    Tss::new(sid, time, span)
}

/// Shifts a timestamp forward by `cycles`.
#[inline]
pub fn tick(stamp: Ts, cycles: u64) -> Ts {
    Ts::new(stamp.sid, stamp.time + cycles)
}

#[inline]
pub fn equal(a: Ts, b: Ts) -> bool {
    a.time == b.time && a.sid == b.sid
}

/// Precedence order: logical time first, session id breaks ties.
#[inline]
pub fn compare(a: Ts, b: Ts) -> Ordering {
    a.time.cmp(&b.time).then(a.sid.cmp(&b.sid))
}

/// Whether `[ts1, ts1+span1)` covers all of `[ts2, ts2+span2)`.
pub fn contains(ts1: Ts, span1: u64, ts2: Ts, span2: u64) -> bool {
    ts1.sid == ts2.sid && ts1.time <= ts2.time && ts1.time + span1 >= ts2.time + span2
}

/// Whether `[ts1, ts1+span1)` covers the single tick `ts2`.
pub fn contains_id(ts1: Ts, span1: u64, ts2: Ts) -> bool {
    ts1.sid == ts2.sid && ts1.time <= ts2.time && ts2.time < ts1.time + span1
}

pub fn interval(stamp: Ts, tick_offset: u64, span: u64) -> Tss {
    Tss::new(stamp.sid, stamp.time + tick_offset, span)
}

/// Short display form: `.time` for the server session, the last four digits
/// of long session ids.
pub fn print_ts(id: Ts) -> String {
    if id.sid == session::SERVER {
        return format!(".{}", id.time);
    }
    let sid = id.sid.to_string();
    if sid.len() > 4 {
        format!("..{}.{}", &sid[sid.len() - 4..], id.time)
    } else {
        format!("{}.{}", sid, id.time)
    }
}

/// A bare ticking clock without peer tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalClock {
    pub sid: u64,
    pub time: u64,
}

impl LogicalClock {
    pub fn new(sid: u64, time: u64) -> Self {
        Self { sid, time }
    }

    /// Reserves `cycles` ticks and returns the first one.
    pub fn tick(&mut self, cycles: u64) -> Ts {
        let stamp = self.ts();
        self.time += cycles;
        stamp
    }

    pub fn ts(&self) -> Ts {
        Ts::new(self.sid, self.time)
    }
}

/// Local clock plus the latest time seen from every other session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClockVector {
    pub sid: u64,
    pub time: u64,
    pub peers: HashMap<u64, Ts>,
}

impl ClockVector {
    pub fn new(sid: u64, time: u64) -> Self {
        Self {
            sid,
            time,
            peers: HashMap::new(),
        }
    }

    pub fn ts(&self) -> Ts {
        Ts::new(self.sid, self.time)
    }

    pub fn tick(&mut self, cycles: u64) -> Ts {
        let stamp = self.ts();
        self.time += cycles;
        stamp
    }

    /// Records that ticks `[id.time, id.time+span)` of `id.sid` exist. The
    /// local time always ends up past the observed edge.
    pub fn observe(&mut self, id: Ts, span: u64) {
        let edge = id.time + span.max(1) - 1;
        if id.sid != self.sid {
            let peer = self.peers.entry(id.sid).or_insert(Ts::new(id.sid, edge));
            if edge > peer.time {
                peer.time = edge;
            }
        }
        if edge >= self.time {
            self.time = edge + 1;
        }
    }

    /// Independent copy that issues timestamps under `sid`.
    pub fn fork(&self, sid: u64) -> ClockVector {
        let mut clock = ClockVector::new(sid, self.time);
        if sid != self.sid && self.time > 0 {
            clock.observe(Ts::new(self.sid, self.time - 1), 1);
        }
        for peer in self.peers.values() {
            clock.observe(*peer, 1);
        }
        clock
    }

    /// Peers sorted by session id, for deterministic output.
    pub fn sorted_peers(&self) -> Vec<Ts> {
        let mut peers: Vec<Ts> = self.peers.values().copied().collect();
        peers.sort_by_key(|p| p.sid);
        peers
    }
}

impl fmt::Display for ClockVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clock {}.{}", self.sid, self.time)?;
        let peers = self.sorted_peers();
        let last = peers.len().saturating_sub(1);
        for (i, peer) in peers.iter().enumerate() {
            let branch = if i == last { "└─" } else { "├─" };
            write!(f, "\n{} {}.{}", branch, peer.sid, peer.time)?;
        }
        Ok(())
    }
}

/// Clock of a server-sequenced document: one session, strictly ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerClockVector {
    pub time: u64,
}

impl ServerClockVector {
    pub const SID: u64 = session::SERVER;

    pub fn new(time: u64) -> Self {
        Self { time }
    }

    pub fn sid(&self) -> u64 {
        Self::SID
    }

    pub fn ts(&self) -> Ts {
        Ts::new(Self::SID, self.time)
    }

    pub fn tick(&mut self, cycles: u64) -> Ts {
        let stamp = self.ts();
        self.time += cycles;
        stamp
    }

    /// Accepts ids from the reserved sessions only and never from the future.
    pub fn observe(&mut self, id: Ts, span: u64) -> Result<(), CrdtError> {
        if id.sid > 8 {
            return Err(CrdtError::InvalidServerSession);
        }
        if id.time > self.time {
            return Err(CrdtError::TimeTravel);
        }
        self.time = self.time.max(id.time + span);
        Ok(())
    }

    pub fn fork(&self) -> ServerClockVector {
        ServerClockVector::new(self.time)
    }
}

impl fmt::Display for ServerClockVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clock {}.{}", Self::SID, self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_orders_by_time_then_session() {
        assert_eq!(compare(ts(1, 10), ts(9, 9)), Ordering::Greater);
        assert_eq!(compare(ts(1, 10), ts(2, 10)), Ordering::Less);
        assert_eq!(compare(ts(3, 3), ts(3, 3)), Ordering::Equal);
        assert_eq!(ts(1, 10).cmp_by_session(&ts(2, 1)), Ordering::Less);
    }

    #[test]
    fn span_containment() {
        assert!(contains(ts(1, 5), 10, ts(1, 7), 3));
        assert!(!contains(ts(1, 5), 3, ts(1, 7), 3));
        assert!(!contains(ts(1, 5), 10, ts(2, 7), 1));
        assert!(contains_id(ts(1, 5), 10, ts(1, 14)));
        assert!(!contains_id(ts(1, 5), 10, ts(1, 15)));
        assert_eq!(interval(ts(4, 10), 2, 3), tss(4, 12, 3));
    }

    #[test]
    fn display_forms() {
        assert_eq!(ts(session::SERVER, 42).to_string(), ".42");
        assert_eq!(ts(123456789, 1).to_string(), "..6789.1");
        assert_eq!(ts(77, 3).to_string(), "77.3");
        assert_eq!(tss(77, 3, 2).to_string(), "77.3!2");
    }

    #[test]
    fn vector_observe_tracks_peers() {
        let mut clock = ClockVector::new(10, 0);
        clock.observe(ts(20, 5), 3);
        assert_eq!(clock.time, 8);
        assert_eq!(clock.peers[&20], ts(20, 7));
        clock.observe(ts(20, 1), 1);
        assert_eq!(clock.peers[&20], ts(20, 7));
        assert_eq!(clock.tick(2), ts(10, 8));
        assert_eq!(clock.time, 10);
    }

    #[test]
    fn fork_remembers_the_old_session() {
        let mut clock = ClockVector::new(10, 0);
        clock.tick(5);
        clock.observe(ts(20, 2), 1);
        let forked = clock.fork(30);
        assert_eq!(forked.sid, 30);
        assert_eq!(forked.time, 5);
        assert_eq!(forked.peers[&10], ts(10, 4));
        assert_eq!(forked.peers[&20], ts(20, 2));
        assert!(forked.to_string().starts_with("clock 30.5\n├─ 10.4"));
    }

    #[test]
    fn server_clock_rejects_foreign_and_future_ids() {
        let mut clock = ServerClockVector::new(5);
        assert_eq!(clock.observe(ts(100, 1), 1), Err(CrdtError::InvalidServerSession));
        assert_eq!(clock.observe(ts(1, 6), 1), Err(CrdtError::TimeTravel));
        clock.observe(ts(1, 5), 2).unwrap();
        assert_eq!(clock.time, 7);
        assert_eq!(clock.tick(1), ts(1, 7));
    }
}
