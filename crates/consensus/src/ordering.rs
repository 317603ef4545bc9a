//! Confirmation and fair ordering of decided frames.
//!
//! An Atropos confirms every not yet confirmed event it reaches. Those
//! events are ordered by `(lamport, id)` and assigned consensus times by
//! stretching the Lamport range of the frame over the median-time span
//! since the previous block.

use crate::callbacks::EventSource;
use crate::error::{ConsensusError, ConsensusResult};
use crate::store::StoreTable;
use poset_kvdb::KvStore;
use poset_types::{Epoch, EventHeader, EventId, Frame, Lamport, Seq, Timestamp, ValidatorId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Consensus-time parameters of a decided frame.
///
/// An event confirmed by the frame has consensus time
/// `time_offset + time_ratio * lamport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Time offset, may be negative
    pub time_offset: i64,
    /// Nanoseconds per Lamport tick, at least 1
    pub time_ratio: u64,
    /// Consensus time of the frame's last event
    pub last_consensus_time: Timestamp,
}

impl FrameInfo {
    /// Spreads the Lamport range `[lowest, highest]` of a frame over the
    /// time since `prev_consensus_time`, ending near `atropos_median_time`.
    ///
    /// Consensus time strictly increases from one frame to the next.
    pub fn calc(
        lowest: Lamport,
        highest: Lamport,
        atropos_median_time: Timestamp,
        prev_consensus_time: Timestamp,
    ) -> Self {
        let lamport_period = (highest.saturating_sub(lowest) as u64 + 1).max(1);
        let time_period = if atropos_median_time > prev_consensus_time {
            atropos_median_time - prev_consensus_time
        } else {
            1
        };
        let time_ratio = (time_period / lamport_period).max(1);

        let lowest_consensus_time = prev_consensus_time as i128 + time_ratio as i128;
        let time_offset = lowest_consensus_time - lowest as i128 * time_ratio as i128;
        let last_consensus_time = time_offset + highest as i128 * time_ratio as i128;
        Self {
            time_offset: clamp_i64(time_offset),
            time_ratio,
            last_consensus_time: clamp_u64(last_consensus_time),
        }
    }

    /// Consensus time of an event with `lamport` confirmed by this frame.
    pub fn consensus_time(&self, lamport: Lamport) -> Timestamp {
        clamp_u64(self.time_offset as i128 + self.time_ratio as i128 * lamport as i128)
    }
}

/// A confirmed event awaiting ordering.
#[derive(Debug, Clone)]
pub struct ConfirmedEvent {
    /// Event ID
    pub id: EventId,
    /// Its header
    pub header: EventHeader,
    /// Distance behind its creator's highest event in the same batch
    pub seq_depth: Seq,
}

/// Which frame confirmed every event, and the timing of every decided frame.
#[derive(Clone)]
pub struct ConfirmationIndex {
    confirmed: StoreTable,
    frame_info: StoreTable,
}

impl ConfirmationIndex {
    /// Wraps the confirmation tables of an epoch.
    pub fn new(confirmed: StoreTable, frame_info: StoreTable) -> Self {
        Self {
            confirmed,
            frame_info,
        }
    }

    /// Frame that confirmed the event, if any.
    pub fn confirmed_on(&self, id: &EventId) -> ConsensusResult<Option<Frame>> {
        match self.confirmed.get(id.as_bytes())? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    ConsensusError::Codec(format!("confirmation of {} is {} bytes", id, bytes.len()))
                })?;
                Ok(Some(Frame::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Marks everything reachable from `atropos` and not yet confirmed as
    /// confirmed on `frame`, and returns those events with their seq depth.
    pub fn confirm_events(
        &self,
        epoch: Epoch,
        frame: Frame,
        atropos: &EventId,
        source: &dyn EventSource,
    ) -> ConsensusResult<Vec<ConfirmedEvent>> {
        let mut confirmed = Vec::new();
        let mut stack = vec![*atropos];
        while let Some(id) = stack.pop() {
            if self.confirmed_on(&id)?.is_some() {
                continue;
            }
            let header = source
                .get_event_header(epoch, &id)
                .ok_or(ConsensusError::EventNotFound(id))?;
            self.confirmed.put(id.as_bytes(), &frame.to_be_bytes())?;
            stack.extend(header.parents.iter().copied());
            confirmed.push(ConfirmedEvent {
                id,
                header,
                seq_depth: 0,
            });
        }

        let mut highest: HashMap<ValidatorId, Seq> = HashMap::new();
        for event in &confirmed {
            let seq = highest.entry(event.header.creator).or_default();
            *seq = (*seq).max(event.header.seq);
        }
        for event in &mut confirmed {
            event.seq_depth = highest[&event.header.creator] - event.header.seq;
        }
        Ok(confirmed)
    }

    /// Timing of a decided frame.
    pub fn frame_info(&self, frame: Frame) -> ConsensusResult<Option<FrameInfo>> {
        match self.frame_info.get(&frame.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stores the timing of a decided frame.
    pub fn set_frame_info(&self, frame: Frame, info: &FrameInfo) -> ConsensusResult<()> {
        self.frame_info
            .put(&frame.to_be_bytes(), &bincode::serialize(info)?)?;
        Ok(())
    }

    /// Consensus time of a confirmed event.
    pub fn consensus_time(&self, id: &EventId) -> ConsensusResult<Timestamp> {
        let frame = self
            .confirmed_on(id)?
            .ok_or(ConsensusError::EventNotConfirmed(*id))?;
        let info = self
            .frame_info(frame)?
            .ok_or(ConsensusError::EventNotConfirmed(*id))?;
        Ok(info.consensus_time(id.lamport()))
    }
}

/// Orders events by Lamport time, breaking ties by ID.
pub fn sort_events(events: &mut [ConfirmedEvent]) {
    events.sort_by(|a, b| {
        a.header
            .lamport
            .cmp(&b.header.lamport)
            .then_with(|| a.id.cmp(&b.id))
    });
    debug_assert!(events
        .windows(2)
        .all(|w| (w[0].header.lamport, w[0].id) < (w[1].header.lamport, w[1].id)));
}

fn clamp_u64(value: i128) -> u64 {
    value.clamp(0, u64::MAX as i128) as u64
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use poset_types::SECOND;

    #[test]
    fn test_frame_info_spreads_lamport_range() {
        let info = FrameInfo::calc(10, 19, 100 * SECOND, 90 * SECOND);
        assert_eq!(info.time_ratio, SECOND);
        assert_eq!(info.consensus_time(10), 90 * SECOND + SECOND);
        assert_eq!(info.last_consensus_time, 100 * SECOND);
        assert_eq!(info.consensus_time(19), info.last_consensus_time);
    }

    #[test]
    fn test_frame_info_monotonic_when_median_lags() {
        let info = FrameInfo::calc(5, 8, 10, 1_000);
        assert_eq!(info.time_ratio, 1);
        assert!(info.consensus_time(5) > 1_000);
        assert_eq!(info.last_consensus_time, 1_004);
    }

    #[test]
    fn test_sort_events() {
        let make = |lamport: Lamport, tag: u8| {
            let mut header = EventHeader::new(1, 1, 1, vec![]);
            header.lamport = lamport;
            ConfirmedEvent {
                id: EventId::new(1, lamport, &poset_types::H256::keccak256(&[tag])),
                header,
                seq_depth: 0,
            }
        };
        let mut events = vec![make(3, 1), make(1, 2), make(3, 0), make(2, 9)];
        sort_events(&mut events);
        let lamports: Vec<_> = events.iter().map(|e| e.header.lamport).collect();
        assert_eq!(lamports, vec![1, 2, 3, 3]);
        assert!(events[2].id < events[3].id);
    }
}
