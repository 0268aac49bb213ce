//! ---
//! gw_section: "03-event-scheduling"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Grid-event timeline construction and selection."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::event::ControlEvent;

/// One contiguous chunk of the flattened timeline and its winning event.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    /// Inclusive start of the chunk.
    pub start: DateTime<Utc>,
    /// Exclusive end of the chunk.
    pub end: DateTime<Utc>,
    pub event: Arc<ControlEvent>,
}

/// An event outranked by another over some part of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Supersession {
    pub loser_id: String,
    pub winner_id: String,
}

/// Result of flattening an event set: the contiguous, non-overlapping entry
/// list plus the deduplicated set of supersessions to report.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub entries: Vec<ScheduleEntry>,
    pub superseded: Vec<Supersession>,
}

/// Flatten a set of live events into a deterministic, gap-free-within-cover
/// timeline.
///
/// Every distinct start/end boundary across the input set splits the axis
/// into chunks. Each chunk is won by the highest-priority event covering it
/// (lower program rank first, then earlier creation time, then id for a total
/// order); every outranked event covering the chunk is recorded as superseded
/// by the winner, once per (loser, winner) pair. Adjacent chunks won by the
/// same event are merged so a single logical event yields a single entry.
pub fn generate_schedule(events: &[Arc<ControlEvent>]) -> BuildOutcome {
    if events.is_empty() {
        return BuildOutcome::default();
    }

    let mut boundaries: BTreeSet<DateTime<Utc>> = BTreeSet::new();
    for event in events {
        boundaries.insert(event.start);
        boundaries.insert(event.end);
    }
    let boundaries: Vec<DateTime<Utc>> = boundaries.into_iter().collect();

    let mut entries: Vec<ScheduleEntry> = Vec::new();
    let mut superseded: BTreeSet<Supersession> = BTreeSet::new();

    for window in boundaries.windows(2) {
        let (chunk_start, chunk_end) = (window[0], window[1]);
        let mut covering: Vec<&Arc<ControlEvent>> =
            events.iter().filter(|e| e.covers(chunk_start)).collect();
        if covering.is_empty() {
            continue;
        }
        covering.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.id.cmp(&b.id))
        });

        let winner = covering[0];
        for loser in &covering[1..] {
            superseded.insert(Supersession {
                loser_id: loser.id.clone(),
                winner_id: winner.id.clone(),
            });
        }

        match entries.last_mut() {
            Some(last) if Arc::ptr_eq(&last.event, winner) && last.end == chunk_start => {
                last.end = chunk_end;
            }
            _ => entries.push(ScheduleEntry {
                start: chunk_start,
                end: chunk_end,
                event: winner.clone(),
            }),
        }
    }

    BuildOutcome {
        entries,
        superseded: superseded.into_iter().collect(),
    }
}
