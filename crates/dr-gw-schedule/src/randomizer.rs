//! ---
//! gw_section: "03-event-scheduling"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Grid-event timeline construction and selection."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;

use crate::builder::ScheduleEntry;

/// A schedule entry together with its jittered effective boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomizedEntry {
    pub entry: ScheduleEntry,
    /// Inclusive jittered start.
    pub effective_start: DateTime<Utc>,
    /// Exclusive jittered end.
    pub effective_end: DateTime<Utc>,
    /// Whether the effective end came out of a jitter draw. Successive-event
    /// repair depends on this: a randomized end anchors the next start, an
    /// unrandomized end is pulled to it instead.
    pub end_randomized: bool,
}

impl RandomizedEntry {
    /// Whether the entry covers `instant` on its effective window.
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.effective_start <= instant && instant < self.effective_end
    }

    /// Whether this randomized entry was produced from the same logical
    /// chunk (same winning event, same unrandomized window).
    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        self.entry.event.id == entry.event.id
            && self.entry.start == entry.start
            && self.entry.end == entry.end
    }
}

/// Apply per-event start/duration jitter to a freshly built timeline.
///
/// The currently active entry, if it reappears in the rebuilt timeline, is
/// copied through untouched: an in-progress event never moves retroactively.
/// For touching events (one's unrandomized start equals the other's
/// unrandomized end) the jittered boundary is repaired so the randomized
/// timeline has neither a gap nor an overlap, whatever the jitter sign. For
/// genuinely disjoint events the start is clamped so it never reaches back
/// over the previous effective end.
pub fn randomize_schedule<R: Rng>(
    entries: &[ScheduleEntry],
    active: Option<&RandomizedEntry>,
    rng: &mut R,
) -> Vec<RandomizedEntry> {
    let mut randomized: Vec<RandomizedEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        if let Some(active) = active {
            if active.matches(entry) {
                randomized.push(active.clone());
                continue;
            }
        }

        let (mut effective_end, end_randomized) = match entry.event.duration_jitter_secs {
            Some(jitter) => (entry.end + jitter_offset(jitter, rng), true),
            None => (entry.end, false),
        };
        let jittered_start = match entry.event.start_jitter_secs {
            Some(jitter) => entry.start + jitter_offset(jitter, rng),
            None => entry.start,
        };

        let effective_start = match randomized.last_mut() {
            Some(previous) if entry.start == previous.entry.end => {
                if previous.end_randomized {
                    previous.effective_end
                } else {
                    previous.effective_end = jittered_start;
                    jittered_start
                }
            }
            Some(previous) => previous.effective_end.max(jittered_start),
            None => jittered_start,
        };

        if effective_end < effective_start {
            effective_end = effective_start;
        }

        randomized.push(RandomizedEntry {
            entry: entry.clone(),
            effective_start,
            effective_end,
            end_randomized,
        });
    }

    randomized
}

/// Uniform draw over the jitter bound, inclusive of both zero and the bound
/// itself, whichever side of zero the bound sits on.
fn jitter_offset<R: Rng>(bound_secs: i64, rng: &mut R) -> ChronoDuration {
    let low = bound_secs.min(0);
    let high = bound_secs.max(0) + 1;
    ChronoDuration::seconds(rng.gen_range(low..high))
}
