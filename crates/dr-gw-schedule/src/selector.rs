//! ---
//! gw_section: "03-event-scheduling"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Grid-event timeline construction and selection."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::builder::generate_schedule;
use crate::event::{
    ControlDimension, ControlEvent, EventLimits, EventOutcome, EventResponder, FallbackEvent,
};
use crate::randomizer::{randomize_schedule, RandomizedEntry};

/// Invariant violations surfaced by the selector. These indicate a
/// builder/randomizer defect, not an environmental condition, and must fail
/// the cycle loudly rather than silently picking a winner.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{count} schedule entries active at {at} for dimension {dimension}")]
    OverlappingEntries {
        dimension: ControlDimension,
        at: DateTime<Utc>,
        count: usize,
    },
}

/// Per-dimension holder of the randomized timeline and the entry active now.
///
/// One selector instance exists per control dimension and must not be shared
/// across dimensions; the owning service serializes polls against it.
#[derive(Debug)]
pub struct ActiveEventSelector {
    dimension: ControlDimension,
    entries: Vec<RandomizedEntry>,
    fallback: Option<FallbackEvent>,
    active: Option<RandomizedEntry>,
}

impl ActiveEventSelector {
    pub fn new(dimension: ControlDimension) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            fallback: None,
            active: None,
        }
    }

    pub fn dimension(&self) -> ControlDimension {
        self.dimension
    }

    pub fn active_entry(&self) -> Option<&RandomizedEntry> {
        self.active.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn install_entries(&mut self, entries: Vec<RandomizedEntry>) {
        self.entries = entries;
    }

    /// Rebuild the timeline from a changed event set.
    ///
    /// Events not carrying this selector's dimension are ignored, as is a
    /// fallback without an opinion on it. Supersessions discovered during the
    /// rebuild are reported fire-and-forget; the entry active right now is
    /// never re-jittered.
    pub fn refresh<R: Rng>(
        &mut self,
        events: &[Arc<ControlEvent>],
        fallback: Option<FallbackEvent>,
        rng: &mut R,
        responder: &dyn EventResponder,
    ) {
        let relevant: Vec<Arc<ControlEvent>> = events
            .iter()
            .filter(|e| e.limits.carries(self.dimension))
            .cloned()
            .collect();

        let outcome = generate_schedule(&relevant);
        for supersession in &outcome.superseded {
            debug!(
                dimension = %self.dimension,
                loser = %supersession.loser_id,
                winner = %supersession.winner_id,
                "event superseded"
            );
            notify(responder, &supersession.loser_id, EventOutcome::Superseded);
        }

        self.entries = randomize_schedule(&outcome.entries, self.active.as_ref(), rng);
        self.fallback = fallback.filter(|f| f.limits.carries(self.dimension));
    }

    /// Resolve what is effective at `now`, emitting lifecycle transitions.
    ///
    /// Returns the active event's limits, the fallback's limits when no event
    /// covers `now`, or `None` when neither exists.
    pub fn poll(
        &mut self,
        now: DateTime<Utc>,
        responder: &dyn EventResponder,
    ) -> Result<Option<EventLimits>, ScheduleError> {
        let mut covering = self.entries.iter().filter(|e| e.covers(now));
        let winner = covering.next().cloned();
        let extra = covering.count();
        if extra > 0 {
            return Err(ScheduleError::OverlappingEntries {
                dimension: self.dimension,
                at: now,
                count: extra + 1,
            });
        }

        let winner_id = winner.as_ref().map(|e| e.entry.event.id.clone());
        let active_id = self.active.as_ref().map(|e| e.entry.event.id.clone());

        if winner_id != active_id {
            if let Some(previous) = self.active.take() {
                if now >= previous.effective_end {
                    info!(
                        dimension = %self.dimension,
                        event_id = %previous.entry.event.id,
                        "event completed"
                    );
                    notify(responder, &previous.entry.event.id, EventOutcome::Completed);
                } else {
                    // Displaced mid-window; logged but not reported upstream.
                    warn!(
                        dimension = %self.dimension,
                        event_id = %previous.entry.event.id,
                        effective_end = %previous.effective_end,
                        "event aborted before its effective end"
                    );
                }
            }
            if let Some(next) = &winner {
                info!(
                    dimension = %self.dimension,
                    event_id = %next.entry.event.id,
                    effective_start = %next.effective_start,
                    effective_end = %next.effective_end,
                    "event started"
                );
                notify(responder, &next.entry.event.id, EventOutcome::Started);
            }
            self.active = winner;
        } else {
            self.active = winner;
        }

        Ok(match &self.active {
            Some(entry) => Some(entry.entry.event.limits.clone()),
            None => self.fallback.as_ref().map(|f| f.limits.clone()),
        })
    }
}

/// Post a lifecycle outcome without letting a delivery failure poison the
/// cycle that produced it.
pub(crate) fn notify(responder: &dyn EventResponder, event_id: &str, outcome: EventOutcome) {
    if let Err(err) = responder.post(event_id, outcome) {
        warn!(event_id, outcome = %outcome, error = %err, "failed to post event outcome");
    }
}
