//! ---
//! gw_section: "03-event-scheduling"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Grid-event timeline construction and selection."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dr_gw_limits::{Authority, ControlLimitSnapshot, LimitAuthority};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use strum::IntoEnumIterator;
use tracing::{debug, warn};

use crate::event::{
    ControlDimension, ControlEvent, EventOutcome, EventResponder, FallbackEvent,
};
use crate::selector::{notify, ActiveEventSelector, ScheduleError};

struct GridInner {
    selectors: Vec<ActiveEventSelector>,
    events: Vec<Arc<ControlEvent>>,
    fallback: Option<FallbackEvent>,
    acknowledged: HashSet<String>,
    rng: StdRng,
}

/// The grid-schedule authority: one selector per control dimension fed from
/// the protocol collaborator's event set, producing one control-limit
/// snapshot per arbitration cycle.
///
/// Selector state is independent per dimension; the mutex only serializes
/// whole polls so concurrent cycles cannot interleave on one selector.
pub struct GridScheduleAuthority {
    inner: Mutex<GridInner>,
    responder: Arc<dyn EventResponder>,
}

impl std::fmt::Debug for GridScheduleAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridScheduleAuthority").finish_non_exhaustive()
    }
}

impl GridScheduleAuthority {
    pub fn new(responder: Arc<dyn EventResponder>, seed: u64) -> Self {
        Self {
            inner: Mutex::new(GridInner {
                selectors: ControlDimension::iter()
                    .map(ActiveEventSelector::new)
                    .collect(),
                events: Vec::new(),
                fallback: None,
                acknowledged: HashSet::new(),
                rng: StdRng::seed_from_u64(seed),
            }),
            responder,
        }
    }

    /// Replace the live event set after the collaborator reports a change.
    ///
    /// Newly seen events are acknowledged with `Received`. Events are assumed
    /// to be live (scheduled or active); cancellation and expiry are reported
    /// through [`Self::retire_event`] by the collaborator.
    pub fn update_events(&self, events: Vec<ControlEvent>, fallback: Option<FallbackEvent>) {
        let mut inner = self.inner.lock();
        let events: Vec<Arc<ControlEvent>> = events.into_iter().map(Arc::new).collect();

        for event in &events {
            if inner.acknowledged.insert(event.id.clone()) {
                debug!(event_id = %event.id, "acknowledging new grid event");
                notify(self.responder.as_ref(), &event.id, EventOutcome::Received);
            }
        }

        inner.events = events;
        inner.fallback = fallback;
        let GridInner {
            selectors,
            events,
            fallback,
            rng,
            ..
        } = &mut *inner;
        for selector in selectors.iter_mut() {
            selector.refresh(events, fallback.clone(), rng, self.responder.as_ref());
        }
    }

    /// Drop an event on the collaborator's say-so and report the outcome
    /// (`Cancelled` or `Expired`).
    pub fn retire_event(&self, event_id: &str, outcome: EventOutcome) {
        let mut inner = self.inner.lock();
        let before = inner.events.len();
        inner.events.retain(|e| e.id != event_id);
        if inner.events.len() == before {
            warn!(event_id, "retire requested for unknown event");
            return;
        }
        inner.acknowledged.remove(event_id);
        notify(self.responder.as_ref(), event_id, outcome);

        let GridInner {
            selectors,
            events,
            fallback,
            rng,
            ..
        } = &mut *inner;
        for selector in selectors.iter_mut() {
            selector.refresh(events, fallback.clone(), rng, self.responder.as_ref());
        }
    }

    /// Poll every dimension at `now` and assemble the authority's snapshot.
    ///
    /// An overlap detected by any selector is an invariant violation and
    /// fails the whole poll; the caller skips the cycle rather than picking a
    /// winner silently.
    pub fn collect(&self, now: DateTime<Utc>) -> Result<ControlLimitSnapshot, ScheduleError> {
        let mut inner = self.inner.lock();
        let mut snapshot = ControlLimitSnapshot::for_authority(Authority::GridSchedule);

        let GridInner { selectors, .. } = &mut *inner;
        for selector in selectors.iter_mut() {
            let dimension = selector.dimension();
            let Some(limits) = selector.poll(now, self.responder.as_ref())? else {
                continue;
            };
            match dimension {
                ControlDimension::ExportWatts => snapshot.export_watts = limits.export_watts,
                ControlDimension::ImportWatts => snapshot.import_watts = limits.import_watts,
                ControlDimension::GenerationWatts => {
                    snapshot.generation_watts = limits.generation_watts;
                }
                ControlDimension::LoadWatts => snapshot.load_watts = limits.load_watts,
                ControlDimension::Energize => snapshot.energize = limits.energize,
                ControlDimension::Connect => snapshot.connect = limits.connect,
            }
            // A ramp request rides along with whichever event carries it;
            // when several dimensions carry one, the tightest window wins.
            snapshot.ramp_time_seconds = match (snapshot.ramp_time_seconds, limits.ramp_seconds) {
                (Some(current), Some(candidate)) => Some(current.min(candidate)),
                (current, candidate) => current.or(candidate),
            };
        }

        Ok(snapshot)
    }
}

impl LimitAuthority for GridScheduleAuthority {
    fn authority(&self) -> Authority {
        Authority::GridSchedule
    }

    fn snapshot(&self) -> Option<ControlLimitSnapshot> {
        match self.collect(Utc::now()) {
            Ok(snapshot) if !snapshot.is_empty() => Some(snapshot),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "grid schedule poll failed; withholding snapshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ScheduleEntry;
    use crate::event::{EventLimits, EventPriority, LoggingResponder};
    use crate::randomizer::RandomizedEntry;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn event(id: &str, rank: u32, start: i64, end: i64, limits: EventLimits) -> ControlEvent {
        ControlEvent {
            id: id.into(),
            priority: EventPriority::new(rank, at(0)),
            start: at(start),
            end: at(end),
            start_jitter_secs: None,
            duration_jitter_secs: None,
            limits,
        }
    }

    #[test]
    fn collects_active_limits_across_dimensions() {
        let authority = GridScheduleAuthority::new(Arc::new(LoggingResponder), 11);
        authority.update_events(
            vec![
                event(
                    "exp",
                    1,
                    0,
                    100,
                    EventLimits {
                        export_watts: Some(3_000.0),
                        ..EventLimits::default()
                    },
                ),
                event(
                    "conn",
                    1,
                    0,
                    100,
                    EventLimits {
                        connect: Some(false),
                        ..EventLimits::default()
                    },
                ),
            ],
            None,
        );

        let snapshot = authority.collect(at(50)).unwrap();
        assert_eq!(snapshot.authority, Some(Authority::GridSchedule));
        assert_eq!(snapshot.export_watts, Some(3_000.0));
        assert_eq!(snapshot.connect, Some(false));
        assert_eq!(snapshot.generation_watts, None);
    }

    #[test]
    fn fallback_supplies_idle_dimensions() {
        let authority = GridScheduleAuthority::new(Arc::new(LoggingResponder), 11);
        authority.update_events(
            vec![event(
                "exp",
                1,
                50,
                100,
                EventLimits {
                    export_watts: Some(3_000.0),
                    ..EventLimits::default()
                },
            )],
            Some(FallbackEvent {
                limits: EventLimits {
                    export_watts: Some(7_000.0),
                    generation_watts: Some(9_000.0),
                    ..EventLimits::default()
                },
            }),
        );

        let snapshot = authority.collect(at(10)).unwrap();
        assert_eq!(snapshot.export_watts, Some(7_000.0));
        assert_eq!(snapshot.generation_watts, Some(9_000.0));
    }

    #[test]
    fn retire_event_removes_it_from_the_timeline() {
        let authority = GridScheduleAuthority::new(Arc::new(LoggingResponder), 11);
        authority.update_events(
            vec![event(
                "exp",
                1,
                0,
                100,
                EventLimits {
                    export_watts: Some(3_000.0),
                    ..EventLimits::default()
                },
            )],
            None,
        );
        assert_eq!(authority.collect(at(10)).unwrap().export_watts, Some(3_000.0));

        authority.retire_event("exp", EventOutcome::Cancelled);
        assert!(authority.collect(at(10)).unwrap().export_watts.is_none());
    }

    #[test]
    fn ramp_request_rides_with_the_active_event() {
        let authority = GridScheduleAuthority::new(Arc::new(LoggingResponder), 11);
        authority.update_events(
            vec![event(
                "exp",
                1,
                0,
                100,
                EventLimits {
                    export_watts: Some(3_000.0),
                    ramp_seconds: Some(120),
                    ..EventLimits::default()
                },
            )],
            None,
        );
        let snapshot = authority.collect(at(10)).unwrap();
        assert_eq!(snapshot.ramp_time_seconds, Some(120));
    }

    #[test]
    fn shortest_ramp_request_wins_across_dimensions() {
        let authority = GridScheduleAuthority::new(Arc::new(LoggingResponder), 11);
        authority.update_events(
            vec![
                event(
                    "exp",
                    1,
                    0,
                    100,
                    EventLimits {
                        export_watts: Some(3_000.0),
                        ramp_seconds: Some(120),
                        ..EventLimits::default()
                    },
                ),
                event(
                    "gen",
                    1,
                    0,
                    100,
                    EventLimits {
                        generation_watts: Some(6_000.0),
                        ramp_seconds: Some(60),
                        ..EventLimits::default()
                    },
                ),
            ],
            None,
        );
        let snapshot = authority.collect(at(10)).unwrap();
        assert_eq!(snapshot.ramp_time_seconds, Some(60));
    }

    #[test]
    fn overlapping_timeline_fails_the_whole_poll() {
        let authority = GridScheduleAuthority::new(Arc::new(LoggingResponder), 11);

        let unjittered = |evt: ControlEvent| {
            let evt = Arc::new(evt);
            RandomizedEntry {
                effective_start: evt.start,
                effective_end: evt.end,
                end_randomized: false,
                entry: ScheduleEntry {
                    start: evt.start,
                    end: evt.end,
                    event: evt,
                },
            }
        };
        let limits = EventLimits {
            export_watts: Some(3_000.0),
            ..EventLimits::default()
        };
        {
            let mut inner = authority.inner.lock();
            let selector = inner
                .selectors
                .iter_mut()
                .find(|s| s.dimension() == ControlDimension::ExportWatts)
                .unwrap();
            selector.install_entries(vec![
                unjittered(event("first", 1, 0, 100, limits.clone())),
                unjittered(event("second", 2, 50, 150, limits)),
            ]);
        }

        assert!(matches!(
            authority.collect(at(60)),
            Err(ScheduleError::OverlappingEntries { .. })
        ));
    }
}
