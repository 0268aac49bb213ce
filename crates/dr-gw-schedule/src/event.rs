//! ---
//! gw_section: "03-event-scheduling"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Grid-event timeline construction and selection."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use tracing::debug;

/// One independently-arbitrated quantity a grid event may constrain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ControlDimension {
    ExportWatts,
    ImportWatts,
    GenerationWatts,
    LoadWatts,
    Energize,
    Connect,
}

/// Named limit fields a grid event or program default may carry. Absent
/// fields mean the event does not constrain that dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLimits {
    pub export_watts: Option<f64>,
    pub import_watts: Option<f64>,
    pub generation_watts: Option<f64>,
    pub load_watts: Option<f64>,
    pub energize: Option<bool>,
    pub connect: Option<bool>,
    /// Requested ramp-to-target window in seconds, if the event asked for one.
    pub ramp_seconds: Option<u32>,
}

impl EventLimits {
    /// Whether this limit set carries an opinion for `dimension`.
    pub fn carries(&self, dimension: ControlDimension) -> bool {
        match dimension {
            ControlDimension::ExportWatts => self.export_watts.is_some(),
            ControlDimension::ImportWatts => self.import_watts.is_some(),
            ControlDimension::GenerationWatts => self.generation_watts.is_some(),
            ControlDimension::LoadWatts => self.load_watts.is_some(),
            ControlDimension::Energize => self.energize.is_some(),
            ControlDimension::Connect => self.connect.is_some(),
        }
    }
}

/// Priority key for a scheduled event: lower program rank wins, earlier
/// creation time breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPriority {
    pub program_rank: u32,
    pub created_at: DateTime<Utc>,
}

impl EventPriority {
    pub fn new(program_rank: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            program_rank,
            created_at,
        }
    }
}

impl Ord for EventPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.program_rank
            .cmp(&other.program_rank)
            .then_with(|| self.created_at.cmp(&other.created_at))
    }
}

impl PartialOrd for EventPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One scheduled grid directive, immutable once received. Inputs to the
/// schedule builder are assumed to be live (not cancelled or expired);
/// filtering is the protocol collaborator's responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEvent {
    pub id: String,
    pub priority: EventPriority,
    /// Inclusive start of the directive window.
    pub start: DateTime<Utc>,
    /// Exclusive end of the directive window.
    pub end: DateTime<Utc>,
    /// Permitted start jitter in seconds; may be negative.
    pub start_jitter_secs: Option<i64>,
    /// Permitted duration jitter in seconds; may be negative.
    pub duration_jitter_secs: Option<i64>,
    pub limits: EventLimits,
}

impl ControlEvent {
    /// Whether the unrandomized window covers `instant`.
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Program-level default applied when no event is active for a dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub limits: EventLimits,
}

/// Lifecycle outcomes reported back to the grid-protocol collaborator. These
/// map 1:1 onto the protocol's response codes; how they are transmitted is
/// the collaborator's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EventOutcome {
    Received,
    Started,
    Completed,
    Superseded,
    Cancelled,
    Expired,
}

/// Sink for event lifecycle notifications.
///
/// Posts are fire-and-forget from the engine's perspective: a failure is
/// logged by the caller and never aborts the cycle that produced it.
pub trait EventResponder: Send + Sync {
    fn post(&self, event_id: &str, outcome: EventOutcome) -> anyhow::Result<()>;
}

/// Responder that only logs, used in simulation mode and tests.
#[derive(Debug, Default, Clone)]
pub struct LoggingResponder;

impl EventResponder for LoggingResponder {
    fn post(&self, event_id: &str, outcome: EventOutcome) -> anyhow::Result<()> {
        debug!(event_id, outcome = %outcome, "event lifecycle outcome");
        Ok(())
    }
}
