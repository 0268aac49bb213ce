//! ---
//! gw_section: "03-event-scheduling"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Grid-event timeline construction and selection."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
//! Grid-event scheduling for DR-GW.
//!
//! Prioritized, possibly-overlapping demand-response events are flattened
//! into a contiguous timeline ([`builder`]), start/duration jitter is applied
//! without opening gaps between touching events ([`randomizer`]), and one
//! selector per control dimension tracks what is active right now and emits
//! lifecycle notifications ([`selector`]).

pub mod builder;
pub mod event;
pub mod grid;
pub mod randomizer;
pub mod selector;

pub use builder::{generate_schedule, BuildOutcome, ScheduleEntry, Supersession};
pub use event::{
    ControlDimension, ControlEvent, EventLimits, EventOutcome, EventPriority, EventResponder,
    FallbackEvent, LoggingResponder,
};
pub use grid::GridScheduleAuthority;
pub use randomizer::{randomize_schedule, RandomizedEntry};
pub use selector::{ActiveEventSelector, ScheduleError};
