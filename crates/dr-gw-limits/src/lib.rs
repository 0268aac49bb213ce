//! ---
//! gw_section: "02-limit-arbitration"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Control-limit snapshots and arbitration."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
//! Control-limit vocabulary for DR-GW: authority identifiers, per-authority
//! limit snapshots, and the most-restrictive-wins arbitration that folds them
//! into one active limit per cycle.

pub mod arbitrator;
pub mod snapshot;

pub use arbitrator::arbitrate;
pub use snapshot::{
    ActiveLimit, Attributed, Authority, ControlLimitSnapshot, FixedPolicyAuthority,
    LimitAuthority, PriorityMode, StorageMode,
};
