//! ---
//! gw_section: "02-limit-arbitration"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Control-limit snapshots and arbitration."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// An independent source of control-limit opinions.
///
/// Authorities are polled in a fixed declared order each arbitration cycle;
/// that order is what makes the last-snapshot-wins fields deterministic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Authority {
    /// The utility demand-response schedule (active event per dimension).
    GridSchedule,
    /// Locally configured fixed policy.
    FixedPolicy,
    /// Operator commands arriving over the local message bus.
    MessageBus,
    /// Tariff-driven optimisation logic.
    Tariff,
    /// Safety overrides; always honoured since every rule is restrictive.
    SafetyOverride,
    /// UI-driven operator overrides.
    Operator,
    /// Synthetic source attributed when the export limit is widened to keep
    /// battery charge headroom.
    BatteryChargeBuffer,
}

/// Storage dispatch posture requested for a battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StorageMode {
    SelfConsumption,
    ForceCharge,
    ForceDischarge,
    Idle,
}

/// Which resource is served first when generation is constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PriorityMode {
    SolarFirst,
    BatteryFirst,
    GridFirst,
}

/// One authority's opinion at a point in time. Absent fields mean the
/// authority has no opinion on that control dimension this cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlLimitSnapshot {
    pub authority: Option<Authority>,
    pub connect: Option<bool>,
    pub energize: Option<bool>,
    pub export_watts: Option<f64>,
    pub import_watts: Option<f64>,
    pub generation_watts: Option<f64>,
    pub load_watts: Option<f64>,
    pub ramp_rate_percent: Option<f64>,
    /// Requested ramp-to-target window in seconds. Drives the time-bounded
    /// ramp policy for as long as it is present.
    pub ramp_time_seconds: Option<u32>,
    pub battery_charge_max_watts: Option<f64>,
    pub battery_discharge_max_watts: Option<f64>,
    pub battery_grid_charge_max_watts: Option<f64>,
    pub battery_soc_floor_percent: Option<f64>,
    pub battery_soc_ceiling_percent: Option<f64>,
    pub battery_grid_charging_enabled: Option<bool>,
    pub battery_target_soc_percent: Option<f64>,
    pub target_import_watts: Option<f64>,
    pub target_export_watts: Option<f64>,
    pub storage_mode: Option<StorageMode>,
    pub priority_mode: Option<PriorityMode>,
}

impl ControlLimitSnapshot {
    pub fn for_authority(authority: Authority) -> Self {
        Self {
            authority: Some(authority),
            ..Self::default()
        }
    }

    /// True when the snapshot carries no opinion at all.
    pub fn is_empty(&self) -> bool {
        self.connect.is_none()
            && self.energize.is_none()
            && self.export_watts.is_none()
            && self.import_watts.is_none()
            && self.generation_watts.is_none()
            && self.load_watts.is_none()
            && self.ramp_rate_percent.is_none()
            && self.ramp_time_seconds.is_none()
            && self.battery_charge_max_watts.is_none()
            && self.battery_discharge_max_watts.is_none()
            && self.battery_grid_charge_max_watts.is_none()
            && self.battery_soc_floor_percent.is_none()
            && self.battery_soc_ceiling_percent.is_none()
            && self.battery_grid_charging_enabled.is_none()
            && self.battery_target_soc_percent.is_none()
            && self.target_import_watts.is_none()
            && self.target_export_watts.is_none()
            && self.storage_mode.is_none()
            && self.priority_mode.is_none()
    }
}

/// A merged value together with the authority it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attributed<T> {
    pub value: T,
    pub source: Authority,
}

impl<T> Attributed<T> {
    pub fn new(value: T, source: Authority) -> Self {
        Self { value, source }
    }
}

/// The arbitrated, per-field merged limit for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveLimit {
    pub connect: Option<Attributed<bool>>,
    pub energize: Option<Attributed<bool>>,
    pub export_watts: Option<Attributed<f64>>,
    pub import_watts: Option<Attributed<f64>>,
    pub generation_watts: Option<Attributed<f64>>,
    pub load_watts: Option<Attributed<f64>>,
    pub ramp_rate_percent: Option<Attributed<f64>>,
    pub ramp_time_seconds: Option<Attributed<u32>>,
    pub battery_charge_max_watts: Option<Attributed<f64>>,
    pub battery_discharge_max_watts: Option<Attributed<f64>>,
    pub battery_grid_charge_max_watts: Option<Attributed<f64>>,
    pub battery_soc_floor_percent: Option<Attributed<f64>>,
    pub battery_soc_ceiling_percent: Option<Attributed<f64>>,
    pub battery_grid_charging_enabled: Option<Attributed<bool>>,
    pub battery_target_soc_percent: Option<Attributed<f64>>,
    pub target_import_watts: Option<Attributed<f64>>,
    pub target_export_watts: Option<Attributed<f64>>,
    pub storage_mode: Option<Attributed<StorageMode>>,
    pub priority_mode: Option<Attributed<PriorityMode>>,
}

/// Pull-based producer of one [`ControlLimitSnapshot`] per arbitration cycle.
///
/// Implementations must not block: the control loop calls every authority
/// inline on each cycle.
pub trait LimitAuthority: Send + Sync {
    fn authority(&self) -> Authority;

    /// The authority's current opinion, or `None` when it has nothing to say
    /// this cycle.
    fn snapshot(&self) -> Option<ControlLimitSnapshot>;
}

/// Fixed local policy backed by a static snapshot, typically built from
/// configuration at startup.
#[derive(Debug, Clone)]
pub struct FixedPolicyAuthority {
    snapshot: ControlLimitSnapshot,
}

impl FixedPolicyAuthority {
    pub fn new(mut snapshot: ControlLimitSnapshot) -> Self {
        snapshot.authority = Some(Authority::FixedPolicy);
        Self { snapshot }
    }
}

impl LimitAuthority for FixedPolicyAuthority {
    fn authority(&self) -> Authority {
        Authority::FixedPolicy
    }

    fn snapshot(&self) -> Option<ControlLimitSnapshot> {
        if self.snapshot.is_empty() {
            None
        } else {
            Some(self.snapshot.clone())
        }
    }
}
