//! ---
//! gw_section: "02-limit-arbitration"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Control-limit snapshots and arbitration."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use tracing::{debug, warn};

use crate::snapshot::{ActiveLimit, Attributed, Authority, ControlLimitSnapshot};

/// Merge one snapshot per authority into the active limit for this cycle.
///
/// Every present value from every snapshot is considered. Watt limits and the
/// SOC ceiling take the minimum, the SOC floor takes the maximum, boolean
/// permissions let `false` win, and the remaining battery dispatch fields take
/// the last non-absent snapshot in iteration order.
///
/// When `battery_charge_buffer_watts` is set and the merged export limit ends
/// up tighter than the buffer, the export limit is widened back to the buffer
/// and re-attributed to [`Authority::BatteryChargeBuffer`]. This is the one
/// sanctioned exception to monotonic tightening: a battery must always keep
/// room to charge from excess generation.
pub fn arbitrate(
    snapshots: &[ControlLimitSnapshot],
    battery_charge_buffer_watts: Option<f64>,
) -> ActiveLimit {
    let mut active = ActiveLimit::default();

    for snapshot in snapshots {
        let Some(source) = snapshot.authority else {
            warn!("discarding control-limit snapshot without an authority");
            continue;
        };

        merge_false_wins(&mut active.connect, snapshot.connect, source);
        merge_false_wins(&mut active.energize, snapshot.energize, source);

        merge_min(&mut active.export_watts, snapshot.export_watts, source);
        merge_min(&mut active.import_watts, snapshot.import_watts, source);
        merge_min(
            &mut active.generation_watts,
            snapshot.generation_watts,
            source,
        );
        merge_min(&mut active.load_watts, snapshot.load_watts, source);
        merge_min(
            &mut active.ramp_rate_percent,
            snapshot.ramp_rate_percent,
            source,
        );
        merge_min_u32(
            &mut active.ramp_time_seconds,
            snapshot.ramp_time_seconds,
            source,
        );
        merge_min(
            &mut active.battery_charge_max_watts,
            snapshot.battery_charge_max_watts,
            source,
        );
        merge_min(
            &mut active.battery_discharge_max_watts,
            snapshot.battery_discharge_max_watts,
            source,
        );
        merge_min(
            &mut active.battery_grid_charge_max_watts,
            snapshot.battery_grid_charge_max_watts,
            source,
        );

        merge_max(
            &mut active.battery_soc_floor_percent,
            snapshot.battery_soc_floor_percent,
            source,
        );
        merge_min(
            &mut active.battery_soc_ceiling_percent,
            snapshot.battery_soc_ceiling_percent,
            source,
        );
        merge_false_wins(
            &mut active.battery_grid_charging_enabled,
            snapshot.battery_grid_charging_enabled,
            source,
        );

        // No restrictiveness ordering exists for the dispatch targets below;
        // the last authority in iteration order wins. See DESIGN.md.
        merge_last(
            &mut active.battery_target_soc_percent,
            snapshot.battery_target_soc_percent,
            source,
        );
        merge_last(
            &mut active.target_import_watts,
            snapshot.target_import_watts,
            source,
        );
        merge_last(
            &mut active.target_export_watts,
            snapshot.target_export_watts,
            source,
        );
        merge_last(&mut active.storage_mode, snapshot.storage_mode, source);
        merge_last(&mut active.priority_mode, snapshot.priority_mode, source);
    }

    if let Some(buffer) = battery_charge_buffer_watts {
        if let Some(export) = &active.export_watts {
            if export.value < buffer {
                debug!(
                    arbitrated_watts = export.value,
                    buffer_watts = buffer,
                    displaced = %export.source,
                    "widening export limit to preserve battery charge headroom"
                );
                active.export_watts =
                    Some(Attributed::new(buffer, Authority::BatteryChargeBuffer));
            }
        }
    }

    active
}

fn merge_min(slot: &mut Option<Attributed<f64>>, candidate: Option<f64>, source: Authority) {
    if let Some(value) = candidate {
        match slot {
            Some(current) if current.value <= value => {}
            _ => *slot = Some(Attributed::new(value, source)),
        }
    }
}

fn merge_min_u32(slot: &mut Option<Attributed<u32>>, candidate: Option<u32>, source: Authority) {
    if let Some(value) = candidate {
        match slot {
            Some(current) if current.value <= value => {}
            _ => *slot = Some(Attributed::new(value, source)),
        }
    }
}

fn merge_max(slot: &mut Option<Attributed<f64>>, candidate: Option<f64>, source: Authority) {
    if let Some(value) = candidate {
        match slot {
            Some(current) if current.value >= value => {}
            _ => *slot = Some(Attributed::new(value, source)),
        }
    }
}

fn merge_false_wins(slot: &mut Option<Attributed<bool>>, candidate: Option<bool>, source: Authority) {
    if let Some(value) = candidate {
        match slot {
            Some(current) if !current.value || current.value == value => {}
            _ => *slot = Some(Attributed::new(value, source)),
        }
    }
}

fn merge_last<T>(slot: &mut Option<Attributed<T>>, candidate: Option<T>, source: Authority) {
    if let Some(value) = candidate {
        *slot = Some(Attributed::new(value, source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::StorageMode;

    fn snapshot(authority: Authority) -> ControlLimitSnapshot {
        ControlLimitSnapshot::for_authority(authority)
    }

    #[test]
    fn tighter_export_limit_wins_with_attribution() {
        let mut first = snapshot(Authority::FixedPolicy);
        first.export_watts = Some(5_000.0);
        let mut second = snapshot(Authority::GridSchedule);
        second.export_watts = Some(3_000.0);

        let active = arbitrate(&[first, second], None);
        let export = active.export_watts.unwrap();
        assert_eq!(export.value, 3_000.0);
        assert_eq!(export.source, Authority::GridSchedule);
    }

    #[test]
    fn adding_a_snapshot_never_loosens_watt_limits() {
        let mut tight = snapshot(Authority::SafetyOverride);
        tight.generation_watts = Some(1_000.0);
        let mut loose = snapshot(Authority::Tariff);
        loose.generation_watts = Some(9_000.0);

        let only_tight = arbitrate(&[tight.clone()], None);
        let both = arbitrate(&[tight, loose], None);
        assert_eq!(
            only_tight.generation_watts.unwrap().value,
            both.generation_watts.unwrap().value
        );
    }

    #[test]
    fn false_beats_true_for_connect_and_energize() {
        let mut permissive = snapshot(Authority::FixedPolicy);
        permissive.connect = Some(true);
        permissive.energize = Some(true);
        let mut restrictive = snapshot(Authority::SafetyOverride);
        restrictive.connect = Some(false);

        let active = arbitrate(&[permissive, restrictive], None);
        let connect = active.connect.unwrap();
        assert!(!connect.value);
        assert_eq!(connect.source, Authority::SafetyOverride);
        assert!(active.energize.unwrap().value);
    }

    #[test]
    fn false_connect_is_not_overridden_by_later_true() {
        let mut restrictive = snapshot(Authority::SafetyOverride);
        restrictive.connect = Some(false);
        let mut permissive = snapshot(Authority::Operator);
        permissive.connect = Some(true);

        let active = arbitrate(&[restrictive, permissive], None);
        assert!(!active.connect.unwrap().value);
    }

    #[test]
    fn soc_band_only_narrows() {
        let mut a = snapshot(Authority::FixedPolicy);
        a.battery_soc_floor_percent = Some(10.0);
        a.battery_soc_ceiling_percent = Some(95.0);
        let mut b = snapshot(Authority::Tariff);
        b.battery_soc_floor_percent = Some(25.0);
        b.battery_soc_ceiling_percent = Some(80.0);

        let active = arbitrate(&[a, b], None);
        assert_eq!(active.battery_soc_floor_percent.unwrap().value, 25.0);
        assert_eq!(active.battery_soc_ceiling_percent.unwrap().value, 80.0);
    }

    #[test]
    fn dispatch_targets_take_last_snapshot() {
        let mut a = snapshot(Authority::Tariff);
        a.battery_target_soc_percent = Some(60.0);
        a.storage_mode = Some(StorageMode::ForceCharge);
        let mut b = snapshot(Authority::MessageBus);
        b.battery_target_soc_percent = Some(40.0);
        b.storage_mode = Some(StorageMode::SelfConsumption);

        let active = arbitrate(&[a, b], None);
        let target = active.battery_target_soc_percent.unwrap();
        assert_eq!(target.value, 40.0);
        assert_eq!(target.source, Authority::MessageBus);
        assert_eq!(
            active.storage_mode.unwrap().value,
            StorageMode::SelfConsumption
        );
    }

    #[test]
    fn charge_buffer_widens_tight_export_limit() {
        let mut tight = snapshot(Authority::GridSchedule);
        tight.export_watts = Some(1_000.0);

        let active = arbitrate(&[tight], Some(2_000.0));
        let export = active.export_watts.unwrap();
        assert_eq!(export.value, 2_000.0);
        assert_eq!(export.source, Authority::BatteryChargeBuffer);
    }

    #[test]
    fn charge_buffer_leaves_looser_limit_alone() {
        let mut loose = snapshot(Authority::GridSchedule);
        loose.export_watts = Some(3_500.0);

        let active = arbitrate(&[loose], Some(2_000.0));
        let export = active.export_watts.unwrap();
        assert_eq!(export.value, 3_500.0);
        assert_eq!(export.source, Authority::GridSchedule);
    }

    #[test]
    fn snapshot_without_authority_is_ignored() {
        let mut anonymous = ControlLimitSnapshot::default();
        anonymous.export_watts = Some(100.0);

        let active = arbitrate(&[anonymous], None);
        assert!(active.export_watts.is_none());
    }
}
