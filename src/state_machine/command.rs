//! Operator commands.
//!
//! Each command either applies completely and returns the mode changes it
//! caused, or returns a [`Rejection`] without touching the line. Every
//! applied command ends with the interlock pass.

use std::collections::BTreeSet;

use tracing::info;

use crate::error::Rejection;
use crate::topology::{Topology, UnitId};

use super::cascade::seed_upstream;
use super::interlock;
use super::line::{LineState, ModeChange};
use super::mode::{GroupMode, Mode, RunState};
use super::policy::Policy;

pub type CommandResult = Result<Vec<ModeChange>, Rejection>;

fn lookup(topology: &Topology, key: &str) -> Result<UnitId, Rejection> {
    topology
        .id(key)
        .ok_or_else(|| Rejection::UnknownUnit(key.to_string()))
}

fn require_group(line: &LineState, required: GroupMode) -> Result<(), Rejection> {
    if line.group_mode == required {
        Ok(())
    } else {
        Err(Rejection::WrongGroupMode { required })
    }
}

fn require_no_timers(line: &LineState) -> Result<(), Rejection> {
    if line.has_timers() {
        Err(Rejection::TimersActive)
    } else {
        Ok(())
    }
}

/// Flip a unit (and its pair sibling) between `Manual` and `Off`.
///
/// Group Manu only; a unit in `Defect` cannot be toggled. Any countdown
/// waiting on the unit is cancelled.
pub fn toggle_unit(
    line: &mut LineState,
    topology: &Topology,
    policy: &Policy,
    key: &str,
) -> CommandResult {
    let id = lookup(topology, key)?;
    require_group(line, GroupMode::Manual)?;
    if line.mode(id).is_defect() {
        return Err(Rejection::UnitInDefect(key.to_string()));
    }

    let members: Vec<UnitId> = topology
        .with_pair(id)
        .filter(|&unit| !line.mode(unit).is_defect())
        .collect();
    let turning_on = !line.is_on(id);

    if turning_on && policy.defect_blocks_upstream_start {
        for &unit in &members {
            if let Some(defect) = line.defect_downstream(topology, unit) {
                return Err(Rejection::BlockedByDefect {
                    unit: topology.key(unit).to_string(),
                    defect: topology.key(defect).to_string(),
                });
            }
        }
    }

    let mut changes = Vec::new();
    let to = if turning_on { Mode::Manual } else { Mode::Off };
    for &unit in &members {
        line.shift(unit, to, &mut changes);
    }

    line.clear_timer(topology, id);
    if policy.toggle_clears_upstream_timers {
        for up in topology.upstream_of(id) {
            line.clear_timer(topology, up);
        }
    }

    if !turning_on && policy.drain_after_manual_stop {
        for &unit in &members {
            for &down in topology.immediate_downstream(unit) {
                if line.is_on(down) && !line.has_timer(down) && !members.contains(&down) {
                    line.arm(topology, down, policy.countdown_secs);
                }
            }
        }
    }

    interlock::enforce(line, topology, policy, &mut changes);
    Ok(changes)
}

/// Flag a unit `Defect`, or clear the flag back to `Off`.
///
/// Flagging stops everything upstream of the unit (and its pair sibling)
/// in the same call and cancels their timers. Clearing never restarts
/// anything.
pub fn toggle_defect(
    line: &mut LineState,
    topology: &Topology,
    policy: &Policy,
    key: &str,
) -> CommandResult {
    let id = lookup(topology, key)?;
    require_group(line, GroupMode::Manual)?;

    let mut changes = Vec::new();
    if line.mode(id).is_defect() {
        line.shift(id, Mode::Off, &mut changes);
    } else {
        line.shift(id, Mode::Defect, &mut changes);
        line.timers.remove(&id);

        let spared = spared_by_held_sibling(line, topology, policy, id);
        let mut forced: BTreeSet<UnitId> = topology.upstream_of(id).into_iter().collect();
        if let Some(sibling) = topology.pair_of(id)
            && !line.mode(sibling).is_defect()
        {
            forced.insert(sibling);
            forced.extend(topology.upstream_of(sibling));
        }

        for unit in forced {
            if spared.contains(&unit) || line.mode(unit).is_defect() {
                continue;
            }
            line.shift(unit, Mode::Off, &mut changes);
            line.timers.remove(&unit);
        }
    }

    interlock::enforce(line, topology, policy, &mut changes);
    Ok(changes)
}

/// Units kept running when a final belt fails while the belt next to it is
/// held `Manual`: everything feeding that sibling.
fn spared_by_held_sibling(
    line: &LineState,
    topology: &Topology,
    policy: &Policy,
    id: UnitId,
) -> BTreeSet<UnitId> {
    let mut spared = BTreeSet::new();
    if !policy.defect_spares_held_sibling_branch || !topology.is_leaf(id) {
        return spared;
    }
    for &feeder in topology.immediate_upstream(id) {
        for &sibling in topology.immediate_downstream(feeder) {
            if sibling != id && topology.is_leaf(sibling) && line.mode(sibling) == Mode::Manual {
                spared.extend(topology.upstream_of(sibling));
            }
        }
    }
    spared
}

/// Switch the panel between group Auto and group Manu.
///
/// Refused while any timer is counting. Entering Manu drops the run flags
/// and all timers; entering Auto hands every `Manual` unit over to the
/// interlocks as `Auto`. Asking for the current mode changes nothing.
pub fn set_group_mode(
    line: &mut LineState,
    topology: &Topology,
    policy: &Policy,
    next: GroupMode,
) -> CommandResult {
    require_no_timers(line)?;
    let mut changes = Vec::new();
    if line.group_mode == next {
        return Ok(changes);
    }

    match next {
        GroupMode::Manual => {
            line.run = RunState::Idle;
            line.timers.clear();
        }
        GroupMode::Auto => {
            for id in topology.ids() {
                let keep = policy.keep_outputs_manual_on_auto_switch && topology.is_leaf(id);
                if line.mode(id) == Mode::Manual && !keep {
                    line.shift(id, Mode::Auto, &mut changes);
                }
            }
        }
    }
    line.group_mode = next;
    info!(mode = %next, "Group mode switched");

    interlock::enforce(line, topology, policy, &mut changes);
    Ok(changes)
}

/// Start the bottom-up startup cascade.
///
/// The final belts are set `Manual` at once, including belts the group
/// switch had handed over as `Auto`; the units feeding them are armed and
/// the scheduler lights the rest of the line layer by layer. A call that
/// would change nothing is rejected.
pub fn group_power_on(line: &mut LineState, topology: &Topology, policy: &Policy) -> CommandResult {
    require_group(line, GroupMode::Auto)?;
    require_no_timers(line)?;

    let seeds: Vec<UnitId> = topology
        .leaves()
        .filter(|&leaf| !line.mode(leaf).is_defect())
        .collect();
    if seeds.is_empty() {
        return Err(Rejection::NoQualifyingSeed);
    }

    let mut changes = Vec::new();
    for &leaf in &seeds {
        line.shift(leaf, Mode::Manual, &mut changes);
    }
    let armed: usize = seeds
        .iter()
        .map(|&leaf| seed_upstream(line, topology, policy, leaf))
        .sum();

    if armed == 0 {
        if changes.is_empty() {
            return Err(Rejection::NoQualifyingSeed);
        }
        info!("Group power on: nothing upstream to start");
    } else {
        line.run = RunState::Startup;
        info!(armed, "Startup run started");
    }

    interlock::enforce(line, topology, policy, &mut changes);
    Ok(changes)
}

/// Start the top-down shutdown cascade from every leading running unit.
pub fn group_power_off(line: &mut LineState, topology: &Topology, policy: &Policy) -> CommandResult {
    require_group(line, GroupMode::Auto)?;
    require_no_timers(line)?;

    let seeds = line.topmost_on(topology);
    if seeds.is_empty() {
        return Err(Rejection::NoQualifyingSeed);
    }

    line.run = RunState::shutdown();
    for &id in &seeds {
        line.arm(topology, id, policy.countdown_secs);
    }
    info!(seeds = seeds.len(), "Shutdown run started");

    let mut changes = Vec::new();
    interlock::enforce(line, topology, policy, &mut changes);
    Ok(changes)
}
