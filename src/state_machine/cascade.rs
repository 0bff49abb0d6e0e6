use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, info};

use crate::topology::{Topology, UnitId};

use super::interlock;
use super::line::{LineState, ModeChange};
use super::mode::{Mode, RunKind, RunState};
use super::policy::{Policy, StartupPromotion};

/// What one tick did to the line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Units whose countdown reached zero, root first.
    pub expired: Vec<UnitId>,
    pub changes: Vec<ModeChange>,
    /// Set when this tick ended a startup or shutdown run.
    pub finished: Option<RunKind>,
}

impl TickReport {
    /// Nothing expired, changed or finished.
    pub fn is_quiet(&self) -> bool {
        self.expired.is_empty() && self.changes.is_empty() && self.finished.is_none()
    }
}

/// The tick-driven half of the engine.
pub struct Cascade;

impl Cascade {
    /// Advance every countdown by one second and act on the ones that ran out.
    ///
    /// - `Shutdown`: expired units stop and the wave moves one layer down,
    ///   passing straight through units that are already stopped.
    /// - `Startup`: expired units energize and arm whatever upstream unit is
    ///   ready to follow them.
    /// - `Idle`: expired units stop; nothing propagates.
    ///
    /// A run ends once no timer is left (and, for a shutdown, nothing is
    /// running). The interlock pass runs last on every tick.
    pub fn tick(line: &mut LineState, topology: &Topology, policy: &Policy) -> TickReport {
        let mut report = TickReport::default();

        if line.has_timers() {
            let expired = countdown(line);
            match line.run.kind() {
                RunKind::Shutdown => {
                    shutdown_step(line, topology, policy, &expired, &mut report.changes)
                }
                RunKind::Startup => {
                    startup_step(line, topology, policy, &expired, &mut report.changes)
                }
                RunKind::Idle => idle_step(line, &expired, &mut report.changes),
            }
            report.expired = expired;
        }

        report.finished = settle_run(line, topology, policy);
        interlock::enforce(line, topology, policy, &mut report.changes);
        report
    }
}

// Decrement all timers; the ones that hit zero leave the set.
fn countdown(line: &mut LineState) -> Vec<UnitId> {
    let mut expired = Vec::new();
    line.timers.retain(|&id, secs| {
        *secs = secs.saturating_sub(1);
        if *secs == 0 {
            expired.push(id);
            false
        } else {
            true
        }
    });
    expired
}

fn shutdown_step(
    line: &mut LineState,
    topology: &Topology,
    policy: &Policy,
    expired: &[UnitId],
    changes: &mut Vec<ModeChange>,
) {
    for &id in expired {
        if line.is_on(id) {
            line.shift(id, Mode::Off, changes);
        }
        line.mark_visited(id);
    }
    for &id in expired {
        advance_shutdown(line, topology, policy, id);
    }
}

/// Arm the next running layer below `from`.
///
/// Stopped units in between are recorded as visited and walked through
/// without delay, so the wave cannot stall on a branch that was already
/// de-energized. A running unit is armed only once nothing upstream of it
/// still feeds it.
fn advance_shutdown(line: &mut LineState, topology: &Topology, policy: &Policy, from: UnitId) {
    let mut queue: VecDeque<UnitId> = topology.immediate_downstream(from).iter().copied().collect();
    while let Some(next) = queue.pop_front() {
        if line.has_timer(next) {
            continue;
        }
        if line.is_on(next) {
            let still_fed = topology
                .immediate_upstream(next)
                .iter()
                .any(|&up| line.is_on(up));
            if !still_fed {
                debug!(unit = topology.key(next), secs = policy.countdown_secs, "Shutdown armed");
                line.arm(topology, next, policy.countdown_secs);
            }
        } else if line.mark_visited(next) {
            queue.extend(topology.immediate_downstream(next).iter().copied());
        }
    }
}

fn startup_step(
    line: &mut LineState,
    topology: &Topology,
    policy: &Policy,
    expired: &[UnitId],
    changes: &mut Vec<ModeChange>,
) {
    let gated = policy.startup_promotion == StartupPromotion::ReadinessGated;
    let mut lit = Vec::new();

    for &id in expired {
        match line.mode(id) {
            Mode::Off if gated => line.shift(id, Mode::Auto, changes),
            Mode::Off => {
                line.shift(id, Mode::Manual, changes);
                lit.push(id);
            }
            Mode::Manual => lit.push(id),
            Mode::Auto if !gated => lit.push(id),
            Mode::Auto | Mode::Defect => {}
        }
    }

    if gated {
        lit.extend(confirm_ready(line, topology, changes));
    }
    for id in lit {
        seed_upstream(line, topology, policy, id);
    }
}

/// Promote `Auto` units to `Manual` once everything they feed is `Manual`
/// or `Defect`. Leaves are walked first so one pass settles the line.
fn confirm_ready(
    line: &mut LineState,
    topology: &Topology,
    changes: &mut Vec<ModeChange>,
) -> Vec<UnitId> {
    let mut confirmed = Vec::new();
    for id in topology.ids().rev() {
        if line.mode(id) != Mode::Auto {
            continue;
        }
        let ready = topology
            .immediate_downstream(id)
            .iter()
            .all(|&down| matches!(line.mode(down), Mode::Manual | Mode::Defect));
        if ready {
            line.shift(id, Mode::Manual, changes);
            confirmed.push(id);
        }
    }
    confirmed
}

/// Arm startup timers on the units that should energize after `from`.
///
/// Units already running are passed through to reach the stopped ones above
/// them. Returns how many units were armed (pairs count once).
pub(crate) fn seed_upstream(
    line: &mut LineState,
    topology: &Topology,
    policy: &Policy,
    from: UnitId,
) -> usize {
    let mut armed = 0;
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<UnitId> = topology.immediate_upstream(from).iter().copied().collect();

    while let Some(up) = queue.pop_front() {
        if !seen.insert(up) || line.has_timer(up) {
            continue;
        }
        match line.mode(up) {
            Mode::Off => {
                if ready_to_energize(line, topology, policy, up) {
                    debug!(unit = topology.key(up), secs = policy.countdown_secs, "Startup armed");
                    line.arm(topology, up, policy.countdown_secs);
                    armed += 1;
                }
            }
            Mode::Manual | Mode::Auto => {
                queue.extend(topology.immediate_upstream(up).iter().copied());
            }
            Mode::Defect => {}
        }
    }
    armed
}

fn ready_to_energize(line: &LineState, topology: &Topology, policy: &Policy, id: UnitId) -> bool {
    if line.mode(id).is_defect() || line.defect_downstream(topology, id).is_some() {
        return false;
    }
    match policy.startup_promotion {
        StartupPromotion::Direct => true,
        StartupPromotion::ReadinessGated => topology
            .immediate_downstream(id)
            .iter()
            .all(|&down| line.mode(down) == Mode::Manual),
    }
}

// Ad hoc timers outside a run: the unit simply stops.
fn idle_step(line: &mut LineState, expired: &[UnitId], changes: &mut Vec<ModeChange>) {
    for &id in expired {
        if line.is_on(id) {
            line.shift(id, Mode::Off, changes);
        }
    }
}

/// Close the run once its timers are spent.
///
/// A shutdown with nothing armed but units still running (possible only
/// from an injected state) is re-seeded from the current leading edges.
fn settle_run(line: &mut LineState, topology: &Topology, policy: &Policy) -> Option<RunKind> {
    if line.has_timers() {
        return None;
    }
    match line.run.kind() {
        RunKind::Idle => None,
        RunKind::Startup => {
            line.run = RunState::Idle;
            info!("Startup run finished");
            Some(RunKind::Startup)
        }
        RunKind::Shutdown if line.any_on() => {
            for id in line.topmost_on(topology) {
                line.arm(topology, id, policy.countdown_secs);
            }
            debug!(timers = line.timers.len(), "Shutdown re-seeded");
            None
        }
        RunKind::Shutdown => {
            line.run = RunState::Idle;
            info!("Shutdown run finished");
            Some(RunKind::Shutdown)
        }
    }
}
