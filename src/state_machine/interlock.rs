//! Invariants re-established after every command and every tick.
//!
//! [`enforce`] is the only place the hard-pair mirror, the starved-unit
//! demotion, pair timer hygiene and stale-timer collection happen. Running
//! it twice in a row changes nothing the second time.

use tracing::{debug, warn};

use crate::topology::Topology;

use super::line::{LineState, ModeChange};
use super::mode::{GroupMode, Mode};
use super::policy::Policy;

pub fn enforce(
    line: &mut LineState,
    topology: &Topology,
    policy: &Policy,
    changes: &mut Vec<ModeChange>,
) {
    drop_defect_timers(line, topology);
    mirror_pairs(line, topology, changes);

    if line.group_mode == GroupMode::Auto
        && policy.demote_starved_auto_units
        && demote_starved(line, topology, changes)
    {
        mirror_pairs(line, topology, changes);
    }

    sync_pair_timers(line, topology);
    if !line.run.is_running() {
        collect_garbage(line);
    }
}

/// Make every non-defect pair agree on the most energized mode of the two.
pub fn mirror_pairs(line: &mut LineState, topology: &Topology, changes: &mut Vec<ModeChange>) {
    for &(a, b) in topology.pairs() {
        let (ma, mb) = (line.mode(a), line.mode(b));
        if ma == mb || ma.is_defect() || mb.is_defect() {
            continue;
        }
        let target = if ma.energy() >= mb.energy() { ma } else { mb };
        debug!(
            a = topology.key(a),
            b = topology.key(b),
            mode = %target,
            "Pair disagreed, mirroring"
        );
        line.shift(a, target, changes);
        line.shift(b, target, changes);
    }
}

// Walk leaves to root so a demotion reaches everything above it in one pass.
fn demote_starved(line: &mut LineState, topology: &Topology, changes: &mut Vec<ModeChange>) -> bool {
    let mut demoted = false;
    for id in topology.ids().rev() {
        if line.mode(id) != Mode::Auto || topology.is_leaf(id) {
            continue;
        }
        let fed = topology
            .immediate_downstream(id)
            .iter()
            .any(|&down| line.is_on(down));
        if !fed {
            debug!(unit = topology.key(id), "Nothing running downstream, demoting");
            line.shift(id, Mode::Off, changes);
            line.timers.remove(&id);
            demoted = true;
        }
    }
    demoted
}

fn drop_defect_timers(line: &mut LineState, topology: &Topology) {
    let stale: Vec<_> = line
        .timers
        .keys()
        .copied()
        .filter(|&id| line.mode(id).is_defect())
        .collect();
    for id in stale {
        warn!(unit = topology.key(id), "Dropping timer on defect unit");
        line.timers.remove(&id);
    }
}

fn sync_pair_timers(line: &mut LineState, topology: &Topology) {
    for &(a, b) in topology.pairs() {
        match (line.timer(a), line.timer(b)) {
            (Some(secs), None) if !line.mode(b).is_defect() => {
                line.timers.insert(b, secs);
            }
            (None, Some(secs)) if !line.mode(a).is_defect() => {
                line.timers.insert(a, secs);
            }
            (Some(sa), Some(sb)) if sa != sb => {
                let secs = sa.min(sb);
                line.timers.insert(a, secs);
                line.timers.insert(b, secs);
            }
            _ => {}
        }
    }
}

// Outside a run nothing will ever act on a timer parked on a stopped unit.
fn collect_garbage(line: &mut LineState) {
    let modes = &line.modes;
    line.timers.retain(|id, _| modes[id.index()].is_on());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::mode::RunState;
    use crate::topology::UnitId;

    fn id(t: &Topology, key: &str) -> UnitId {
        t.id(key).unwrap()
    }

    fn setup() -> (Topology, LineState, Policy) {
        let t = Topology::standard();
        let line = LineState::new(&t);
        (t, line, Policy::default())
    }

    #[test]
    fn mirror_prefers_manual_over_auto() {
        let (t, mut line, policy) = setup();
        line.set_mode(id(&t, "millA"), Mode::Auto);
        line.set_mode(id(&t, "millB"), Mode::Manual);
        let mut changes = Vec::new();
        enforce(&mut line, &t, &policy, &mut changes);
        assert_eq!(line.mode(id(&t, "millA")), Mode::Manual);
        assert_eq!(line.mode(id(&t, "millB")), Mode::Manual);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn mirror_prefers_auto_over_off() {
        let (t, mut line, policy) = setup();
        line.set_mode(id(&t, "millB"), Mode::Auto);
        enforce(&mut line, &t, &policy, &mut Vec::new());
        assert_eq!(line.mode(id(&t, "millA")), Mode::Auto);
    }

    #[test]
    fn mirror_leaves_defect_pairs_alone() {
        let (t, mut line, policy) = setup();
        line.set_mode(id(&t, "millA"), Mode::Defect);
        line.set_mode(id(&t, "millB"), Mode::Manual);
        enforce(&mut line, &t, &policy, &mut Vec::new());
        assert_eq!(line.mode(id(&t, "millA")), Mode::Defect);
        assert_eq!(line.mode(id(&t, "millB")), Mode::Manual);
    }

    #[test]
    fn starved_auto_units_drop_in_group_auto_only() {
        let (t, mut line, policy) = setup();
        for key in ["esteiraMain", "millA", "millB", "canoUnderMotor"] {
            line.set_mode(id(&t, key), Mode::Auto);
        }
        enforce(&mut line, &t, &policy, &mut Vec::new());
        assert_eq!(line.mode(id(&t, "canoUnderMotor")), Mode::Auto);

        line.group_mode = GroupMode::Auto;
        let mut changes = Vec::new();
        enforce(&mut line, &t, &policy, &mut changes);
        assert!(!line.any_on());
        assert_eq!(changes.len(), 4);
    }

    #[test]
    fn starved_manual_units_are_kept() {
        let (t, mut line, policy) = setup();
        line.group_mode = GroupMode::Auto;
        line.set_mode(id(&t, "separador"), Mode::Manual);
        line.set_mode(id(&t, "esteiraUnderCano"), Mode::Auto);
        enforce(&mut line, &t, &policy, &mut Vec::new());
        assert_eq!(line.mode(id(&t, "separador")), Mode::Manual);
        assert_eq!(line.mode(id(&t, "esteiraUnderCano")), Mode::Auto);
    }

    #[test]
    fn defect_units_lose_their_timers() {
        let (t, mut line, policy) = setup();
        line.run = RunState::Startup;
        line.set_mode(id(&t, "separador"), Mode::Defect);
        line.timers.insert(id(&t, "separador"), 2);
        enforce(&mut line, &t, &policy, &mut Vec::new());
        assert!(!line.has_timers());
    }

    #[test]
    fn half_armed_pair_is_completed() {
        let (t, mut line, policy) = setup();
        line.run = RunState::Startup;
        line.timers.insert(id(&t, "millA"), 2);
        enforce(&mut line, &t, &policy, &mut Vec::new());
        assert_eq!(line.timer(id(&t, "millB")), Some(2));
    }

    #[test]
    fn stale_timers_collected_outside_runs() {
        let (t, mut line, policy) = setup();
        line.set_mode(id(&t, "separador"), Mode::Manual);
        line.timers.insert(id(&t, "separador"), 1);
        line.timers.insert(id(&t, "esteiraDireita"), 1);
        enforce(&mut line, &t, &policy, &mut Vec::new());
        assert_eq!(line.timer(id(&t, "separador")), Some(1));
        assert_eq!(line.timer(id(&t, "esteiraDireita")), None);
    }

    #[test]
    fn timers_on_off_units_survive_during_runs() {
        let (t, mut line, policy) = setup();
        line.run = RunState::shutdown();
        line.timers.insert(id(&t, "esteiraDireita"), 1);
        enforce(&mut line, &t, &policy, &mut Vec::new());
        assert_eq!(line.timer(id(&t, "esteiraDireita")), Some(1));
    }
}
