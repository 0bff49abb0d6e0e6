use std::collections::BTreeMap;

use crate::topology::{Topology, UnitId};

use super::mode::{GroupMode, Mode, RunState};

/// One mode transition, recorded for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub unit: UnitId,
    pub from: Mode,
    pub to: Mode,
}

/// Everything that changes while the line runs.
///
/// One owned value holds every unit's mode, the pending countdowns, the
/// group mode and the run flags. Commands and ticks take it by `&mut`, so
/// tests can build any starting point they need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineState {
    pub(crate) modes: Vec<Mode>,
    pub(crate) timers: BTreeMap<UnitId, u32>,
    pub(crate) group_mode: GroupMode,
    pub(crate) run: RunState,
}

impl LineState {
    /// All units `Off`, no timers, group Manu, no run.
    pub fn new(topology: &Topology) -> Self {
        Self {
            modes: vec![Mode::Off; topology.len()],
            timers: BTreeMap::new(),
            group_mode: GroupMode::Manual,
            run: RunState::Idle,
        }
    }

    pub fn mode(&self, id: UnitId) -> Mode {
        self.modes[id.index()]
    }

    pub fn is_on(&self, id: UnitId) -> bool {
        self.mode(id).is_on()
    }

    pub fn set_mode(&mut self, id: UnitId, mode: Mode) {
        self.modes[id.index()] = mode;
    }

    /// Set a mode and note the change in `changes` when it differs.
    pub(crate) fn shift(&mut self, id: UnitId, to: Mode, changes: &mut Vec<ModeChange>) {
        let from = self.mode(id);
        if from != to {
            self.set_mode(id, to);
            changes.push(ModeChange { unit: id, from, to });
        }
    }

    pub fn timer(&self, id: UnitId) -> Option<u32> {
        self.timers.get(&id).copied()
    }

    pub fn has_timer(&self, id: UnitId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub fn timers(&self) -> &BTreeMap<UnitId, u32> {
        &self.timers
    }

    pub fn group_mode(&self) -> GroupMode {
        self.group_mode
    }

    pub fn run(&self) -> &RunState {
        &self.run
    }

    pub fn any_on(&self) -> bool {
        self.modes.iter().any(|m| m.is_on())
    }

    /// Arm a countdown on `id` and its pair sibling.
    ///
    /// Units in `Defect` never carry a timer, so they are skipped.
    pub fn arm(&mut self, topology: &Topology, id: UnitId, secs: u32) {
        for unit in topology.with_pair(id) {
            if !self.mode(unit).is_defect() {
                self.timers.insert(unit, secs);
            }
        }
    }

    /// Cancel any countdown on `id` and its pair sibling.
    pub fn clear_timer(&mut self, topology: &Topology, id: UnitId) {
        for unit in topology.with_pair(id) {
            self.timers.remove(&unit);
        }
    }

    /// Record `id` as passed by the current shutdown wave.
    ///
    /// Returns `false` when it was already recorded or no shutdown is running.
    pub(crate) fn mark_visited(&mut self, id: UnitId) -> bool {
        match &mut self.run {
            RunState::Shutdown { visited } => visited.insert(id),
            _ => false,
        }
    }

    /// Energized units with nothing energized upstream of them: the leading
    /// edge of every powered branch.
    pub fn topmost_on(&self, topology: &Topology) -> Vec<UnitId> {
        topology
            .ids()
            .filter(|&id| self.is_on(id))
            .filter(|&id| topology.upstream_of(id).iter().all(|&up| !self.is_on(up)))
            .collect()
    }

    /// First unit flagged `Defect` among `id`'s downstream closure.
    pub fn defect_downstream(&self, topology: &Topology, id: UnitId) -> Option<UnitId> {
        topology
            .all_downstream(id)
            .into_iter()
            .find(|&down| self.mode(down).is_defect())
    }
}
