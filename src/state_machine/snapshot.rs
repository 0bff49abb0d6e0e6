use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LinhaError;
use crate::topology::Topology;

use super::line::LineState;
use super::mode::{GroupMode, Mode, RunKind};

/// One unit as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitView {
    pub key: String,
    pub label: String,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u32>,
}

/// Read-only copy of the line, root to leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub group_mode: GroupMode,
    pub run: RunKind,
    pub units: Vec<UnitView>,
}

impl Snapshot {
    pub fn capture(line: &LineState, topology: &Topology) -> Self {
        let units = topology
            .ids()
            .map(|id| UnitView {
                key: topology.key(id).to_string(),
                label: topology.label(id).to_string(),
                mode: line.mode(id),
                remaining_secs: line.timer(id),
            })
            .collect();
        Self {
            group_mode: line.group_mode(),
            run: line.run().kind(),
            units,
        }
    }

    pub fn unit(&self, key: &str) -> Option<&UnitView> {
        self.units.iter().find(|u| u.key == key)
    }

    pub fn mode(&self, key: &str) -> Option<Mode> {
        self.unit(key).map(|u| u.mode)
    }

    pub fn timer(&self, key: &str) -> Option<u32> {
        self.unit(key).and_then(|u| u.remaining_secs)
    }

    pub fn has_timers(&self) -> bool {
        self.units.iter().any(|u| u.remaining_secs.is_some())
    }
}

/// Externally persisted line state, keyed by unit key.
///
/// Missing units start `Off`. The image is trusted only as far as keys go:
/// pair disagreements or timers on defect units are repaired by the first
/// tick after restoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateImage {
    #[serde(default)]
    pub group_mode: GroupMode,
    #[serde(default)]
    pub run: RunKind,
    #[serde(default)]
    pub modes: BTreeMap<String, Mode>,
    #[serde(default)]
    pub timers: BTreeMap<String, u32>,
}

impl StateImage {
    pub fn into_line(&self, topology: &Topology) -> Result<LineState, LinhaError> {
        let mut line = LineState::new(topology);
        for (key, &mode) in &self.modes {
            let id = topology
                .id(key)
                .ok_or_else(|| LinhaError::UnknownUnit(key.clone()))?;
            line.set_mode(id, mode);
        }
        for (key, &secs) in &self.timers {
            let id = topology
                .id(key)
                .ok_or_else(|| LinhaError::UnknownUnit(key.clone()))?;
            line.timers.insert(id, secs);
        }
        line.group_mode = self.group_mode;
        line.run = self.run.into();
        Ok(line)
    }
}

impl From<&Snapshot> for StateImage {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            group_mode: snapshot.group_mode,
            run: snapshot.run,
            modes: snapshot
                .units
                .iter()
                .map(|u| (u.key.clone(), u.mode))
                .collect(),
            timers: snapshot
                .units
                .iter()
                .filter_map(|u| u.remaining_secs.map(|secs| (u.key.clone(), secs)))
                .collect(),
        }
    }
}
