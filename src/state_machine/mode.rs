use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::topology::UnitId;

/// The four modes of a unit on the line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// De-energized and idle.
    #[default]
    Off,
    /// Energized by direct operator command. Interlocks never demote it.
    Manual,
    /// Energized as a side effect of group or interlock logic.
    Auto,
    /// Operator-flagged fault. Sticky until explicitly cleared.
    Defect,
}

impl Mode {
    /// Whether the unit is energized.
    pub fn is_on(self) -> bool {
        matches!(self, Mode::Manual | Mode::Auto)
    }

    pub fn is_defect(self) -> bool {
        self == Mode::Defect
    }

    // Precedence used when a pair has to agree: Manual > Auto > Off.
    pub(crate) fn energy(self) -> u8 {
        match self {
            Mode::Off | Mode::Defect => 0,
            Mode::Auto => 1,
            Mode::Manual => 2,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Off => write!(f, "OFF"),
            Mode::Manual => write!(f, "MANUAL"),
            Mode::Auto => write!(f, "AUTO"),
            Mode::Defect => write!(f, "DEFECT"),
        }
    }
}

/// Panel-wide policy deciding which commands are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    /// Only whole-group power on/off; interlock mirroring active.
    Auto,
    /// Per-unit commands; only the hard pair mirror stays active.
    #[default]
    #[serde(alias = "manu")]
    Manual,
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupMode::Auto => write!(f, "AUTO"),
            GroupMode::Manual => write!(f, "MANU"),
        }
    }
}

/// Which multi-tick cascade, if any, is in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    #[default]
    Idle,
    Startup,
    Shutdown,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Idle => write!(f, "IDLE"),
            RunKind::Startup => write!(f, "STARTUP"),
            RunKind::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

/// Run flags of the cascade scheduler.
///
/// Startup and shutdown are variants of one enum, so the two runs can never
/// be in progress at the same time. A shutdown carries the set of units its
/// wave has already passed through; the set starts empty with every new run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Startup,
    Shutdown { visited: BTreeSet<UnitId> },
}

impl RunState {
    pub fn shutdown() -> Self {
        RunState::Shutdown {
            visited: BTreeSet::new(),
        }
    }

    pub fn kind(&self) -> RunKind {
        match self {
            RunState::Idle => RunKind::Idle,
            RunState::Startup => RunKind::Startup,
            RunState::Shutdown { .. } => RunKind::Shutdown,
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, RunState::Idle)
    }
}

impl From<RunKind> for RunState {
    fn from(kind: RunKind) -> Self {
        match kind {
            RunKind::Idle => RunState::Idle,
            RunKind::Startup => RunState::Startup,
            RunKind::Shutdown => RunState::shutdown(),
        }
    }
}
