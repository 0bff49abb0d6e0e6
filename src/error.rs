use thiserror::Error;

use crate::state_machine::GroupMode;

#[derive(Debug, Error)]
pub enum LinhaError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Why a panel command was ignored.
///
/// A rejected command leaves the line untouched. Callers that model a
/// physical panel are free to drop the value, the way a disabled button
/// simply does nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("command requires group mode {required}")]
    WrongGroupMode { required: GroupMode },

    #[error("timers are still counting down")]
    TimersActive,

    #[error("unit {0} is flagged defect")]
    UnitInDefect(String),

    #[error("unit {unit} is blocked by defect on {defect}")]
    BlockedByDefect { unit: String, defect: String },

    #[error("no unit qualifies to seed the cascade")]
    NoQualifyingSeed,

    #[error("unknown unit: {0}")]
    UnknownUnit(String),
}
