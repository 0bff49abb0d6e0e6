use serde::{Deserialize, Serialize};

/// How an expired startup timer energizes an `Off` unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPromotion {
    /// Straight to `Manual`.
    #[default]
    Direct,
    /// To `Auto` first, then to `Manual` once every immediate downstream
    /// unit is `Manual` or `Defect`.
    ReadinessGated,
}

/// Line-specific behaviour switches.
///
/// Panels built for different plants disagree on a handful of details; each
/// one is a named flag here instead of a branch buried in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Seconds armed on a unit per cascade layer.
    pub countdown_secs: u32,
    /// Treat the two final belts as a hard pair.
    pub pair_output_belts: bool,
    pub startup_promotion: StartupPromotion,
    /// Switching to group Auto leaves `Manual` final belts as they are.
    pub keep_outputs_manual_on_auto_switch: bool,
    /// A manual toggle also cancels timers on everything upstream.
    pub toggle_clears_upstream_timers: bool,
    /// Flagging a final belt defect while its sibling belt is held `Manual`
    /// keeps the shared feed running for the sibling.
    pub defect_spares_held_sibling_branch: bool,
    /// A unit with a defect anywhere downstream cannot be toggled on.
    pub defect_blocks_upstream_start: bool,
    /// In group Auto, an `Auto` unit with nothing running downstream of it
    /// drops to `Off`.
    pub demote_starved_auto_units: bool,
    /// In group Manu, stopping a unit arms a follow-on timer on each running
    /// unit it feeds; they stop when it expires.
    pub drain_after_manual_stop: bool,
}

pub const DEFAULT_COUNTDOWN_SECS: u32 = 2;

impl Default for Policy {
    fn default() -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            pair_output_belts: false,
            startup_promotion: StartupPromotion::Direct,
            keep_outputs_manual_on_auto_switch: false,
            toggle_clears_upstream_timers: false,
            defect_spares_held_sibling_branch: false,
            defect_blocks_upstream_start: true,
            demote_starved_auto_units: true,
            drain_after_manual_stop: false,
        }
    }
}
