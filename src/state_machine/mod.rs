mod cascade;
mod command;
mod engine;
mod interlock;
mod line;
mod mode;
mod policy;
mod snapshot;

pub use cascade::{Cascade, TickReport};
pub use command::{
    CommandResult, group_power_off, group_power_on, set_group_mode, toggle_defect, toggle_unit,
};
pub use engine::Engine;
pub use interlock::{enforce, mirror_pairs};
pub use line::{LineState, ModeChange};
pub use mode::{GroupMode, Mode, RunKind, RunState};
pub use policy::{DEFAULT_COUNTDOWN_SECS, Policy, StartupPromotion};
pub use snapshot::{Snapshot, StateImage, UnitView};
