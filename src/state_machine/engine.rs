use tracing::debug;

use crate::error::{LinhaError, Rejection};
use crate::topology::Topology;

use super::cascade::{Cascade, TickReport};
use super::command::{self, CommandResult};
use super::line::{LineState, ModeChange};
use super::mode::GroupMode;
use super::policy::Policy;
use super::snapshot::{Snapshot, StateImage};

/// The interlock and cascade engine for one line.
///
/// Owns the topology, the policy and the live [`LineState`]. The
/// presentation layer reads [`Engine::snapshot`] and talks to the line only
/// through the command methods; an external clock calls [`Engine::tick`]
/// once per second.
#[derive(Debug, Clone)]
pub struct Engine {
    topology: Topology,
    policy: Policy,
    line: LineState,
}

impl Engine {
    pub fn new(topology: Topology, policy: Policy) -> Self {
        let line = LineState::new(&topology);
        Self {
            topology,
            policy,
            line,
        }
    }

    /// Resume from an externally persisted image.
    pub fn restore(
        topology: Topology,
        policy: Policy,
        image: &StateImage,
    ) -> Result<Self, LinhaError> {
        let line = image.into_line(&topology)?;
        Ok(Self {
            topology,
            policy,
            line,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn line(&self) -> &LineState {
        &self.line
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.line, &self.topology)
    }

    pub fn tick(&mut self) -> TickReport {
        let report = Cascade::tick(&mut self.line, &self.topology, &self.policy);
        self.log_changes(&report.changes);
        report
    }

    pub fn toggle_unit(&mut self, key: &str) -> Result<(), Rejection> {
        let result = command::toggle_unit(&mut self.line, &self.topology, &self.policy, key);
        self.finish("toggle_unit", result)
    }

    pub fn toggle_defect(&mut self, key: &str) -> Result<(), Rejection> {
        let result = command::toggle_defect(&mut self.line, &self.topology, &self.policy, key);
        self.finish("toggle_defect", result)
    }

    pub fn set_group_mode(&mut self, next: GroupMode) -> Result<(), Rejection> {
        let result = command::set_group_mode(&mut self.line, &self.topology, &self.policy, next);
        self.finish("set_group_mode", result)
    }

    pub fn group_power_on(&mut self) -> Result<(), Rejection> {
        let result = command::group_power_on(&mut self.line, &self.topology, &self.policy);
        self.finish("group_power_on", result)
    }

    pub fn group_power_off(&mut self) -> Result<(), Rejection> {
        let result = command::group_power_off(&mut self.line, &self.topology, &self.policy);
        self.finish("group_power_off", result)
    }

    fn finish(&self, command: &str, result: CommandResult) -> Result<(), Rejection> {
        match result {
            Ok(changes) => {
                self.log_changes(&changes);
                Ok(())
            }
            Err(rejection) => {
                debug!(command, reason = %rejection, "Command ignored");
                Err(rejection)
            }
        }
    }

    fn log_changes(&self, changes: &[ModeChange]) {
        for change in changes {
            debug!(
                unit = self.topology.key(change.unit),
                from = %change.from,
                to = %change.to,
                "Mode changed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{Mode, RunKind};

    const ALL: [&str; 8] = [
        "esteiraMain",
        "millA",
        "millB",
        "canoUnderMotor",
        "esteiraUnderCano",
        "separador",
        "esteiraEsquerda",
        "esteiraDireita",
    ];

    fn engine() -> Engine {
        Engine::new(Topology::standard(), Policy::default())
    }

    fn run_out(engine: &mut Engine) -> usize {
        let mut ticks = 0;
        while engine.line().has_timers() || engine.line().run().is_running() {
            engine.tick();
            ticks += 1;
            assert!(ticks < 100, "cascade did not terminate");
        }
        ticks
    }

    fn assert_pairs_agree(engine: &Engine) {
        let snap = engine.snapshot();
        let a = snap.mode("millA").unwrap();
        let b = snap.mode("millB").unwrap();
        if !a.is_defect() && !b.is_defect() {
            assert_eq!(a, b, "mills disagree");
        }
    }

    #[test]
    fn startup_scenario_lights_the_whole_line() {
        let mut e = engine();
        e.set_group_mode(GroupMode::Auto).unwrap();
        e.group_power_on().unwrap();

        let snap = e.snapshot();
        assert_eq!(snap.mode("esteiraEsquerda"), Some(Mode::Manual));
        assert_eq!(snap.mode("esteiraDireita"), Some(Mode::Manual));
        assert_eq!(snap.timer("separador"), Some(2));
        assert_eq!(snap.run, RunKind::Startup);

        e.tick();
        e.tick();
        let snap = e.snapshot();
        assert!(snap.mode("separador").unwrap().is_on());
        assert_eq!(snap.timer("esteiraUnderCano"), Some(2));

        loop {
            let report = e.tick();
            assert_pairs_agree(&e);
            if report.finished.is_some() {
                assert_eq!(report.finished, Some(RunKind::Startup));
                break;
            }
        }
        let snap = e.snapshot();
        assert!(ALL.iter().all(|k| snap.mode(k).unwrap().is_on()));
        assert!(!snap.has_timers());
        assert_eq!(snap.run, RunKind::Idle);
    }

    #[test]
    fn shutdown_scenario_stops_everything() {
        let mut e = engine();
        e.set_group_mode(GroupMode::Auto).unwrap();
        e.group_power_on().unwrap();
        run_out(&mut e);

        e.group_power_off().unwrap();
        assert_eq!(e.snapshot().run, RunKind::Shutdown);
        let ticks = run_out(&mut e);
        assert!(ticks <= 6 * e.policy().countdown_secs as usize);

        let snap = e.snapshot();
        assert!(snap.units.iter().all(|u| !u.mode.is_on()));
        assert!(!snap.has_timers());
        assert_eq!(snap.run, RunKind::Idle);
    }

    #[test]
    fn defect_scenario_in_group_manu() {
        let mut e = engine();
        for key in ALL {
            if !e.snapshot().mode(key).unwrap().is_on() {
                e.toggle_unit(key).unwrap();
            }
        }
        e.toggle_defect("millA").unwrap();

        let snap = e.snapshot();
        assert_eq!(snap.mode("millA"), Some(Mode::Defect));
        assert_eq!(snap.mode("millB"), Some(Mode::Off));
        assert_eq!(snap.mode("esteiraMain"), Some(Mode::Off));
        for key in [
            "canoUnderMotor",
            "esteiraUnderCano",
            "separador",
            "esteiraEsquerda",
            "esteiraDireita",
        ] {
            assert_eq!(snap.mode(key), Some(Mode::Manual));
        }
    }

    #[test]
    fn toggle_in_group_auto_changes_nothing() {
        let mut e = engine();
        e.set_group_mode(GroupMode::Auto).unwrap();
        let before = e.snapshot();
        assert!(e.toggle_unit("separador").is_err());
        assert_eq!(e.snapshot(), before);
    }

    #[test]
    fn mode_switch_rejected_mid_cascade() {
        let mut e = engine();
        e.set_group_mode(GroupMode::Auto).unwrap();
        e.group_power_on().unwrap();
        let before = e.snapshot();
        assert_eq!(
            e.set_group_mode(GroupMode::Manual),
            Err(Rejection::TimersActive)
        );
        assert_eq!(e.snapshot(), before);
    }

    #[test]
    fn defect_units_never_hold_timers() {
        let mut e = engine();
        e.set_group_mode(GroupMode::Auto).unwrap();
        e.group_power_on().unwrap();
        run_out(&mut e);
        e.group_power_off().unwrap();
        run_out(&mut e);
        e.set_group_mode(GroupMode::Manual).unwrap();
        e.toggle_defect("esteiraUnderCano").unwrap();
        e.set_group_mode(GroupMode::Auto).unwrap();
        e.group_power_on().unwrap();

        for _ in 0..20 {
            let snap = e.snapshot();
            for unit in &snap.units {
                if unit.mode.is_defect() {
                    assert!(unit.remaining_secs.is_none(), "{} has a timer", unit.key);
                }
            }
            e.tick();
        }
        let snap = e.snapshot();
        assert_eq!(snap.mode("separador"), Some(Mode::Manual));
        assert_eq!(snap.mode("canoUnderMotor"), Some(Mode::Off));
    }

    #[test]
    fn restore_then_tick_repairs_pair() {
        let image: StateImage = serde_json::from_str(
            r#"{
                "group_mode": "auto",
                "modes": {
                    "millA": "manual",
                    "millB": "off",
                    "canoUnderMotor": "manual",
                    "esteiraUnderCano": "manual",
                    "separador": "defect"
                },
                "timers": { "separador": 3 }
            }"#,
        )
        .unwrap();
        let mut e = Engine::restore(Topology::standard(), Policy::default(), &image).unwrap();
        assert_eq!(e.snapshot().mode("millB"), Some(Mode::Off));

        e.tick();
        let snap = e.snapshot();
        assert_eq!(snap.mode("millB"), Some(Mode::Manual));
        assert_eq!(snap.timer("separador"), None);
    }

    #[test]
    fn unknown_key_is_ignored() {
        let mut e = engine();
        let before = e.snapshot();
        assert_eq!(
            e.toggle_defect("moinhoC"),
            Err(Rejection::UnknownUnit("moinhoC".into()))
        );
        assert_eq!(e.snapshot(), before);
    }
}
